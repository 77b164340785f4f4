//! Provider webhook handling: `Stripe-Signature` verification over the raw
//! request body, then dispatch on the event type.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ApiError;
use crate::models::{EventType, PaymentIntentObject, StripeEvent};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SignatureError {
    #[error("No Stripe signature header")]
    MissingHeader,
    #[error("Malformed Stripe signature header")]
    MalformedHeader,
    #[error("No v1 signatures found in Stripe signature header")]
    NoSignatures,
    #[error("Signature does not match the payload")]
    SignatureMismatch,
    #[error("Timestamp outside the tolerance zone")]
    TimestampOutOfTolerance,
}

/// Parsed `t=...,v1=...` header.
#[derive(Debug)]
struct SignatureHeader {
    timestamp: i64,
    v1: Vec<Vec<u8>>,
}

impl SignatureHeader {
    fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut v1 = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    let t = value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?;
                    timestamp = Some(t);
                }
                // Entries that aren't hex can never match.
                "v1" => {
                    if let Ok(bytes) = hex::decode(value) {
                        v1.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
        if v1.is_empty() {
            return Err(SignatureError::NoSignatures);
        }
        Ok(SignatureHeader { timestamp, v1 })
    }
}

/// Verifier bound to the shared webhook secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, header, unix_now())
    }

    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SignatureError> {
        let header = SignatureHeader::parse(header)?;

        let matched = header
            .v1
            .iter()
            .any(|candidate| self.mac_for(header.timestamp, payload).verify_slice(candidate).is_ok());
        if !matched {
            return Err(SignatureError::SignatureMismatch);
        }

        // Only stale timestamps are rejected; a sender clock ahead of ours is tolerated.
        if now.saturating_sub(header.timestamp) > self.tolerance_secs as i64 {
            return Err(SignatureError::TimestampOutOfTolerance);
        }
        Ok(())
    }

    /// Verifies and then parses the raw body into an event.
    pub fn construct_event(&self, payload: &[u8], header: &str) -> Result<StripeEvent, ApiError> {
        self.verify(payload, header)?;
        serde_json::from_slice(payload).map_err(ApiError::InvalidEvent)
    }

    /// Hex signature for `payload` at `timestamp`, as the provider computes it.
    #[cfg(test)]
    pub fn sign(&self, timestamp: i64, payload: &[u8]) -> String {
        hex::encode(self.mac_for(timestamp, payload).finalize().into_bytes())
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC takes keys of any size"));
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Side effects triggered by verified payment events.
pub trait PaymentEventSink: Send + Sync {
    fn payment_succeeded(&self, intent: &PaymentIntentObject);
}

/// Records successful payments in the service log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl PaymentEventSink for LogSink {
    fn payment_succeeded(&self, intent: &PaymentIntentObject) {
        tracing::info!(
            payment_intent_id = %intent.id,
            amount = ?intent.amount,
            currency = ?intent.currency,
            "Payment succeeded"
        );
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Dispatched {
    PaymentSucceeded(String),
    Ignored(String),
}

/// Routes a verified event to its handler. Unknown types are acknowledged
/// without side effects. Redeliveries are not deduplicated.
pub fn dispatch(event: &StripeEvent, sink: &dyn PaymentEventSink) -> Result<Dispatched, ApiError> {
    match event.kind() {
        EventType::PaymentIntentSucceeded => {
            let intent: PaymentIntentObject = serde_json::from_value(event.data.object.clone())
                .map_err(ApiError::InvalidEvent)?;
            sink.payment_succeeded(&intent);
            Ok(Dispatched::PaymentSucceeded(intent.id))
        }
        EventType::Unhandled(event_type) => {
            tracing::debug!(event_id = %event.id, %event_type, "no handler for event type");
            Ok(Dispatched::Ignored(event_type))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    pub const SECRET: &str = "whsec_test_secret";

    #[derive(Default)]
    pub struct RecordingSink {
        pub succeeded: Mutex<Vec<String>>,
    }

    impl PaymentEventSink for RecordingSink {
        fn payment_succeeded(&self, intent: &PaymentIntentObject) {
            self.succeeded.lock().unwrap().push(intent.id.clone());
        }
    }

    pub fn signed_header(payload: &[u8], timestamp: i64) -> String {
        let sig = WebhookVerifier::new(SECRET, 300).sign(timestamp, payload);
        format!("t={timestamp},v1={sig}")
    }

    pub fn event_payload(event_type: &str, intent_id: &str) -> Vec<u8> {
        serde_json::json!({
            "id": "evt_1NG8Du2eZvKYlo2CUI79vXWy",
            "object": "event",
            "type": event_type,
            "data": {
                "object": {
                    "id": intent_id,
                    "object": "payment_intent",
                    "amount": 3000,
                    "currency": "usd"
                }
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn accepts_correctly_signed_payload() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let payload = event_payload("payment_intent.succeeded", "pi_123");
        let header = signed_header(&payload, 1_700_000_000);
        assert_eq!(verifier.verify_at(&payload, &header, 1_700_000_010), Ok(()));
    }

    #[test]
    fn any_matching_v1_entry_is_enough() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let payload = b"{}";
        let good = verifier.sign(100, payload);
        let header = format!("t=100,v1={},v1={good},v0=deadbeef", "ab".repeat(32));
        assert_eq!(verifier.verify_at(payload, &header, 100), Ok(()));
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = event_payload("payment_intent.succeeded", "pi_123");
        let header = signed_header(&payload, 100);
        let verifier = WebhookVerifier::new("whsec_other", 300);
        assert_eq!(
            verifier.verify_at(&payload, &header, 100),
            Err(SignatureError::SignatureMismatch)
        );
    }

    #[test]
    fn rejects_reserialized_body() {
        // Same JSON value, different bytes.
        let verifier = WebhookVerifier::new(SECRET, 300);
        let raw = br#"{"id": "evt_1", "type": "charge.refunded"}"#;
        let header = signed_header(raw, 100);
        let value: serde_json::Value = serde_json::from_slice(raw).unwrap();
        let reserialized = serde_json::to_vec(&value).unwrap();
        assert_eq!(
            verifier.verify_at(&reserialized, &header, 100),
            Err(SignatureError::SignatureMismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let payload = b"{}";
        let header = signed_header(payload, 1_000);
        assert_eq!(
            verifier.verify_at(payload, &header, 1_301),
            Err(SignatureError::TimestampOutOfTolerance)
        );
        assert_eq!(verifier.verify_at(payload, &header, 1_300), Ok(()));
    }

    #[test]
    fn sender_clock_ahead_is_tolerated() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let payload = b"{}";
        let header = signed_header(payload, 2_000);
        assert_eq!(verifier.verify_at(payload, &header, 1_300), Ok(()));
    }

    #[test]
    fn segments_without_a_value_are_skipped() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let payload = b"{}";
        let sig = verifier.sign(2_000, payload);
        for header in [
            format!("t=2000,v1={sig},"),
            format!("t=2000,junk,v1={sig}"),
        ] {
            assert_eq!(verifier.verify_at(payload, &header, 2_000), Ok(()), "{header}");
        }
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        assert_eq!(
            verifier.verify_at(b"{}", "garbage", 0),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            verifier.verify_at(b"{}", "t=abc,v1=00", 0),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            verifier.verify_at(b"{}", "v1=00", 0),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            verifier.verify_at(b"{}", "t=10,v0=00", 10),
            Err(SignatureError::NoSignatures)
        );
    }

    #[test]
    fn dispatch_table() {
        let sink = RecordingSink::default();
        let succeeded: StripeEvent =
            serde_json::from_slice(&event_payload("payment_intent.succeeded", "pi_42")).unwrap();
        let refunded: StripeEvent =
            serde_json::from_slice(&event_payload("charge.refunded", "pi_42")).unwrap();

        assert_eq!(
            dispatch(&succeeded, &sink).unwrap(),
            Dispatched::PaymentSucceeded("pi_42".into())
        );
        assert_eq!(
            dispatch(&refunded, &sink).unwrap(),
            Dispatched::Ignored("charge.refunded".into())
        );
        assert_eq!(*sink.succeeded.lock().unwrap(), vec!["pi_42".to_string()]);
    }

    #[test]
    fn succeeded_event_without_intent_id_is_invalid() {
        let sink = RecordingSink::default();
        let event: StripeEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": { "object": { "object": "payment_intent" } }
        }))
        .unwrap();
        assert!(matches!(dispatch(&event, &sink), Err(ApiError::InvalidEvent(_))));
        assert!(sink.succeeded.lock().unwrap().is_empty());
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn lines_containing(&self, needle: &str) -> usize {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .filter(|line| line.contains(needle))
                .count()
        }
    }

    fn dispatch_logged(payloads: &[Vec<u8>]) -> CapturedLog {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            for payload in payloads {
                let event: StripeEvent = serde_json::from_slice(payload).unwrap();
                dispatch(&event, &LogSink).unwrap();
            }
        });
        log
    }

    #[test]
    fn log_sink_writes_one_entry_per_succeeded_delivery() {
        let succeeded = event_payload("payment_intent.succeeded", "pi_logged");
        let refunded = event_payload("charge.refunded", "pi_refunded");

        let once = dispatch_logged(&[succeeded.clone()]);
        assert_eq!(once.lines_containing("payment_intent_id=pi_logged"), 1);

        let ignored = dispatch_logged(&[refunded]);
        assert_eq!(ignored.lines_containing("pi_refunded"), 0);

        // Redelivery is not deduplicated.
        let twice = dispatch_logged(&[succeeded.clone(), succeeded]);
        assert_eq!(twice.lines_containing("payment_intent_id=pi_logged"), 2);
    }
}
