use serde::Deserialize;

/// A provider event, only constructed after its signature checked out.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    PaymentIntentSucceeded,
    Unhandled(String),
}

impl From<&str> for EventType {
    fn from(raw: &str) -> Self {
        match raw {
            "payment_intent.succeeded" => EventType::PaymentIntentSucceeded,
            other => EventType::Unhandled(other.to_string()),
        }
    }
}

impl StripeEvent {
    pub fn kind(&self) -> EventType {
        EventType::from(self.event_type.as_str())
    }
}
