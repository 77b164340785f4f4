use std::sync::Arc;

use async_trait::async_trait;
use stripe::{
    Client, CreatePaymentIntent, CreatePaymentIntentAutomaticPaymentMethods, Currency,
    PaymentIntent, StripeError,
};

use crate::error::ProviderError;

#[async_trait]
pub trait PaymentsProvider: Send + Sync {
    /// Creates a payment intent for `amount` cents and returns its client secret.
    async fn create_intent(&self, amount: i64) -> Result<String, ProviderError>;
}

/// Stripe-backed payment intents, charged in USD with automatic payment methods.
#[derive(Clone)]
pub struct StripePayments {
    client: Arc<Client>,
}

impl StripePayments {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self::with_client(Client::new(secret_key))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

#[async_trait]
impl PaymentsProvider for StripePayments {
    async fn create_intent(&self, amount: i64) -> Result<String, ProviderError> {
        let mut params = CreatePaymentIntent::new(amount, Currency::USD);
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            allow_redirects: None,
            enabled: true,
        });

        let intent = PaymentIntent::create(&self.client, params)
            .await
            .map_err(provider_error)?;

        intent.client_secret.ok_or_else(|| {
            ProviderError::MalformedResponse(format!("payment intent {} has no client secret", intent.id))
        })
    }
}

fn provider_error(err: StripeError) -> ProviderError {
    match err {
        StripeError::Stripe(request) => {
            let status = request.http_status;
            let message = request
                .message
                .clone()
                .unwrap_or_else(|| format!("stripe request failed with status {status}"));
            ProviderError::from_status(status, message)
        }
        StripeError::Timeout => ProviderError::Timeout,
        StripeError::JSONSerialize(e) => ProviderError::MalformedResponse(e.to_string()),
        other => ProviderError::Network(other.to_string()),
    }
}
