/// Default payment-intent amount in cents.
pub const DEFAULT_AMOUNT: i64 = 3000;

#[derive(Debug, serde::Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct ChatReply {
    pub message: String,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct PaymentIntentRequest {
    #[serde(default)]
    pub amount: Option<i64>,
}

impl PaymentIntentRequest {
    pub fn amount(&self) -> i64 {
        self.amount.unwrap_or(DEFAULT_AMOUNT)
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentCreated {
    pub client_secret: String,
}

#[derive(Debug, serde::Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

#[derive(Debug, serde::Serialize)]
pub struct ErrorBody {
    pub error: String,
}
