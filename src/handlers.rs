use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};

use crate::chat::ChatProvider;
use crate::dtos::{ChatReply, ChatRequest, PaymentIntentCreated, PaymentIntentRequest, WebhookAck};
use crate::error::ApiError;
use crate::payments::PaymentsProvider;
use crate::webhook::{self, PaymentEventSink, SignatureError, WebhookVerifier, SIGNATURE_HEADER};

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<dyn ChatProvider>,
    pub payments: Arc<dyn PaymentsProvider>,
    pub verifier: Arc<WebhookVerifier>,
    pub events: Arc<dyn PaymentEventSink>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat).fallback(method_not_allowed))
        .route(
            "/payment-intent",
            post(create_payment_intent).fallback(method_not_allowed),
        )
        .route("/webhook", post(stripe_webhook).fallback(method_not_allowed))
        .with_state(state)
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Json<ChatReply>, ApiError> {
    let request: ChatRequest = serde_json::from_slice(&body).map_err(ApiError::MalformedInput)?;
    let message = request
        .message
        .filter(|m| !m.is_empty())
        .ok_or(ApiError::MissingField("message"))?;

    let reply = state.chat.complete(&message).await.map_err(|err| {
        tracing::error!(error = %err, "chat completion failed");
        ApiError::ChatUpstream(err)
    })?;

    Ok(Json(ChatReply { message: reply }))
}

async fn create_payment_intent(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PaymentIntentCreated>, ApiError> {
    // An empty body means "use the default amount".
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        PaymentIntentRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(ApiError::MalformedInput)?
    };
    let amount = request.amount();

    let client_secret = state.payments.create_intent(amount).await.map_err(|err| {
        tracing::error!(amount, error = %err, "Error creating payment intent");
        ApiError::PaymentUpstream(err)
    })?;

    Ok(Json(PaymentIntentCreated { client_secret }))
}

async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let result = headers
        .get(SIGNATURE_HEADER)
        .ok_or(ApiError::SignatureInvalid(SignatureError::MissingHeader))
        .and_then(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::SignatureInvalid(SignatureError::MalformedHeader))
        })
        .and_then(|signature| state.verifier.construct_event(&body, signature))
        .and_then(|event| webhook::dispatch(&event, state.events.as_ref()));

    match result {
        Ok(dispatched) => {
            tracing::debug!(?dispatched, "Webhook handled");
            Ok(Json(WebhookAck { status: "success" }))
        }
        Err(err) => {
            tracing::warn!(error = %err, "Webhook error");
            Err(err)
        }
    }
}
