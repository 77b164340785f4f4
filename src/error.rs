use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use crate::dtos::ErrorBody;
use crate::webhook::SignatureError;

/// Failure of a single outbound provider call.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("authentication with provider failed: {0}")]
    Authentication(String),
    #[error("provider rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("{0}")]
    Rejected(String),
    #[error("provider returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Maps a non-success provider status to an error kind.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ProviderError::Authentication(message),
            429 => ProviderError::RateLimited(message),
            400 | 402 | 404 | 409 | 422 => ProviderError::Rejected(message),
            _ => ProviderError::Upstream { status, message },
        }
    }

    /// What the caller gets to see. Only rejections describe the caller's own
    /// input; everything else is reduced to a fixed sentence.
    pub fn public_message(&self) -> String {
        match self {
            ProviderError::Rejected(message) => message.clone(),
            ProviderError::Network(_) | ProviderError::Timeout => {
                "Upstream service unavailable".to_string()
            }
            ProviderError::Authentication(_) => "Upstream authentication failed".to_string(),
            ProviderError::RateLimited(_) => {
                "Upstream rate limit exceeded, try again later".to_string()
            }
            ProviderError::Upstream { .. } | ProviderError::MalformedResponse(_) => {
                "Upstream service error".to_string()
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid JSON")]
    MalformedInput(#[source] serde_json::Error),
    #[error("No {0} provided")]
    MissingField(&'static str),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("chat provider call failed: {0}")]
    ChatUpstream(#[source] ProviderError),
    #[error("payment intent creation failed: {0}")]
    PaymentUpstream(#[source] ProviderError),
    #[error(transparent)]
    SignatureInvalid(#[from] SignatureError),
    #[error("Invalid event payload")]
    InvalidEvent(#[source] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedInput(_)
            | ApiError::MissingField(_)
            | ApiError::PaymentUpstream(_)
            | ApiError::SignatureInvalid(_)
            | ApiError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::ChatUpstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::ChatUpstream(err) | ApiError::PaymentUpstream(err) => err.public_message(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
