use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;

const AUTH_FAILED_MESSAGE: &str = "OpenAI API authentication failed. Please check that your \
    OPENAI_API_KEY is correct and valid. Make sure there are no extra spaces or quotes around the key.";
const QUOTA_EXCEEDED_MESSAGE: &str =
    "OpenAI API quota exceeded. Please check your OpenAI account billing and usage limits.";
const RATE_LIMITED_MESSAGE: &str = "OpenAI API rate limit exceeded. Please try again in a moment.";
const TIMEOUT_MESSAGE: &str = "The OpenAI API did not respond in time. Please try again.";

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Client input is invalid. Not retried.
    #[error("{0}")]
    BadRequest(String),

    /// Network failure, rate limit or provider outage. The caller may retry.
    #[error("{0}")]
    UpstreamUnavailable(String),

    /// The upstream call exceeded the configured time budget. The caller may retry.
    #[error("{0}")]
    UpstreamTimeout(String),

    /// Credential, quota or request rejection by the provider. Not retried.
    #[error("{0}")]
    UpstreamRejected(String),

    /// The model replied, but not with a valid evaluation object.
    #[error("Malformed response from the AI model: {0}")]
    MalformedUpstreamResponse(String),

    /// The body could not be read, most often because it exceeds the size limit.
    #[error("{message}")]
    UnreadableBody { status: StatusCode, message: String },

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamUnavailable(_) | AppError::UpstreamRejected(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::MalformedUpstreamResponse(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::UnreadableBody { status, .. } => *status,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            AppError::UpstreamRejected(_) => "UPSTREAM_REJECTED",
            AppError::MalformedUpstreamResponse(_) => "MALFORMED_UPSTREAM_RESPONSE",
            AppError::UnreadableBody { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                "PAYLOAD_TOO_LARGE"
            }
            AppError::UnreadableBody { .. } => "BAD_REQUEST",
            AppError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        let status = rejection.status();
        let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "Request body is too large. Split the RFP text into smaller sections.".to_string()
        } else {
            rejection.body_text()
        };
        AppError::UnreadableBody { status, message }
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Http(e) if e.is_timeout() => AppError::UpstreamTimeout(TIMEOUT_MESSAGE.to_string()),
            LlmError::Http(e) => {
                AppError::UpstreamUnavailable(format!("Could not reach the OpenAI API: {e}"))
            }
            LlmError::Api {
                status,
                code,
                message,
            } => classify_api_error(status, code.as_deref(), &message),
            LlmError::Parse(e) => {
                AppError::MalformedUpstreamResponse(format!("completion envelope was not valid JSON: {e}"))
            }
            LlmError::EmptyContent => {
                AppError::MalformedUpstreamResponse("the model returned no content".to_string())
            }
        }
    }
}

fn classify_api_error(status: u16, code: Option<&str>, message: &str) -> AppError {
    let message_lower = message.to_lowercase();
    let is_quota = code == Some("insufficient_quota") || message_lower.contains("quota");
    let is_auth = code == Some("invalid_api_key") || matches!(status, 401 | 403);

    match status {
        _ if is_auth => AppError::UpstreamRejected(AUTH_FAILED_MESSAGE.to_string()),
        400..=499 if is_quota => AppError::UpstreamRejected(QUOTA_EXCEEDED_MESSAGE.to_string()),
        429 => AppError::UpstreamUnavailable(RATE_LIMITED_MESSAGE.to_string()),
        408 | 504 => AppError::UpstreamTimeout(TIMEOUT_MESSAGE.to_string()),
        500..=599 => AppError::UpstreamUnavailable(format!(
            "OpenAI API is unavailable (status {status}): {message}"
        )),
        _ => AppError::UpstreamRejected(format!("OpenAI API error: {message}")),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::BadRequest(_)
            | AppError::UnreadableBody { .. }
            | AppError::MethodNotAllowed => self.to_string(),
            AppError::UpstreamUnavailable(msg)
            | AppError::UpstreamTimeout(msg)
            | AppError::UpstreamRejected(msg) => {
                tracing::warn!("Upstream error ({}): {msg}", self.code());
                msg.clone()
            }
            AppError::MalformedUpstreamResponse(detail) => {
                tracing::error!("Malformed upstream response: {detail}");
                self.to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                "An internal server error occurred".to_string()
            }
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (self.status(), body).into_response()
    }
}
