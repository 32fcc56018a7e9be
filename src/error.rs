//! Error types shared by the HTTP surface and the provider clients.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub const MISSING_INPUT_MESSAGE: &str = "Envie uma referencia de estilo e um prompt.";
pub const MISSING_CREDENTIALS_MESSAGE: &str =
    "Configure OPENAI_API_KEY, GEMINI_API_KEY e REPLICATE_API_TOKEN.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Falha ao gerar imagens. Tente novamente.";
pub const PAYLOAD_TOO_LARGE_MESSAGE: &str = "Arquivos excedem o tamanho maximo permitido.";

/// Errors surfaced to API callers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or malformed request input
    #[error("{0}")]
    Validation(String),

    /// Request body exceeded the upload limit
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Operator must fix the deployment (credentials, backends)
    #[error("{0}")]
    Config(String),

    /// Anything unexpected; the message never reaches the client
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Config(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Validation(message)
            | ApiError::PayloadTooLarge(message)
            | ApiError::Config(message) => message.clone(),
            ApiError::Internal(_) => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse { error: message.to_string() })).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self {
            tracing::error!("request failed: {err:#}");
        }
        json_error(self.status(), &self.public_message())
    }
}

/// Failures talking to an upstream provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Transport-level failure (DNS, connect, TLS, body read)
    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    /// Upstream answered with a non-success status
    #[error("{provider} HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    /// Upstream answered but the payload could not be understood
    #[error("{provider} returned an unreadable payload: {message}")]
    Decode { provider: String, message: String },

    /// Upstream answered successfully without an image or text
    #[error("{provider} returned no output")]
    Empty { provider: String },

    /// Asynchronous job ended without success
    #[error("{provider} job {job_id} ended with status {status}: {message}")]
    Job {
        provider: String,
        job_id: String,
        status: String,
        message: String,
    },

    /// Operation exceeded its deadline
    #[error("{provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },
}

impl ProviderError {
    pub fn request(provider: &str, err: impl std::fmt::Display) -> Self {
        ProviderError::Request {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }

    pub fn decode(provider: &str, err: impl std::fmt::Display) -> Self {
        ProviderError::Decode {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }

    pub fn empty(provider: &str) -> Self {
        ProviderError::Empty {
            provider: provider.to_string(),
        }
    }
}

/// Turn a non-success response into [`ProviderError::Status`], passing
/// successful responses through untouched.
pub async fn assert_ok_response(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        provider: provider.to_string(),
        status: status.as_u16(),
        body,
    })
}
