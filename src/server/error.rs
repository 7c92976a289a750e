use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::room::JoinError;
use crate::store::StoreError;

const LOG_TARGET: &str = "boardroom::server::error";

/// Failures surfaced by the HTTP façade. The response body uses the same
/// `{type:"error", message}` shape as the WebSocket error frame, so
/// clients decode both paths with one schema.
#[derive(Debug)]
pub enum ApiError {
    /// The referenced resource does not exist (usually a room id).
    UnknownResource(String),
    /// A request field failed validation.
    InvalidField {
        field: &'static str,
        reason: String,
    },
    Internal(String),
}

impl ApiError {
    pub fn unknown_resource(what: impl Into<String>) -> Self {
        ApiError::UnknownResource(what.into())
    }

    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        ApiError::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownResource(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidField { .. } => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::UnknownResource(what) => format!("{what} not found"),
            ApiError::InvalidField { field, reason } => format!("{field}: {reason}"),
            ApiError::Internal(message) => message.clone(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::UnknownResource(what),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::NotFound => ApiError::unknown_resource("room"),
            JoinError::Full | JoinError::Started => {
                ApiError::invalid_field("roomID", err.to_string())
            }
            JoinError::Store(inner) => ApiError::from(inner),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(target: LOG_TARGET, %message, "request failed");
        }
        let body = Json(serde_json::json!({
            "type": "error",
            "message": message,
        }));
        (status, body).into_response()
    }
}
