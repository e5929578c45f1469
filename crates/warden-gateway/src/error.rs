//! Error types for the Gateway

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use warden_core::WardenError;

/// Gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Core(#[from] WardenError),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Core(core) => match core.code() {
                "InvalidChangeSpec" | "InvalidSelector" | "UnsupportedOperation"
                | "InvalidMission" | "PolicyViolation" | "SecurityBlock" | "BudgetExceeded"
                | "NoViableModel" => StatusCode::BAD_REQUEST,
                "MissionNotFound" | "CheckpointNotFound" | "BatchNotFound" | "BudgetNotFound"
                | "ModelNotFound" => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> String {
        match self {
            Self::Core(core) => core.code().to_string(),
            Self::BadRequest(_) => "BadRequest".to_string(),
            Self::Io(_) => "IOError".to_string(),
            Self::Serialization(_) => "SerializationError".to_string(),
            Self::Internal(_) => "InternalError".to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Server-side failures keep their detail in the logs, not the body.
        let details = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {self}");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = Json(json!({
            "error": self.code(),
            "details": details,
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn status_mapping_follows_taxonomy() {
        let not_found = GatewayError::Core(WardenError::MissionNotFound(Uuid::new_v4()));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let invalid = GatewayError::Core(WardenError::InvalidSelector("x".into()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let internal = GatewayError::Internal("boom".into());
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
