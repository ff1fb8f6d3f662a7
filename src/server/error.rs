//! Error types for the server

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::DermaError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Derma(#[from] DermaError),

    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Missing form field: {0}")]
    MissingField(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Stable category reported in the `kind` field of error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Derma(e) => e.kind(),
            ServerError::Multipart(_) => "bad_request",
            ServerError::MissingField(_) => "missing_field",
            ServerError::BadRequest(_) => "bad_request",
            ServerError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Derma(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ServerError::Derma(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Multipart(e) => e.status(),
            ServerError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Derma(DermaError::InvalidImage(msg)) => format!("Invalid image: {}", msg),
            ServerError::Derma(DermaError::InferenceFault(msg)) => {
                tracing::error!(detail = %msg, "Inference failed");
                "Inference failed. Check server logs for details.".to_string()
            }
            ServerError::Derma(e) => {
                tracing::error!(detail = %e, kind = e.kind(), "Unexpected model error");
                "An internal error occurred".to_string()
            }
            ServerError::Multipart(e) => e.body_text(),
            ServerError::MissingField(field) => format!("Missing form field '{}'", field),
            ServerError::BadRequest(msg) => msg.clone(),
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                "An internal error occurred".to_string()
            }
        };

        let body = Json(json!({
            "error": true,
            "kind": self.kind(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid = ServerError::from(DermaError::InvalidImage("bad".into()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.kind(), "invalid_image");

        let fault = ServerError::from(DermaError::InferenceFault("nan".into()));
        assert_eq!(fault.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fault.kind(), "inference_fault");

        assert_eq!(
            ServerError::MissingField("file".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[tokio::test]
    async fn test_fault_message_is_generic() {
        let response = ServerError::from(DermaError::InferenceFault("tensor detail".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], true);
        assert_eq!(json["kind"], "inference_fault");
        assert!(!json["message"].as_str().unwrap().contains("tensor detail"));
    }
}
