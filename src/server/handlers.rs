//! HTTP request handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::inference::PredictionResult;

use super::error::{Result, ServerError};
use super::state::AppState;

/// Form field the image is expected under
pub const UPLOAD_FIELD: &str = "file";

/// Liveness message
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "API is running" }))
}

/// Classify an uploaded image
pub async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>> {
    let request_id = AppState::generate_request_id();
    let start = Instant::now();

    let upload = match multipart {
        Ok(multipart) => read_upload(multipart).await,
        Err(rejection) => Err(ServerError::BadRequest(rejection.body_text())),
    };
    let (file_name, data) = upload.inspect_err(|e| {
        warn!(request_id = %request_id, error = %e, "Rejected upload");
    })?;
    debug!(
        request_id = %request_id,
        file_name = file_name.as_deref().unwrap_or("-"),
        bytes = data.len(),
        "Received image"
    );

    let engine = Arc::clone(&state.engine);
    let result = tokio::task::spawn_blocking(move || engine.predict(&data))
        .await
        .map_err(|e| ServerError::Internal(format!("prediction task failed: {}", e)))?;

    match result {
        Ok(prediction) => {
            info!(
                request_id = %request_id,
                class = %prediction.label,
                confidence = prediction.confidence,
                latency_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Prediction served"
            );
            Ok(Json(prediction))
        }
        Err(e) => {
            warn!(request_id = %request_id, kind = e.kind(), error = %e, "Prediction failed");
            Err(e.into())
        }
    }
}

/// Pull the image out of the form: the `file` field, or else the first field
/// that carries a file name.
async fn read_upload(mut multipart: Multipart) -> Result<(Option<String>, Bytes)> {
    while let Some(field) = multipart.next_field().await? {
        let is_upload = field.name() == Some(UPLOAD_FIELD) || field.file_name().is_some();
        if !is_upload {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await?;
        return Ok((file_name, data));
    }

    Err(ServerError::MissingField(UPLOAD_FIELD.to_string()))
}
