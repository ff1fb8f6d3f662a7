//! HTTP server module
//!
//! Exposes the classifier over HTTP:
//! - `GET /` liveness message
//! - `POST /predict` multipart image upload, JSON classification
//!
//! The model is loaded before the listener is bound, so the server never
//! accepts a request it cannot serve.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::inference::{InferenceConfig, InferenceEngine};
use crate::model::{ArtifactPaths, ClassLabels, ModelLoader, DEFAULT_MODEL_PATH, DEFAULT_WEIGHTS_PATH};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub weights_path: PathBuf,
    /// Comma-separated class names, in model output order
    pub class_names: String,
    pub max_upload_size: usize,
    /// Allowed CORS origin; `None` or `*` allows any
    pub cors_origin: Option<String>,
    /// Score precision and score logging
    pub inference: InferenceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            model_path: std::env::var("MODEL_PATH")
                .unwrap_or_else(|_| DEFAULT_MODEL_PATH.to_string())
                .into(),
            weights_path: std::env::var("WEIGHTS_PATH")
                .unwrap_or_else(|_| DEFAULT_WEIGHTS_PATH.to_string())
                .into(),
            class_names: std::env::var("CLASS_NAMES")
                .unwrap_or_else(|_| ClassLabels::default().iter().collect::<Vec<_>>().join(",")),
            max_upload_size: std::env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20 * 1024 * 1024), // 20MB
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|s| !s.is_empty()),
            inference: InferenceConfig::from_env(),
        }
    }
}

impl ServerConfig {
    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.model_path, &self.weights_path)
    }

    pub fn labels(&self) -> crate::Result<ClassLabels> {
        ClassLabels::parse_list(&self.class_names)
    }
}

/// Load the model and build the shared inference engine.
///
/// Any artifact or label problem is returned here, before serving starts.
pub fn load_engine(config: &ServerConfig) -> crate::Result<InferenceEngine> {
    let labels = config.labels()?;
    let handle = ModelLoader::load(&config.artifact_paths(), labels)?;
    InferenceEngine::from_handle(config.inference.clone(), handle)
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    info!(
        model_path = %config.model_path.display(),
        weights_path = %config.weights_path.display(),
        score_decimals = config.inference.score_decimals,
        "Initializing model"
    );

    let loader_config = config.clone();
    let engine = tokio::task::spawn_blocking(move || load_engine(&loader_config)).await??;

    let state = Arc::new(AppState::new(config.clone(), engine));
    let shutdown_state = Arc::clone(&state);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        host = %config.host,
        port = config.port,
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        "Dermaclass server starting"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");
    info!(url = %format!("http://{}/predict", addr), "Prediction endpoint available");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl+c, shutting down");
            return;
        }
        info!(
            started_at = %shutdown_state.started_at.to_rfc3339(),
            uptime_secs = shutdown_state.uptime().num_seconds(),
            "Shutdown signal received, stopping server gracefully"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
