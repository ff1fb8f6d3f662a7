//! Dermaclass CLI Module
//!
//! Command-line interface for serving the classifier, classifying a single
//! image, and inspecting model artifacts.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::inference::InferenceEngine;
use crate::model::{ArtifactPaths, ModelHandle, ModelLoader};
use crate::server::{run_server, ServerConfig};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

// Progress goes to stderr so stdout stays machine-readable.
fn step_run(msg: &str) {
    eprint!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    eprintln!("{} {}", ok("done"), dim(detail));
}

fn kv(key: &str, val: &str) {
    println!("  {:<12} {}", muted(key), val.white());
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "dermaclass")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Skin-condition image classification service")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve(ServeArgs),

    /// Classify a single image and print the JSON result
    Predict {
        /// Image file (JPEG, PNG, ...)
        #[arg(short, long)]
        image: PathBuf,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Show the model's layers and preprocessing
    Info {
        #[command(flatten)]
        model: ModelArgs,
    },
}

/// Model artifact overrides; unset values fall back to the environment
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Architecture artifact (JSON)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Weights artifact
    #[arg(long)]
    pub weights: Option<PathBuf>,

    /// Comma-separated class names in model output order
    #[arg(long)]
    pub labels: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Bind address
    #[arg(long)]
    pub host: Option<String>,

    /// Port
    #[arg(short, long)]
    pub port: Option<u16>,

    #[command(flatten)]
    pub model: ModelArgs,
}

impl ModelArgs {
    /// Apply the overrides on top of an environment-derived config
    pub fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(model) = self.model {
            config.model_path = model;
        }
        if let Some(weights) = self.weights {
            config.weights_path = weights;
        }
        if let Some(labels) = self.labels {
            config.class_names = labels;
        }
        config
    }
}

impl ServeArgs {
    pub fn into_config(self) -> ServerConfig {
        let mut config = self.model.apply(ServerConfig::default());
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

fn load_model(config: &ServerConfig) -> anyhow::Result<ModelHandle> {
    step_run("Loading model");
    let start = Instant::now();
    let paths = ArtifactPaths::new(&config.model_path, &config.weights_path);
    let handle = ModelLoader::load(&paths, config.labels()?)?;
    step_done(&format!("{} params in {:?}", handle.parameter_count(), start.elapsed()));
    Ok(handle)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.into_config();

    eprintln!();
    eprintln!("  {} {}", "Dermaclass".white().bold(), dim(&format!("v{}", env!("CARGO_PKG_VERSION"))));
    eprintln!("  {} {}", muted("Status "), accent(&format!("http://{}:{}/", config.host, config.port)));
    eprintln!("  {} {}", muted("Predict"), accent(&format!("http://{}:{}/predict", config.host, config.port)));
    eprintln!("  {}", dim("ctrl+c to stop"));
    eprintln!();

    run_server(config).await
}

pub fn cmd_predict(image: &Path, model: ModelArgs) -> anyhow::Result<()> {
    let config = model.apply(ServerConfig::default());
    let handle = load_model(&config)?;
    let engine = InferenceEngine::from_handle(config.inference.clone(), handle)?;

    step_run(&format!("Classifying {}", image.display()));
    let start = Instant::now();
    let bytes = std::fs::read(image)?;
    let result = engine.predict(&bytes)?;
    step_done(&format!("{:?}", start.elapsed()));

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub fn cmd_info(model: ModelArgs) -> anyhow::Result<()> {
    let config = model.apply(ServerConfig::default());
    let handle = load_model(&config)?;
    let [height, width, channels] = handle.input_shape();
    let preprocessing = handle.preprocessing();

    section("Model");
    kv("Name", handle.name());
    kv("Input", &format!("{}×{}×{}", height, width, channels));
    kv("Parameters", &handle.parameter_count().to_string());
    kv("Labels", &handle.labels().iter().collect::<Vec<_>>().join(", "));

    section("Preprocessing");
    kv("Version", &preprocessing.version.to_string());
    kv("Size", &preprocessing.image_size.to_string());
    kv("Resize", &format!("{:?}", preprocessing.resize_filter));
    kv("Normalize", &format!("{:?}", preprocessing.normalization));

    section("Layers");
    for layer in handle.summary() {
        println!(
            "  {:<28} {:<24} {:>14} {:>10}",
            layer.name,
            muted(&layer.class_name),
            layer.output_shape.to_string(),
            layer.parameters
        );
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from([
            "dermaclass", "serve", "--port", "9000", "--model", "m.json", "--labels", "a,b,c",
        ])
        .unwrap();
        let Some(Commands::Serve(args)) = cli.command else {
            panic!("expected serve");
        };
        let config = args.into_config();
        assert_eq!(config.port, 9000);
        assert_eq!(config.model_path, PathBuf::from("m.json"));
        assert_eq!(config.labels().unwrap().len(), 3);
    }

    #[test]
    fn test_no_subcommand() {
        let cli = Cli::try_parse_from(["dermaclass"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_predict_requires_image() {
        assert!(Cli::try_parse_from(["dermaclass", "predict"]).is_err());
    }

    #[test]
    fn test_predict_reports_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelArgs {
            model: Some(dir.path().join("model.json")),
            weights: Some(dir.path().join("weights.bin")),
            labels: Some("Acne,Atropic Dermatitis".to_string()),
        };
        let image: &Path = Path::new("lesion.png");
        let err = cmd_predict(image, model).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::DermaError>(),
            Some(crate::DermaError::MissingArtifact { .. })
        ));
    }
}
