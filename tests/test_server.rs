//! Integration test: Server API endpoints

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use dermaclass::inference::{InferenceConfig, InferenceEngine};
use dermaclass::model::{ClassLabels, ScoreModel};
use dermaclass::preprocessing::{InputTensor, PreprocessingConfig};
use dermaclass::server::{create_router, AppState, ServerConfig};
use tower::ServiceExt;

const BOUNDARY: &str = "dermaclass-test-boundary";

struct FixedScores(Vec<f32>);

impl ScoreModel for FixedScores {
    fn output_width(&self) -> usize {
        self.0.len()
    }

    fn forward(&self, _input: &InputTensor) -> dermaclass::Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

fn test_config(max_upload_size: usize) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        model_path: "model.json".into(),
        weights_path: "weights.bin".into(),
        class_names: "Acne,Atropic Dermatitis".to_string(),
        max_upload_size,
        cors_origin: None,
        inference: InferenceConfig::default(),
    }
}

fn test_app_with_limit(max_upload_size: usize) -> axum::Router {
    let engine = InferenceEngine::new(
        InferenceConfig::default(),
        Arc::new(FixedScores(vec![0.92, 0.08])),
        ClassLabels::default(),
        PreprocessingConfig::new().with_image_size(32),
    )
    .unwrap();
    let state = Arc::new(AppState::new(test_config(max_upload_size), engine));
    create_router(state)
}

fn test_app() -> axum::Router {
    test_app_with_limit(10 * 1024 * 1024)
}

fn predict_request(field: &str, file_name: Option<&str>, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(common::multipart_body(BOUNDARY, field, file_name, data)))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_root_reports_running() {
    let app = test_app();
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], br#"{"status":"API is running"}"#);
}

#[tokio::test]
async fn test_predict_returns_class_and_scores() {
    let app = test_app();
    let image = common::solid_png(64, 48, [200, 120, 90]);
    let response = app
        .oneshot(predict_request("file", Some("lesion.png"), &image))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(
        std::str::from_utf8(&body).unwrap(),
        r#"{"class":"Acne","confidence":0.92,"all_scores":{"Acne":0.92,"Atropic Dermatitis":0.08}}"#
    );
}

#[tokio::test]
async fn test_predict_accepts_other_file_field() {
    let app = test_app();
    let image = common::gradient_jpeg(40, 40);
    let response = app
        .oneshot(predict_request("image", Some("photo.jpg"), &image))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["class"], "Acne");
}

#[tokio::test]
async fn test_invalid_image_is_client_error() {
    let app = test_app();
    let response = app
        .clone()
        .oneshot(predict_request("file", Some("notes.txt"), b"definitely not an image"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], true);
    assert_eq!(json["kind"], "invalid_image");

    // The failed request leaves the service healthy
    let image = common::solid_png(16, 16, [10, 20, 30]);
    let response = app
        .oneshot(predict_request("file", Some("ok.png"), &image))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["confidence"], 0.92);
}

#[tokio::test]
async fn test_empty_upload_is_client_error() {
    let app = test_app();
    let response = app
        .oneshot(predict_request("file", Some("empty.png"), b""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "invalid_image");
}

#[tokio::test]
async fn test_missing_file_field() {
    let app = test_app();
    let response = app
        .oneshot(predict_request("comment", None, b"hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "missing_field");
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let app = test_app_with_limit(1024);
    let image = vec![0u8; 8 * 1024];
    let response = app
        .oneshot(predict_request("file", Some("big.png"), &image))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = test_app();
    let response = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["error"], true);
}

#[tokio::test]
async fn test_wrong_method_is_json_405() {
    let app = test_app();
    let response = app
        .oneshot(Request::builder().uri("/predict").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let json = json_body(response).await;
    assert_eq!(json["error"], true);
}

#[tokio::test]
async fn test_non_multipart_body_is_json_400() {
    let app = test_app();
    let image = common::solid_png(16, 16, [10, 20, 30]);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/predict")
                .header(header::CONTENT_TYPE, "image/png")
                .body(Body::from(image))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], true);
    assert_eq!(json["kind"], "bad_request");
}
