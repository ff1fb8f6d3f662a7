//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;

use dermaclass::model::architecture::{DenseSpec, NamedSpec};
use dermaclass::model::{Activation, Architecture, ArtifactPaths, LayerSpec, NamedTensor, WeightFile};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

/// Pooling + softmax head whose output ignores the image: a zero kernel makes
/// the logits equal to the bias, so the scores are `probabilities` exactly.
pub fn constant_head(image_size: usize) -> Architecture {
    Architecture::new(
        "constant-head",
        [image_size, image_size, 3],
        vec![
            LayerSpec::GlobalAveragePooling2D(NamedSpec::new("pool")),
            LayerSpec::Dense(DenseSpec {
                name: "head".into(),
                units: 2,
                activation: Activation::Softmax,
                use_bias: true,
            }),
        ],
    )
}

pub fn constant_head_weights(probabilities: [f32; 2]) -> WeightFile {
    WeightFile::new(vec![
        NamedTensor::new("head", "kernel", vec![3, 2], vec![0.0; 6]),
        NamedTensor::new("head", "bias", vec![2], probabilities.iter().map(|p| p.ln()).collect()),
    ])
}

/// Pooling + linear head that reads the mean channel values
pub fn channel_head(image_size: usize) -> (Architecture, WeightFile) {
    let arch = Architecture::new(
        "channel-head",
        [image_size, image_size, 3],
        vec![
            LayerSpec::GlobalAveragePooling2D(NamedSpec::new("pool")),
            LayerSpec::Dense(DenseSpec {
                name: "head".into(),
                units: 2,
                activation: Activation::Softmax,
                use_bias: false,
            }),
        ],
    );
    // Class 0 follows red, class 1 follows blue
    let weights = WeightFile::new(vec![NamedTensor::new(
        "head",
        "kernel",
        vec![3, 2],
        vec![0.05, 0.0, 0.0, 0.0, 0.0, 0.05],
    )]);
    (arch, weights)
}

pub fn write_artifacts(dir: &Path, arch: &Architecture, weights: &WeightFile) -> ArtifactPaths {
    let paths = ArtifactPaths::new(dir.join("model.json"), dir.join("weights.bin"));
    arch.save(&paths.architecture).unwrap();
    weights.save(&paths.weights).unwrap();
    paths
}

pub fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode(
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb))),
        ImageFormat::Png,
    )
}

pub fn solid_rgba_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    encode(
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(rgba))),
        ImageFormat::Png,
    )
}

pub fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
}

/// Hand-built `multipart/form-data` body with a single part
pub fn multipart_body(boundary: &str, field: &str, file_name: Option<&str>, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    match file_name {
        Some(name) => body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, name
            )
            .as_bytes(),
        ),
        None => body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n", field).as_bytes(),
        ),
    }
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}
