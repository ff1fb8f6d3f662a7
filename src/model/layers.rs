//! Inference kernels for the supported layer types
//!
//! All kernels operate on a single sample in HWC layout. Convolutions are
//! lowered to im2col + GEMM; patch extraction is split across rayon workers,
//! each output position being written by exactly one worker so results do not
//! depend on scheduling.

use ndarray::{Array1, Array2, Array3, Axis, Zip};
use rayon::prelude::*;

use super::architecture::{Activation, Padding};
use crate::error::{DermaError, Result};

/// Shape of an intermediate activation for one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorShape {
    Spatial {
        height: usize,
        width: usize,
        channels: usize,
    },
    Flat(usize),
}

impl TensorShape {
    /// Size of the trailing axis
    pub fn channels(&self) -> usize {
        match *self {
            TensorShape::Spatial { channels, .. } => channels,
            TensorShape::Flat(n) => n,
        }
    }

    pub fn len(&self) -> usize {
        match *self {
            TensorShape::Spatial {
                height,
                width,
                channels,
            } => height * width * channels,
            TensorShape::Flat(n) => n,
        }
    }
}

impl std::fmt::Display for TensorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TensorShape::Spatial {
                height,
                width,
                channels,
            } => write!(f, "({}, {}, {})", height, width, channels),
            TensorShape::Flat(n) => write!(f, "({})", n),
        }
    }
}

/// Activation of one sample flowing through the network
#[derive(Debug, Clone)]
pub(crate) enum Feature {
    Spatial(Array3<f32>),
    Flat(Array1<f32>),
}

impl Feature {
    fn shape_name(&self) -> &'static str {
        match self {
            Feature::Spatial(_) => "spatial",
            Feature::Flat(_) => "flat",
        }
    }

    pub fn expect_spatial(self, layer: &str) -> Result<Array3<f32>> {
        match self {
            Feature::Spatial(x) => Ok(x),
            other => Err(DermaError::InferenceFault(format!(
                "layer '{}' expects a spatial input, got {}",
                layer,
                other.shape_name()
            ))),
        }
    }

    pub fn expect_flat(self, layer: &str) -> Result<Array1<f32>> {
        match self {
            Feature::Flat(x) => Ok(x),
            other => Err(DermaError::InferenceFault(format!(
                "layer '{}' expects a flat input, got {}",
                layer,
                other.shape_name()
            ))),
        }
    }
}

/// Sliding-window geometry of a convolution or pooling layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub kernel: [usize; 2],
    pub strides: [usize; 2],
    pub pad_top: usize,
    pub pad_left: usize,
    pub in_height: usize,
    pub in_width: usize,
    pub out_height: usize,
    pub out_width: usize,
}

impl Window {
    /// Resolve output size and padding with TensorFlow semantics
    pub fn new(
        in_height: usize,
        in_width: usize,
        kernel: [usize; 2],
        strides: [usize; 2],
        padding: Padding,
    ) -> std::result::Result<Self, String> {
        if kernel.contains(&0) || strides.contains(&0) {
            return Err(format!(
                "kernel {:?} and strides {:?} must be positive",
                kernel, strides
            ));
        }
        let (out_height, pad_top) = axis_geometry(in_height, kernel[0], strides[0], padding)?;
        let (out_width, pad_left) = axis_geometry(in_width, kernel[1], strides[1], padding)?;
        Ok(Self {
            kernel,
            strides,
            pad_top,
            pad_left,
            in_height,
            in_width,
            out_height,
            out_width,
        })
    }

    /// Input coordinate for output index `out` and kernel offset `k`, if inside the image
    #[inline]
    fn source(&self, out: usize, k: usize, axis: usize) -> Option<usize> {
        let (stride, pad, limit) = if axis == 0 {
            (self.strides[0], self.pad_top, self.in_height)
        } else {
            (self.strides[1], self.pad_left, self.in_width)
        };
        let pos = (out * stride + k).checked_sub(pad)?;
        (pos < limit).then_some(pos)
    }
}

fn axis_geometry(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: Padding,
) -> std::result::Result<(usize, usize), String> {
    match padding {
        Padding::Valid => {
            if input < kernel {
                return Err(format!(
                    "input extent {} is smaller than kernel extent {} with valid padding",
                    input, kernel
                ));
            }
            Ok(((input - kernel) / stride + 1, 0))
        }
        Padding::Same => {
            let out = (input + stride - 1) / stride;
            let total = ((out - 1) * stride + kernel).saturating_sub(input);
            Ok((out, total / 2))
        }
    }
}

/// Standard convolution. `kernel` is `(kh * kw * in, out)` in Keras order.
pub(crate) fn conv2d(
    x: &Array3<f32>,
    kernel: &Array2<f32>,
    bias: Option<&Array1<f32>>,
    window: &Window,
) -> Result<Array3<f32>> {
    let channels = x.dim().2;
    let [kh, kw] = window.kernel;
    let patch_len = kh * kw * channels;
    let positions = window.out_height * window.out_width;

    let mut patches = vec![0.0f32; positions * patch_len];
    patches
        .par_chunks_mut(patch_len)
        .enumerate()
        .for_each(|(p, patch)| {
            let (oy, ox) = (p / window.out_width, p % window.out_width);
            for ky in 0..kh {
                let Some(iy) = window.source(oy, ky, 0) else { continue };
                for kx in 0..kw {
                    let Some(ix) = window.source(ox, kx, 1) else { continue };
                    let base = (ky * kw + kx) * channels;
                    for ci in 0..channels {
                        patch[base + ci] = x[[iy, ix, ci]];
                    }
                }
            }
        });

    let patches = Array2::from_shape_vec((positions, patch_len), patches)?;
    let mut out = patches.dot(kernel);
    if let Some(bias) = bias {
        out += bias;
    }
    let filters = out.ncols();
    Ok(out.into_shape_with_order((window.out_height, window.out_width, filters))?)
}

/// Depthwise convolution with depth multiplier 1. `kernel` is `(kh, kw, channels)`.
pub(crate) fn depthwise_conv2d(
    x: &Array3<f32>,
    kernel: &Array3<f32>,
    bias: Option<&Array1<f32>>,
    window: &Window,
) -> Result<Array3<f32>> {
    let channels = x.dim().2;
    let [kh, kw] = window.kernel;

    let mut out = vec![0.0f32; window.out_height * window.out_width * channels];
    out.par_chunks_mut(channels)
        .enumerate()
        .for_each(|(p, pixel)| {
            let (oy, ox) = (p / window.out_width, p % window.out_width);
            for ky in 0..kh {
                let Some(iy) = window.source(oy, ky, 0) else { continue };
                for kx in 0..kw {
                    let Some(ix) = window.source(ox, kx, 1) else { continue };
                    for (ch, acc) in pixel.iter_mut().enumerate() {
                        *acc += x[[iy, ix, ch]] * kernel[[ky, kx, ch]];
                    }
                }
            }
            if let Some(bias) = bias {
                for (acc, b) in pixel.iter_mut().zip(bias.iter()) {
                    *acc += *b;
                }
            }
        });

    Ok(Array3::from_shape_vec(
        (window.out_height, window.out_width, channels),
        out,
    )?)
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum PoolKind {
    Max,
    Average,
}

/// Max or average pooling; padded positions are excluded from both
pub(crate) fn pool2d(x: &Array3<f32>, window: &Window, kind: PoolKind) -> Array3<f32> {
    let channels = x.dim().2;
    let [kh, kw] = window.kernel;
    let mut out = Array3::<f32>::zeros((window.out_height, window.out_width, channels));

    for oy in 0..window.out_height {
        for ox in 0..window.out_width {
            for ch in 0..channels {
                let mut acc = match kind {
                    PoolKind::Max => f32::NEG_INFINITY,
                    PoolKind::Average => 0.0,
                };
                let mut count = 0usize;
                for ky in 0..kh {
                    let Some(iy) = window.source(oy, ky, 0) else { continue };
                    for kx in 0..kw {
                        let Some(ix) = window.source(ox, kx, 1) else { continue };
                        let v = x[[iy, ix, ch]];
                        match kind {
                            PoolKind::Max => acc = acc.max(v),
                            PoolKind::Average => acc += v,
                        }
                        count += 1;
                    }
                }
                out[[oy, ox, ch]] = match kind {
                    PoolKind::Max => acc,
                    PoolKind::Average if count > 0 => acc / count as f32,
                    PoolKind::Average => 0.0,
                };
            }
        }
    }
    out
}

pub(crate) fn global_average_pool(x: &Array3<f32>) -> Array1<f32> {
    let (h, w, _) = x.dim();
    x.sum_axis(Axis(0)).sum_axis(Axis(0)) / (h * w) as f32
}

/// Keras channels-last flatten: row-major over (height, width, channels)
pub(crate) fn flatten(x: &Array3<f32>) -> Array1<f32> {
    x.iter().copied().collect()
}

pub(crate) fn dense(
    x: &Array1<f32>,
    kernel: &Array2<f32>,
    bias: Option<&Array1<f32>>,
) -> Array1<f32> {
    let mut out = x.dot(kernel);
    if let Some(bias) = bias {
        out += bias;
    }
    out
}

/// Inference-mode batch normalization folded into a per-channel affine map
pub(crate) fn fold_batch_norm(
    gamma: Array1<f32>,
    beta: Array1<f32>,
    mean: Array1<f32>,
    variance: Array1<f32>,
    epsilon: f32,
) -> (Array1<f32>, Array1<f32>) {
    let scale = gamma / variance.mapv(|v| (v + epsilon).sqrt());
    let shift = beta - &mean * &scale;
    (scale, shift)
}

/// Apply a per-channel affine map along the trailing axis
pub(crate) fn affine(feature: Feature, scale: &Array1<f32>, shift: &Array1<f32>) -> Feature {
    match feature {
        Feature::Spatial(mut x) => {
            x *= scale;
            x += shift;
            Feature::Spatial(x)
        }
        Feature::Flat(x) => Feature::Flat(x * scale + shift),
    }
}

pub(crate) fn activate(feature: Feature, activation: Activation) -> Feature {
    match (activation, feature) {
        (Activation::Linear, f) => f,
        (Activation::Softmax, Feature::Flat(mut x)) => {
            softmax_in_place(x.view_mut());
            Feature::Flat(x)
        }
        (Activation::Softmax, Feature::Spatial(mut x)) => {
            for lane in x.lanes_mut(Axis(2)) {
                softmax_in_place(lane);
            }
            Feature::Spatial(x)
        }
        (act, Feature::Flat(mut x)) => {
            x.mapv_inplace(|v| elementwise(act, v));
            Feature::Flat(x)
        }
        (act, Feature::Spatial(mut x)) => {
            x.par_mapv_inplace(|v| elementwise(act, v));
            Feature::Spatial(x)
        }
    }
}

#[inline]
fn elementwise(activation: Activation, v: f32) -> f32 {
    match activation {
        Activation::Linear | Activation::Softmax => v,
        Activation::Relu => v.max(0.0),
        Activation::Relu6 => v.clamp(0.0, 6.0),
        Activation::Sigmoid => sigmoid(v),
        Activation::Tanh => v.tanh(),
        Activation::Swish => v * sigmoid(v),
    }
}

#[inline]
fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

fn softmax_in_place(mut x: ndarray::ArrayViewMut1<f32>) {
    let max = x.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    x.mapv_inplace(|v| (v - max).exp());
    let sum = x.sum();
    if sum > 0.0 {
        x /= sum;
    }
}

/// Element-wise sanity check on a finished score vector
pub(crate) fn all_finite(x: &Array1<f32>) -> bool {
    Zip::from(x).all(|v| v.is_finite())
}
