//! Sequential network with bound weights

use std::collections::HashSet;

use ndarray::{Array1, Array2, Array3, ArrayView4};

use super::architecture::{Activation, Architecture, ConvSpec, DataFormat, LayerSpec, PoolSpec};
use super::layers::{self, Feature, PoolKind, TensorShape, Window};
use super::weights::WeightStore;
use crate::error::{DermaError, Result};

#[derive(Debug)]
enum Op {
    Conv {
        kernel: Array2<f32>,
        bias: Option<Array1<f32>>,
        window: Window,
        activation: Activation,
    },
    Depthwise {
        kernel: Array3<f32>,
        bias: Option<Array1<f32>>,
        window: Window,
        activation: Activation,
    },
    Affine {
        scale: Array1<f32>,
        shift: Array1<f32>,
    },
    Activation(Activation),
    Pool(Window, PoolKind),
    GlobalAveragePool,
    Flatten,
    Identity,
    Dense {
        kernel: Array2<f32>,
        bias: Option<Array1<f32>>,
        activation: Activation,
    },
}

#[derive(Debug)]
struct Layer {
    name: String,
    class_name: &'static str,
    op: Op,
    output_shape: TensorShape,
}

impl Layer {
    fn apply(&self, feature: Feature) -> Result<Feature> {
        let name = self.name.as_str();
        let out = match &self.op {
            Op::Conv {
                kernel,
                bias,
                window,
                activation,
            } => {
                let x = feature.expect_spatial(name)?;
                let y = layers::conv2d(&x, kernel, bias.as_ref(), window)?;
                layers::activate(Feature::Spatial(y), *activation)
            }
            Op::Depthwise {
                kernel,
                bias,
                window,
                activation,
            } => {
                let x = feature.expect_spatial(name)?;
                let y = layers::depthwise_conv2d(&x, kernel, bias.as_ref(), window)?;
                layers::activate(Feature::Spatial(y), *activation)
            }
            Op::Affine { scale, shift } => layers::affine(feature, scale, shift),
            Op::Activation(activation) => layers::activate(feature, *activation),
            Op::Pool(window, kind) => {
                let x = feature.expect_spatial(name)?;
                Feature::Spatial(layers::pool2d(&x, window, *kind))
            }
            Op::GlobalAveragePool => {
                Feature::Flat(layers::global_average_pool(&feature.expect_spatial(name)?))
            }
            Op::Flatten => Feature::Flat(layers::flatten(&feature.expect_spatial(name)?)),
            Op::Identity => feature,
            Op::Dense {
                kernel,
                bias,
                activation,
            } => {
                let x = feature.expect_flat(name)?;
                layers::activate(Feature::Flat(layers::dense(&x, kernel, bias.as_ref())), *activation)
            }
        };
        Ok(out)
    }

    fn parameter_count(&self) -> usize {
        let bias_len = |b: &Option<Array1<f32>>| b.as_ref().map_or(0, |b| b.len());
        match &self.op {
            Op::Conv { kernel, bias, .. } | Op::Dense { kernel, bias, .. } => kernel.len() + bias_len(bias),
            Op::Depthwise { kernel, bias, .. } => kernel.len() + bias_len(bias),
            Op::Affine { scale, shift } => scale.len() + shift.len(),
            _ => 0,
        }
    }
}

/// Summary of one bound layer, for logging and inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    pub name: String,
    pub class_name: &'static str,
    pub output_shape: TensorShape,
    pub parameters: usize,
}

/// Immutable network ready for forward passes
#[derive(Debug)]
pub struct Network {
    name: String,
    input_shape: [usize; 3],
    layers: Vec<Layer>,
    output_width: usize,
}

impl Network {
    /// Bind weights to the architecture, checking names and shapes exactly.
    ///
    /// Every tensor in `store` must be consumed by some layer.
    pub(crate) fn build(arch: &Architecture, mut store: WeightStore) -> Result<Self> {
        let [height, width, channels] = arch.input_shape;
        if height == 0 || width == 0 || channels == 0 {
            return Err(DermaError::IncompatibleWeights(format!(
                "input shape {:?} must be positive",
                arch.input_shape
            )));
        }

        let mut shape = TensorShape::Spatial {
            height,
            width,
            channels,
        };
        let mut seen = HashSet::new();
        let mut bound = Vec::with_capacity(arch.layers.len());

        for spec in &arch.layers {
            if !seen.insert(spec.name().to_string()) {
                return Err(DermaError::IncompatibleWeights(format!(
                    "duplicate layer name '{}'",
                    spec.name()
                )));
            }
            let (op, output_shape) = bind_layer(spec, shape, &mut store)?;
            bound.push(Layer {
                name: spec.name().to_string(),
                class_name: spec.class_name(),
                op,
                output_shape,
            });
            shape = output_shape;
        }
        store.ensure_consumed()?;

        let output_width = match shape {
            TensorShape::Flat(n) if n > 0 => n,
            other => {
                return Err(DermaError::IncompatibleWeights(format!(
                    "network must end in a flat score vector, final shape is {}",
                    other
                )))
            }
        };

        Ok(Self {
            name: arch.name.clone(),
            input_shape: arch.input_shape,
            layers: bound,
            output_width,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_shape(&self) -> [usize; 3] {
        self.input_shape
    }

    /// Length of the score vector produced per sample
    pub fn output_width(&self) -> usize {
        self.output_width
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    pub fn summary(&self) -> Vec<LayerSummary> {
        self.layers
            .iter()
            .map(|l| LayerSummary {
                name: l.name.clone(),
                class_name: l.class_name,
                output_shape: l.output_shape,
                parameters: l.parameter_count(),
            })
            .collect()
    }

    /// Forward pass over an NHWC batch, returning `(batch, output_width)` scores
    pub fn forward(&self, input: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        let (batch, h, w, c) = input.dim();
        if [h, w, c] != self.input_shape {
            return Err(DermaError::InferenceFault(format!(
                "input sample shape {:?} does not match network input {:?}",
                [h, w, c],
                self.input_shape
            )));
        }

        let mut scores = Array2::zeros((batch, self.output_width));
        for (i, sample) in input.outer_iter().enumerate() {
            let mut feature = Feature::Spatial(sample.to_owned());
            for layer in &self.layers {
                feature = layer.apply(feature)?;
            }
            let out = feature.expect_flat("output")?;
            if !layers::all_finite(&out) {
                return Err(DermaError::InferenceFault(
                    "forward pass produced non-finite scores".to_string(),
                ));
            }
            scores.row_mut(i).assign(&out);
        }
        Ok(scores)
    }
}

fn incompatible(layer: &str, msg: impl std::fmt::Display) -> DermaError {
    DermaError::IncompatibleWeights(format!("layer '{}': {}", layer, msg))
}

fn require_channels_last(name: &str, format: DataFormat) -> Result<()> {
    match format {
        DataFormat::ChannelsLast => Ok(()),
        DataFormat::ChannelsFirst => Err(incompatible(name, "data_format 'channels_first' is not supported")),
    }
}

/// Rejects kernel options the im2col path would otherwise silently ignore
fn require_plain_kernel(conv: &ConvSpec, depthwise: bool) -> Result<()> {
    require_channels_last(&conv.name, conv.data_format)?;
    if conv.dilation_rate != [1, 1] {
        return Err(incompatible(
            &conv.name,
            format!("dilation_rate {:?} is not supported", conv.dilation_rate),
        ));
    }
    if !depthwise && conv.groups != 1 {
        return Err(incompatible(&conv.name, format!("groups={} is not supported", conv.groups)));
    }
    if depthwise && conv.depth_multiplier != 1 {
        return Err(incompatible(
            &conv.name,
            format!("depth_multiplier={} is not supported", conv.depth_multiplier),
        ));
    }
    Ok(())
}

fn spatial_dims(name: &str, shape: TensorShape) -> Result<(usize, usize, usize)> {
    match shape {
        TensorShape::Spatial {
            height,
            width,
            channels,
        } => Ok((height, width, channels)),
        TensorShape::Flat(_) => Err(incompatible(name, "expects a spatial input but receives a flat one")),
    }
}

fn take_bias(store: &mut WeightStore, name: &str, use_bias: bool, len: usize) -> Result<Option<Array1<f32>>> {
    if !use_bias {
        return Ok(None);
    }
    Ok(Some(Array1::from_vec(store.take(name, "bias", &[len])?)))
}

fn conv_window(spec: &ConvSpec, h: usize, w: usize) -> Result<Window> {
    Window::new(h, w, spec.kernel_size, spec.strides, spec.padding)
        .map_err(|msg| incompatible(&spec.name, msg))
}

fn pool_window(spec: &PoolSpec, h: usize, w: usize) -> Result<Window> {
    let strides = spec.strides.unwrap_or(spec.pool_size);
    Window::new(h, w, spec.pool_size, strides, spec.padding).map_err(|msg| incompatible(&spec.name, msg))
}

fn spatial(window: &Window, channels: usize) -> TensorShape {
    TensorShape::Spatial {
        height: window.out_height,
        width: window.out_width,
        channels,
    }
}

fn bind_layer(spec: &LayerSpec, input: TensorShape, store: &mut WeightStore) -> Result<(Op, TensorShape)> {
    let bound = match spec {
        LayerSpec::Conv2D(conv) => {
            require_plain_kernel(conv, false)?;
            let (h, w, cin) = spatial_dims(&conv.name, input)?;
            if conv.filters == 0 {
                return Err(incompatible(&conv.name, "filters must be positive"));
            }
            let window = conv_window(conv, h, w)?;
            let [kh, kw] = conv.kernel_size;
            let values = store.take(&conv.name, "kernel", &[kh, kw, cin, conv.filters])?;
            let kernel = Array2::from_shape_vec((kh * kw * cin, conv.filters), values)
                .map_err(|e| incompatible(&conv.name, e))?;
            let bias = take_bias(store, &conv.name, conv.use_bias, conv.filters)?;
            let shape = spatial(&window, conv.filters);
            (
                Op::Conv {
                    kernel,
                    bias,
                    window,
                    activation: conv.activation,
                },
                shape,
            )
        }
        LayerSpec::DepthwiseConv2D(conv) => {
            require_plain_kernel(conv, true)?;
            let (h, w, channels) = spatial_dims(&conv.name, input)?;
            let window = conv_window(conv, h, w)?;
            let [kh, kw] = conv.kernel_size;
            let values = store.take(&conv.name, "depthwise_kernel", &[kh, kw, channels, 1])?;
            let kernel = Array3::from_shape_vec((kh, kw, channels), values)
                .map_err(|e| incompatible(&conv.name, e))?;
            let bias = take_bias(store, &conv.name, conv.use_bias, channels)?;
            let shape = spatial(&window, channels);
            (
                Op::Depthwise {
                    kernel,
                    bias,
                    window,
                    activation: conv.activation,
                },
                shape,
            )
        }
        LayerSpec::BatchNormalization(bn) => {
            let channels = input.channels();
            let mut take = |tensor: &str| -> Result<Array1<f32>> {
                Ok(Array1::from_vec(store.take(&bn.name, tensor, &[channels])?))
            };
            let gamma = take("gamma")?;
            let beta = take("beta")?;
            let mean = take("moving_mean")?;
            let variance = take("moving_variance")?;
            if variance.iter().any(|v| *v + bn.epsilon <= 0.0) {
                return Err(incompatible(&bn.name, "moving_variance + epsilon must be positive"));
            }
            let (scale, shift) = layers::fold_batch_norm(gamma, beta, mean, variance, bn.epsilon);
            (Op::Affine { scale, shift }, input)
        }
        LayerSpec::Activation(act) => (Op::Activation(act.activation), input),
        LayerSpec::MaxPooling2D(pool) | LayerSpec::AveragePooling2D(pool) => {
            require_channels_last(&pool.name, pool.data_format)?;
            let (h, w, channels) = spatial_dims(&pool.name, input)?;
            let window = pool_window(pool, h, w)?;
            let kind = if matches!(spec, LayerSpec::MaxPooling2D(_)) {
                PoolKind::Max
            } else {
                PoolKind::Average
            };
            let shape = spatial(&window, channels);
            (Op::Pool(window, kind), shape)
        }
        LayerSpec::GlobalAveragePooling2D(gap) => {
            require_channels_last(&gap.name, gap.data_format)?;
            let (_, _, channels) = spatial_dims(&gap.name, input)?;
            (Op::GlobalAveragePool, TensorShape::Flat(channels))
        }
        LayerSpec::Flatten(flat) => {
            require_channels_last(&flat.name, flat.data_format)?;
            match input {
                TensorShape::Flat(_) => (Op::Identity, input),
                spatial_shape => {
                    spatial_dims(&flat.name, spatial_shape)?;
                    (Op::Flatten, TensorShape::Flat(spatial_shape.len()))
                }
            }
        }
        LayerSpec::Dropout(_) => (Op::Identity, input),
        LayerSpec::Dense(dense) => {
            let in_features = match input {
                TensorShape::Flat(n) => n,
                other => {
                    return Err(incompatible(
                        &dense.name,
                        format!("expects a flat input, got {}; add Flatten or GlobalAveragePooling2D", other),
                    ))
                }
            };
            if dense.units == 0 {
                return Err(incompatible(&dense.name, "units must be positive"));
            }
            let values = store.take(&dense.name, "kernel", &[in_features, dense.units])?;
            let kernel = Array2::from_shape_vec((in_features, dense.units), values)
                .map_err(|e| incompatible(&dense.name, e))?;
            let bias = take_bias(store, &dense.name, dense.use_bias, dense.units)?;
            (
                Op::Dense {
                    kernel,
                    bias,
                    activation: dense.activation,
                },
                TensorShape::Flat(dense.units),
            )
        }
    };
    Ok(bound)
}
