//! Frozen VGG19 feature extractor.

use std::collections::HashMap;

use candle_core::{Device, Module, Tensor};
use candle_nn::{Conv2d, Conv2dConfig};

use crate::error::{Error, Result};

use super::loader::{self, ModelCache};
use super::ModelConfig;

/// Indices within the `features` stack whose outputs make up a feature set.
pub const FEATURE_LAYERS: [usize; 5] = [0, 5, 10, 19, 28];

/// Channel widths of VGG19's convolutional stack; `None` marks a 2x2 max pool.
const VGG19_CONFIG: [Option<usize>; 21] = [
    Some(64),
    Some(64),
    None,
    Some(128),
    Some(128),
    None,
    Some(256),
    Some(256),
    Some(256),
    Some(256),
    None,
    Some(512),
    Some(512),
    Some(512),
    Some(512),
    None,
    Some(512),
    Some(512),
    Some(512),
    Some(512),
    None,
];

/// Activations captured at each of [`FEATURE_LAYERS`], in order.
pub type FeatureSet = Vec<Tensor>;

/// A single entry of the sequential stack.
#[derive(Debug, Clone)]
enum Layer {
    Conv(Conv2d),
    Relu,
    MaxPool,
}

impl Layer {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Conv(conv) => conv.forward(x),
            Self::Relu => x.relu(),
            Self::MaxPool => x.max_pool2d(2),
        }
    }
}

/// Where each layer sits in torchvision's flattened `features` numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Conv { width: usize },
    Relu,
    MaxPool,
}

/// Flattened VGG19 layout truncated right after the deepest captured layer.
fn truncated_layout() -> Vec<Slot> {
    let depth = FEATURE_LAYERS[FEATURE_LAYERS.len() - 1] + 1;

    let mut slots = Vec::with_capacity(depth + 1);
    for entry in VGG19_CONFIG {
        if slots.len() >= depth {
            break;
        }
        match entry {
            Some(width) => {
                slots.push(Slot::Conv { width });
                slots.push(Slot::Relu);
            }
            None => slots.push(Slot::MaxPool),
        }
    }
    slots.truncate(depth);
    slots
}

/// Pretrained convolutional stack exposing intermediate activations.
///
/// Weights are plain tensors rather than variables, so backpropagation
/// reaches the input image but never the network itself. The extractor is
/// immutable after construction and can be shared across threads.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    layers: Vec<Layer>,
    device: Device,
}

impl FeatureExtractor {
    /// Select a device and load the pretrained weights described by `config`.
    ///
    /// Downloads the weights into the model cache on first use unless a local
    /// weight file is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be initialized or the weights are
    /// unavailable.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let device = select_device(config.force_cpu)?;
        tracing::info!("Using compute device: {device:?}");

        let path = match &config.weights {
            Some(path) => path.clone(),
            None => {
                let cache = match &config.cache_dir {
                    Some(dir) => ModelCache::with_dir(dir)?,
                    None => ModelCache::new()?,
                };
                cache.vgg19_path()?
            }
        };

        tracing::info!("Loading VGG19 weights from {}", path.display());
        let tensors = loader::load_feature_weights(&path, &device)?;

        Self::from_tensors(&tensors, device)
    }

    /// Build the stack from named tensors (`features.{index}.weight` and
    /// `features.{index}.bias`).
    ///
    /// Channel counts are read from the weights, so the captured layers and
    /// the topology stay fixed while the widths follow the supplied tensors.
    ///
    /// # Errors
    ///
    /// Returns an error if a tensor is missing or the shapes do not chain.
    pub fn from_tensors(tensors: &HashMap<String, Tensor>, device: Device) -> Result<Self> {
        let mut layers = Vec::new();
        let mut in_channels = 3;

        for (index, slot) in truncated_layout().into_iter().enumerate() {
            let layer = match slot {
                Slot::Conv { width } => {
                    let weight = lookup(tensors, index, "weight")?.to_device(&device)?;
                    let bias = lookup(tensors, index, "bias")?.to_device(&device)?;

                    let (out, input, kh, kw) = weight.dims4()?;
                    if input != in_channels || (kh, kw) != (3, 3) || bias.dims1()? != out {
                        return Err(Error::ShapeMismatch {
                            expected: format!(
                                "features.{index} with {in_channels} input channels (VGG19 width {width})"
                            ),
                            actual: format!("weight {:?}, bias {:?}", weight.dims(), bias.dims()),
                        });
                    }
                    in_channels = out;

                    Layer::Conv(Conv2d::new(weight, Some(bias), conv_config()))
                }
                Slot::Relu => Layer::Relu,
                Slot::MaxPool => Layer::MaxPool,
            };
            layers.push(layer);
        }

        Ok(Self { layers, device })
    }

    /// Device the weights live on.
    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Run `image` (N, 3, H, W) through the stack and capture the activations
    /// at [`FEATURE_LAYERS`].
    ///
    /// A captured conv that is followed by a ReLU in the stack is taken after
    /// that ReLU, so only the deepest tap (index 28, the end of the truncated
    /// stack) can hold negative values.
    ///
    /// # Errors
    ///
    /// Returns an error if a tensor operation fails.
    pub fn extract(&self, image: &Tensor) -> Result<FeatureSet> {
        let mut features = Vec::with_capacity(FEATURE_LAYERS.len());
        let mut x = image.clone();

        for (index, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if FEATURE_LAYERS.contains(&index) {
                let captured = match self.layers.get(index + 1) {
                    Some(Layer::Relu) => x.relu()?,
                    _ => x.clone(),
                };
                features.push(captured);
            }
        }

        Ok(features)
    }
}

/// 3x3 convolution, stride 1, padding 1.
fn conv_config() -> Conv2dConfig {
    Conv2dConfig {
        padding: 1,
        ..Conv2dConfig::default()
    }
}

fn lookup<'a>(tensors: &'a HashMap<String, Tensor>, index: usize, param: &str) -> Result<&'a Tensor> {
    let key = format!("features.{index}.{param}");
    tensors.get(&key).ok_or_else(|| Error::ModelLoad {
        name: "vgg19".to_string(),
        source: candle_core::Error::Msg(format!("missing tensor {key}")),
    })
}

/// Pick the accelerator if one is compiled in and present, else the CPU.
///
/// # Errors
///
/// Returns an error if an available accelerator fails to initialize.
pub fn select_device(force_cpu: bool) -> Result<Device> {
    if force_cpu {
        return Ok(Device::Cpu);
    }
    if candle_core::utils::cuda_is_available() {
        return Device::new_cuda(0).map_err(|source| Error::Device { source });
    }
    if candle_core::utils::metal_is_available() {
        return Device::new_metal(0).map_err(|source| Error::Device { source });
    }
    Ok(Device::Cpu)
}

/// Randomly initialized VGG19 weights with every width divided by `divisor`.
#[cfg(test)]
#[allow(clippy::cast_precision_loss)]
pub(crate) fn random_weights(divisor: usize, device: &Device) -> HashMap<String, Tensor> {
    let mut tensors = HashMap::new();
    let mut in_channels = 3;

    for (index, slot) in truncated_layout().into_iter().enumerate() {
        if let Slot::Conv { width } = slot {
            let out = (width / divisor).max(1);
            let std = (2.0 / (in_channels * 9) as f64).sqrt();
            tensors.insert(
                format!("features.{index}.weight"),
                Tensor::randn(0f32, std as f32, (out, in_channels, 3, 3), device).unwrap(),
            );
            tensors.insert(
                format!("features.{index}.bias"),
                Tensor::zeros(out, candle_core::DType::F32, device).unwrap(),
            );
            in_channels = out;
        }
    }

    tensors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_vgg19_numbering() {
        let layout = truncated_layout();

        assert_eq!(layout.len(), 29);
        for index in FEATURE_LAYERS {
            assert!(matches!(layout[index], Slot::Conv { .. }), "index {index}");
        }
        assert_eq!(layout[4], Slot::MaxPool);
        assert_eq!(layout[27], Slot::MaxPool);
        assert_eq!(layout[28], Slot::Conv { width: 512 });
    }

    #[test]
    fn test_feature_shapes() {
        let device = Device::Cpu;
        let extractor = FeatureExtractor::from_tensors(&random_weights(16, &device), device.clone())
            .unwrap();
        let image = Tensor::rand(0f32, 1f32, (1, 3, 32, 32), &device).unwrap();

        let features = extractor.extract(&image).unwrap();

        let shapes: Vec<_> = features.iter().map(|f| f.dims4().unwrap()).collect();
        assert_eq!(
            shapes,
            vec![
                (1, 4, 32, 32),
                (1, 8, 16, 16),
                (1, 16, 8, 8),
                (1, 32, 4, 4),
                (1, 32, 2, 2),
            ]
        );
    }

    #[test]
    fn test_taps_before_relu_are_rectified() {
        let device = Device::Cpu;
        let extractor = FeatureExtractor::from_tensors(&random_weights(16, &device), device.clone())
            .unwrap();
        let image = Tensor::randn(0f32, 1f32, (1, 3, 32, 32), &device).unwrap();

        let features = extractor.extract(&image).unwrap();

        for (feature, index) in features.iter().zip(FEATURE_LAYERS).take(4) {
            let min = feature.min_all().unwrap().to_scalar::<f32>().unwrap();
            assert!(min >= 0.0, "layer {index} min {min}");
        }
    }

    #[test]
    fn test_deepest_tap_is_raw_conv_output() {
        let device = Device::Cpu;
        let tensors = random_weights(16, &device);
        let extractor = FeatureExtractor::from_tensors(&tensors, device.clone()).unwrap();
        let image = Tensor::rand(0f32, 1f32, (1, 3, 16, 16), &device).unwrap();

        let features = extractor.extract(&image).unwrap();

        // Push the input through every layer but the last, then apply conv 28 by hand
        let mut x = image;
        for layer in &extractor.layers[..28] {
            x = layer.forward(&x).unwrap();
        }
        let conv = Conv2d::new(
            tensors["features.28.weight"].clone(),
            Some(tensors["features.28.bias"].clone()),
            conv_config(),
        );
        let expected = conv.forward(&x).unwrap();

        let diff = (&features[4] - &expected)
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap();
        assert!(diff.to_scalar::<f32>().unwrap() < 1e-5);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let device = Device::Cpu;
        let extractor = FeatureExtractor::from_tensors(&random_weights(16, &device), device.clone())
            .unwrap();
        let image = Tensor::rand(0f32, 1f32, (1, 3, 16, 16), &device).unwrap();

        let first = extractor.extract(&image).unwrap();
        let second = extractor.extract(&image).unwrap();

        for (a, b) in first.iter().zip(&second) {
            let diff = (a - b).unwrap().abs().unwrap().max_all().unwrap();
            assert_eq!(diff.to_scalar::<f32>().unwrap(), 0.0);
        }
    }

    #[test]
    fn test_missing_tensor_is_load_error() {
        let device = Device::Cpu;
        let mut tensors = random_weights(16, &device);
        tensors.remove("features.19.weight");

        let err = FeatureExtractor::from_tensors(&tensors, device).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Load);
    }

    #[test]
    fn test_mismatched_widths_are_rejected() {
        let device = Device::Cpu;
        let mut tensors = random_weights(16, &device);
        tensors.insert(
            "features.5.weight".to_string(),
            Tensor::zeros((8, 7, 3, 3), candle_core::DType::F32, &device).unwrap(),
        );

        let err = FeatureExtractor::from_tensors(&tensors, device).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_force_cpu() {
        assert!(matches!(select_device(true).unwrap(), Device::Cpu));
    }
}
