//! Pretrained network loading and feature extraction.

mod loader;
mod vgg;

use std::path::PathBuf;

pub use loader::{load_feature_weights, ModelCache, VGG19_FILENAME, VGG19_URL};
pub use vgg::{select_device, FeatureExtractor, FeatureSet, FEATURE_LAYERS};

#[cfg(test)]
pub(crate) use vgg::random_weights;

/// Where the pretrained weights come from and where they run.
#[derive(Debug, Clone, Default)]
pub struct ModelConfig {
    /// Local safetensors file; skips the cache and download when set.
    pub weights: Option<PathBuf>,

    /// Override for the model cache directory.
    pub cache_dir: Option<PathBuf>,

    /// Run on the CPU even if an accelerator is available.
    pub force_cpu: bool,
}
