//! Pretrained weight downloading and caching.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result};

/// File name of the cached VGG19 weights.
pub const VGG19_FILENAME: &str = "vgg19.safetensors";

/// torchvision's ImageNet VGG19 weights, re-exported as safetensors.
pub const VGG19_URL: &str =
    "https://huggingface.co/timm/vgg19.tv_in1k/resolve/main/model.safetensors";

/// Approximate size in bytes, used when the server sends no content length.
const VGG19_APPROX_SIZE: u64 = 574_000_000;

/// Prefix of the convolutional stack inside the weight file.
const FEATURES_PREFIX: &str = "features.";

/// Manages the model cache directory and downloads.
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new model cache.
    ///
    /// Uses the platform-appropriate cache directory:
    /// - Windows: `%LOCALAPPDATA%\stylize\models`
    /// - Linux: `~/.cache/stylize/models`
    /// - macOS: `~/Library/Caches/stylize/models`
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn new() -> Result<Self> {
        let base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::with_dir(base.join("stylize").join("models"))
    }

    /// Create a cache rooted at an explicit directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_dir<P: Into<PathBuf>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.into();

        fs::create_dir_all(&cache_dir).map_err(|source| Error::CacheDir {
            path: cache_dir.clone(),
            source,
        })?;

        Ok(Self { cache_dir })
    }

    /// Cache directory in use.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the path to the VGG19 weights, downloading if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights cannot be downloaded.
    pub fn vgg19_path(&self) -> Result<PathBuf> {
        let path = self.cache_dir.join(VGG19_FILENAME);

        if !path.exists() {
            download_file(VGG19_URL, &path, VGG19_FILENAME, VGG19_APPROX_SIZE)?;
        }

        Ok(path)
    }
}

/// Read the convolutional weights from a safetensors file onto `device`.
///
/// Only tensors under `features.` are kept; the classifier head is dropped.
///
/// # Errors
///
/// Returns an error if the file is missing or not valid safetensors.
pub fn load_feature_weights(path: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let name = path.display().to_string();

    if !path.exists() {
        return Err(Error::ModelLoad {
            name,
            source: candle_core::Error::Msg("weight file does not exist".to_string()),
        });
    }

    let mut tensors = candle_core::safetensors::load(path, device)
        .map_err(|source| Error::ModelLoad { name, source })?;
    tensors.retain(|key, _| key.starts_with(FEATURES_PREFIX));

    tracing::debug!("Loaded {} feature tensors", tensors.len());
    Ok(tensors)
}

/// Download a file from a URL to a path with progress indication.
#[allow(clippy::cast_possible_truncation)]
fn download_file(url: &str, path: &Path, name: &str, approx_size: u64) -> Result<()> {
    tracing::info!("Downloading {name} from {url}");

    let client = reqwest::blocking::Client::new();
    let response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|source| Error::ModelDownload {
            name: name.to_string(),
            source,
        })?;

    let total_size = response.content_length().unwrap_or(approx_size);

    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    pb.set_message(format!("Downloading {name}"));

    // Write to a temporary file first, then rename for atomicity
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;

    let mut downloaded = 0u64;
    let mut reader = response;
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = std::io::Read::read(&mut reader, &mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        file.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;
        pb.set_position(downloaded);
    }
    file.flush()?;

    pb.finish_with_message(format!("Downloaded {name}"));

    fs::rename(&temp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn test_with_dir_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested").join("models");

        let cache = ModelCache::with_dir(&dir).unwrap();

        assert!(dir.is_dir());
        assert_eq!(cache.dir(), dir.as_path());
    }

    #[test]
    fn test_missing_weights_is_load_error() {
        let err = load_feature_weights(Path::new("/nonexistent/vgg19.safetensors"), &Device::Cpu)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Load);
    }

    #[test]
    fn test_load_keeps_only_feature_tensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");

        let mut tensors = HashMap::new();
        tensors.insert(
            "features.0.weight".to_string(),
            Tensor::zeros((2, 3, 3, 3), DType::F32, &Device::Cpu).unwrap(),
        );
        tensors.insert(
            "head.fc.weight".to_string(),
            Tensor::zeros((4, 2), DType::F32, &Device::Cpu).unwrap(),
        );
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let loaded = load_feature_weights(&path, &Device::Cpu).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("features.0.weight"));
    }
}
