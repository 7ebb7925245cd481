//! Per-job parameters.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::image::DEFAULT_IMAGE_SIZE;

/// Optimization parameters for a single style transfer.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Side of the square working resolution.
    pub image_size: u32,

    /// Number of optimizer steps. Zero writes the content image back out.
    pub total_steps: u32,

    /// Content loss weight.
    pub alpha: f64,

    /// Style loss weight.
    pub beta: f64,

    /// Adam learning rate.
    pub learning_rate: f64,

    /// Save an intermediate image every this many steps (and on the last step).
    pub snapshot_interval: u32,

    /// Resize saved images back to the content image's original dimensions.
    pub restore_size: bool,

    /// Output JPEG quality (1-100).
    pub output_quality: u8,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE,
            total_steps: 3000,
            alpha: 1.0,
            beta: 0.01,
            learning_rate: 0.001,
            snapshot_interval: 500,
            restore_size: true,
            output_quality: 95,
        }
    }
}

impl TransferConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 {
            return Err(Error::invalid("image_size", "must be greater than 0"));
        }

        for (name, weight) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::invalid(name, "must be a non-negative number"));
            }
        }

        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::invalid("learning_rate", "must be a positive number"));
        }

        if self.snapshot_interval == 0 {
            return Err(Error::invalid("snapshot_interval", "must be greater than 0"));
        }

        if !(1..=100).contains(&self.output_quality) {
            return Err(Error::invalid("output_quality", "must be between 1 and 100"));
        }

        Ok(())
    }
}

/// One content/style pair and where to write the result.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Image whose layout is kept.
    pub content: PathBuf,
    /// Image whose texture is imitated.
    pub style: PathBuf,
    /// Final image path. Snapshots are written next to it.
    pub output: PathBuf,
    /// Run parameters.
    pub config: TransferConfig,
}

impl TransferRequest {
    /// Create a request with the default configuration.
    pub fn new<C, S, O>(content: C, style: S, output: O) -> Self
    where
        C: Into<PathBuf>,
        S: Into<PathBuf>,
        O: Into<PathBuf>,
    {
        Self {
            content: content.into(),
            style: style.into(),
            output: output.into(),
            config: TransferConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: TransferConfig) -> Self {
        self.config = config;
        self
    }
}

/// Intermediate image path: `{dir}/{stem}_{step}.png`.
#[must_use]
pub fn snapshot_path(output: &Path, step: u32) -> PathBuf {
    let stem = output
        .file_stem()
        .map_or_else(|| "generated".into(), |s| s.to_string_lossy());
    output.with_file_name(format!("{stem}_{step}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TransferConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.image_size, 356);
        assert!((config.beta - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_steps_is_valid() {
        let config = TransferConfig {
            total_steps: 0,
            ..TransferConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_negative_weights() {
        let config = TransferConfig {
            beta: -0.5,
            ..TransferConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Argument);
        assert!(err.to_string().contains("beta"));

        let config = TransferConfig {
            alpha: f64::NAN,
            ..TransferConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_learning_rate_and_size() {
        let config = TransferConfig {
            learning_rate: 0.0,
            ..TransferConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TransferConfig {
            image_size: 0,
            ..TransferConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_snapshot_path() {
        assert_eq!(
            snapshot_path(Path::new("static/outputs/job.v2.png"), 500),
            PathBuf::from("static/outputs/job.v2_500.png")
        );
        assert_eq!(
            snapshot_path(Path::new("out.jpg"), 0),
            PathBuf::from("out_0.png")
        );
    }
}
