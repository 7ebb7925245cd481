//! Custom error types for stylize.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the stylize library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to decode an image file.
    #[error("failed to load image from {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to save an image file.
    #[error("failed to save image to {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to download the pretrained weights.
    #[error("failed to download model {name}: {source}")]
    ModelDownload {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    /// Failed to read or bind the pretrained weights.
    #[error("failed to load model {name}: {source}")]
    ModelLoad {
        name: String,
        #[source]
        source: candle_core::Error,
    },

    /// Failed to create cache directory.
    #[error("failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The compute device could not be initialized.
    #[error("failed to initialize compute device: {source}")]
    Device {
        #[source]
        source: candle_core::Error,
    },

    /// A tensor operation failed, typically out of memory or a device fault.
    #[error("tensor computation failed: {0}")]
    Compute(#[from] candle_core::Error),

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// The job queue is at capacity.
    #[error("job queue is full ({capacity} pending jobs)")]
    QueueFull { capacity: usize },

    /// The job pool has been shut down.
    #[error("job pool is shut down")]
    PoolClosed,
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unreadable, corrupt or unsupported image input.
    Decode,
    /// Pretrained weights or model unavailable.
    Load,
    /// Out of memory or device failure.
    Resource,
    /// Caller supplied an invalid argument.
    Argument,
    /// Filesystem failure outside of image decoding.
    Io,
    /// The job was never accepted.
    Rejected,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ImageLoad { .. } => ErrorKind::Decode,
            Self::ModelDownload { .. } | Self::ModelLoad { .. } | Self::CacheDir { .. } => {
                ErrorKind::Load
            }
            Self::Device { .. } | Self::Compute(_) | Self::ShapeMismatch { .. } => {
                ErrorKind::Resource
            }
            Self::InvalidParameter { .. } => ErrorKind::Argument,
            Self::ImageSave { .. } | Self::Io(_) => ErrorKind::Io,
            Self::QueueFull { .. } | Self::PoolClosed => ErrorKind::Rejected,
        }
    }

    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for stylize operations.
pub type Result<T> = std::result::Result<T, Error>;
