//! # stylize
//!
//! Neural style transfer: an image is optimized so that its VGG19 features
//! match a content image while its feature correlations (Gram matrices)
//! match a style image.
//!
//! ## Example
//!
//! ```no_run
//! use stylize::{ModelConfig, StyleTransfer, TransferConfig, TransferRequest};
//!
//! # fn main() -> stylize::Result<()> {
//! let engine = StyleTransfer::new(&ModelConfig::default())?;
//!
//! let request = TransferRequest::new("content.jpg", "style.jpg", "generated.png")
//!     .with_config(TransferConfig {
//!         total_steps: 1000,
//!         ..TransferConfig::default()
//!     });
//!
//! engine.try_transfer(&request, &mut |progress: i32, status: &str| {
//!     println!("{progress:>3}% {status}");
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod image;
pub mod jobs;
pub mod model;
pub mod transfer;

pub use error::{Error, ErrorKind, Result};
pub use model::{FeatureExtractor, ModelConfig};
pub use transfer::{ProgressSink, StyleTransfer, TransferConfig, TransferRequest};
