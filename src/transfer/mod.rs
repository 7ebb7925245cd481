//! Style transfer by direct optimization of the generated image.

mod config;
mod engine;
pub mod loss;
mod progress;

pub use config::{snapshot_path, TransferConfig, TransferRequest};
pub use engine::StyleTransfer;
pub use loss::{compute_loss, gram_matrix, LossWeights, Losses, Targets};
pub use progress::{
    step_progress, ProgressSink, PROGRESS_DONE, PROGRESS_FAILED, STATUS_COMPLETE, STATUS_STARTED,
};
