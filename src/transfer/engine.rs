//! The style transfer optimization loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::Var;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};

use crate::error::Result;
use crate::image;
use crate::model::{FeatureExtractor, ModelConfig};

use super::config::{snapshot_path, TransferConfig, TransferRequest};
use super::loss::{LossWeights, Targets};
use super::progress::{
    error_status, step_progress, step_status, ProgressSink, PROGRESS_DONE, PROGRESS_FAILED,
    STATUS_COMPLETE, STATUS_STARTED,
};

/// Runs style transfers against a shared, frozen feature extractor.
///
/// Cheap to clone; every clone shares the same weights.
#[derive(Debug, Clone)]
pub struct StyleTransfer {
    extractor: Arc<FeatureExtractor>,
}

impl StyleTransfer {
    /// Load the pretrained network described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device or the weights are unavailable.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let extractor = FeatureExtractor::load(config)?;
        tracing::info!("Style transfer engine initialized");
        Ok(Self::with_extractor(Arc::new(extractor)))
    }

    /// Wrap an already loaded extractor.
    #[must_use]
    pub const fn with_extractor(extractor: Arc<FeatureExtractor>) -> Self {
        Self { extractor }
    }

    /// The shared feature extractor.
    #[must_use]
    pub const fn extractor(&self) -> &Arc<FeatureExtractor> {
        &self.extractor
    }

    /// Run a transfer, reporting failure only through `sink`.
    ///
    /// Any error is logged and turned into a final [`PROGRESS_FAILED`]
    /// report; the return value is then `None`. On success the output path
    /// is returned.
    pub fn transfer<S>(&self, request: &TransferRequest, sink: &mut S) -> Option<PathBuf>
    where
        S: ProgressSink + ?Sized,
    {
        match self.try_transfer(request, sink) {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::error!("Style transfer into {} failed: {err}", request.output.display());
                sink.report(PROGRESS_FAILED, &error_status(&err));
                None
            }
        }
    }

    /// Run a transfer and propagate errors to the caller.
    ///
    /// Reports 0 once the inputs are loaded, once per step, and 100 after the
    /// final image is written. Intermediate images are written every
    /// `snapshot_interval` steps and on the last step.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, an image cannot be
    /// decoded or written, or a tensor operation fails.
    pub fn try_transfer<S>(&self, request: &TransferRequest, sink: &mut S) -> Result<PathBuf>
    where
        S: ProgressSink + ?Sized,
    {
        let config = &request.config;
        config.validate()?;

        let device = self.extractor.device();
        tracing::info!(
            "Transferring style of {} onto {} ({} steps)",
            request.style.display(),
            request.content.display(),
            config.total_steps
        );

        let (content_host, content_dims) = image::load_image(&request.content, config.image_size)?;
        let (style_host, _) = image::load_image(&request.style, config.image_size)?;

        let content = image::to_device(&content_host, device)?;
        let style = image::to_device(&style_host, device)?;

        // The content and style references never change, so their features
        // are extracted once.
        let targets = Targets::new(
            &self.extractor.extract(&content)?,
            &self.extractor.extract(&style)?,
        )?;

        let generated = Var::from_tensor(&content)?;
        let mut optimizer = AdamW::new(
            vec![generated.clone()],
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..ParamsAdamW::default()
            },
        )?;

        let weights = LossWeights {
            alpha: config.alpha,
            beta: config.beta,
        };
        let restore = config.restore_size.then_some(content_dims);

        sink.report(0, STATUS_STARTED);

        for step in 0..config.total_steps {
            let features = self.extractor.extract(generated.as_tensor())?;
            let losses = targets.loss(&features, weights)?;
            optimizer.backward_step(&losses.total)?;

            let (content_loss, style_loss, total_loss) = losses.values()?;
            tracing::debug!(
                step,
                content_loss,
                style_loss,
                total_loss,
                "optimization step"
            );

            sink.report(
                step_progress(step, config.total_steps),
                &step_status(step, config.total_steps, total_loss),
            );

            if step % config.snapshot_interval == 0 || step + 1 == config.total_steps {
                let path = snapshot_path(&request.output, step);
                tracing::info!(
                    "Step {}/{}, Loss: {total_loss:.2}, saving {}",
                    step + 1,
                    config.total_steps,
                    path.display()
                );
                save(&generated, &path, restore, config)?;
            }
        }

        save(&generated, &request.output, restore, config)?;
        sink.report(PROGRESS_DONE, STATUS_COMPLETE);

        tracing::info!("Saved result to {}", request.output.display());
        Ok(request.output.clone())
    }
}

fn save(
    generated: &Var,
    path: &Path,
    restore: Option<(u32, u32)>,
    config: &TransferConfig,
) -> Result<()> {
    let host = image::from_device(generated.as_tensor())?;
    image::save_image(&host, path, restore, config.output_quality)
}
