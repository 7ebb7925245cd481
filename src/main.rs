//! `stylize` CLI - Neural style transfer between two images.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stylize::transfer::PROGRESS_FAILED;
use stylize::{ModelConfig, StyleTransfer, TransferConfig, TransferRequest};

/// Repaint a content image in the style of another image.
#[derive(Parser, Debug)]
#[command(name = "stylize")]
#[command(version, about, long_about = None)]
struct Args {
    /// Content image path.
    #[arg(value_name = "CONTENT")]
    content: PathBuf,

    /// Style image path.
    #[arg(value_name = "STYLE")]
    style: PathBuf,

    /// Output image path.
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Number of optimization steps.
    #[arg(long, default_value = "1000", value_name = "INT")]
    steps: u32,

    /// Content loss weight.
    #[arg(short, long, default_value = "1.0", value_name = "FLOAT")]
    alpha: f64,

    /// Style loss weight.
    #[arg(short, long, default_value = "0.01", value_name = "FLOAT")]
    beta: f64,

    /// Adam learning rate.
    #[arg(long, default_value = "0.001", value_name = "FLOAT")]
    learning_rate: f64,

    /// Square working resolution.
    #[arg(long, default_value = "356", value_name = "PIXELS")]
    image_size: u32,

    /// Save an intermediate image every this many steps.
    #[arg(long, default_value = "500", value_name = "INT")]
    snapshot_interval: u32,

    /// Keep the working resolution instead of restoring the content size.
    #[arg(long)]
    no_restore_size: bool,

    /// Output JPEG quality (1-100).
    #[arg(short, long, default_value = "95", value_name = "INT")]
    quality: u8,

    /// Local VGG19 safetensors file instead of the cached download.
    #[arg(long, value_name = "PATH")]
    weights: Option<PathBuf>,

    /// Run on the CPU even if an accelerator is available.
    #[arg(long)]
    cpu: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("stylize={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    let model = ModelConfig {
        weights: args.weights.clone(),
        cache_dir: None,
        force_cpu: args.cpu,
    };

    let config = TransferConfig {
        image_size: args.image_size,
        total_steps: args.steps,
        alpha: args.alpha,
        beta: args.beta,
        learning_rate: args.learning_rate,
        snapshot_interval: args.snapshot_interval,
        restore_size: !args.no_restore_size,
        output_quality: args.quality,
    };
    config.validate().context("Invalid parameters")?;

    let engine = StyleTransfer::new(&model).context("Failed to load the feature extractor")?;
    let request = TransferRequest::new(&args.content, &args.style, &args.output).with_config(config);

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let mut failure = None;
    let result = engine.transfer(&request, &mut |progress: i32, status: &str| {
        if progress == PROGRESS_FAILED {
            failure = Some(status.to_string());
        } else {
            pb.set_position(u64::try_from(progress).unwrap_or_default());
            pb.set_message(status.to_string());
        }
    });

    match result {
        Some(path) => {
            pb.finish_with_message("Style transfer complete!");
            println!(
                "Successfully stylized {} -> {}",
                args.content.display(),
                path.display()
            );
            Ok(())
        }
        None => {
            pb.abandon();
            anyhow::bail!(failure.unwrap_or_else(|| "Style transfer failed".to_string()))
        }
    }
}
