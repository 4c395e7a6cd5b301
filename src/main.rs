//! vision_batch CLI
//!
//! Builds the batch pipeline from a JSON config, writes default configs and
//! fetches registry datasets.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use vision_batch::backend::{backend_name, default_device, DefaultBackend};
use vision_batch::batch::BatchTargets;
use vision_batch::utils::logging::{init_logging, LogConfig};
use vision_batch::{build_pipeline, DataConfig, DatasetKind};

/// Image-classification batch pipeline
///
/// Per-sample transforms, seeded or sharded sampling and MixUp/CutMix
/// batch mixing over folder, CIFAR and Fashion-MNIST datasets.
#[derive(Parser, Debug)]
#[command(name = "vision_batch")]
#[command(version)]
#[command(about = "Image-classification batch pipeline", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the pipeline and report on a few training batches
    Inspect {
        /// JSON configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset type (ImageFolder, CIFAR10, CIFAR100, FashionMNIST)
        #[arg(long)]
        dataset_type: Option<String>,

        /// Dataset root directory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Samples per batch
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Loader worker threads
        #[arg(long)]
        num_workers: Option<usize>,

        /// MixUp alpha (0 disables)
        #[arg(long)]
        mixup: Option<f64>,

        /// CutMix alpha (0 disables)
        #[arg(long)]
        cutmix: Option<f64>,

        /// Download archive datasets that are missing
        #[arg(long, default_value = "false")]
        download: bool,

        /// Epoch to iterate
        #[arg(long, default_value = "0")]
        epoch: u64,

        /// Number of training batches to report on
        #[arg(short, long, default_value = "3")]
        num_batches: usize,
    },

    /// Write a configuration file
    Config {
        /// Output path
        #[arg(short, long, default_value = "vision_batch.json")]
        output: PathBuf,

        /// Preset: default, imagenet_strong, cifar10
        #[arg(short, long, default_value = "default")]
        preset: String,
    },

    /// Download and unpack a registry dataset
    Download {
        /// Dataset type (CIFAR10, CIFAR100, FashionMNIST)
        #[arg(long, default_value = "CIFAR10")]
        dataset_type: String,

        /// Output directory for the dataset
        #[arg(short, long, default_value = "data/cifar")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Inspect {
            config,
            dataset_type,
            data_dir,
            batch_size,
            num_workers,
            mixup,
            cutmix,
            download,
            epoch,
            num_batches,
        } => {
            let mut data_config = match config {
                Some(path) => DataConfig::load(&path)
                    .with_context(|| format!("failed to load config {:?}", path))?,
                None => DataConfig::default(),
            };

            if let Some(v) = dataset_type {
                data_config.dataset_type = v;
            }
            if let Some(v) = data_dir {
                data_config.data_dir = v;
            }
            if let Some(v) = batch_size {
                data_config.batch_size = v;
            }
            if let Some(v) = num_workers {
                data_config.num_workers = v;
            }
            if let Some(v) = mixup {
                data_config.mixup = v;
            }
            if let Some(v) = cutmix {
                data_config.cutmix = v;
            }
            data_config.download |= download;

            cmd_inspect(&mut data_config, epoch, num_batches)?;
        }

        Commands::Config { output, preset } => {
            cmd_config(&output, &preset)?;
        }

        Commands::Download {
            dataset_type,
            data_dir,
        } => {
            cmd_download(&dataset_type, &data_dir)?;
        }
    }

    Ok(())
}

fn cmd_inspect(config: &mut DataConfig, epoch: u64, num_batches: usize) -> Result<()> {
    info!(
        "Building {} pipeline from {:?}",
        config.dataset_type, config.data_dir
    );

    let pipeline = build_pipeline(config).context("failed to build pipeline")?;

    println!();
    println!("{}", "Pipeline".cyan().bold());
    println!("  Dataset:        {}", config.dataset_type);
    println!("  Classes:        {}", pipeline.num_classes);
    println!("  Train samples:  {}", pipeline.train.dataset().len());
    println!("  Eval samples:   {}", pipeline.eval.dataset().len());
    println!("  Batch size:     {}", config.batch_size);
    println!("  Iter/epoch:     {}", pipeline.iter_per_epoch);
    println!("  Eval batches:   {}", pipeline.eval.len());
    println!("  Mixing:         {}", pipeline.train.is_mixing());
    println!("  Backend:        {}", backend_name());
    println!();

    let device = default_device();
    for batch in pipeline.train.iter(epoch).take(num_batches) {
        let batch = batch?;
        let sums = batch.target.row_sums();
        let min = sums.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = sums.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        let tensors = batch.to_tensors::<DefaultBackend>(&device);
        let target_kind = match &tensors.targets {
            BatchTargets::Hard(t) => format!("hard {:?}", t.dims()),
            BatchTargets::Soft(t) => format!("soft {:?}", t.dims()),
        };

        println!(
            "  batch {:>4}  images {:?}  targets {}  row sums [{:.4}, {:.4}]  {}",
            batch.index,
            tensors.images.dims(),
            target_kind,
            min,
            max,
            batch
                .mixed_by
                .map(|name| name.green().to_string())
                .unwrap_or_else(|| "unmixed".dimmed().to_string())
        );
    }

    Ok(())
}

fn cmd_config(output: &Path, preset: &str) -> Result<()> {
    let config = match preset {
        "default" => DataConfig::default(),
        "imagenet_strong" => DataConfig::imagenet_strong(),
        "cifar10" => DataConfig::cifar10(),
        other => anyhow::bail!(
            "unknown preset '{}' (expected one of: default, imagenet_strong, cifar10)",
            other
        ),
    };

    config.validate()?;
    config
        .save(output)
        .with_context(|| format!("failed to write {:?}", output))?;

    println!("{} Wrote {} config to {:?}", "Done:".green(), preset, output);
    Ok(())
}

fn cmd_download(dataset_type: &str, data_dir: &Path) -> Result<()> {
    let kind = DatasetKind::parse(dataset_type)?;
    info!("Downloading {} to {:?}", kind.name(), data_dir);

    kind.download(data_dir)
        .with_context(|| format!("failed to download {}", kind.name()))?;

    println!(
        "{} {} is ready in {:?}",
        "Done:".green(),
        kind.name(),
        data_dir
    );
    Ok(())
}
