//! # vision_batch
//!
//! Batch pipeline for image-classification training built on `image`,
//! `rayon` and the Burn tensor types.
//!
//! ## Features
//!
//! - **Per-sample transforms**: random resized crop or padded random crop,
//!   flips, RandAugment / TrivialAugmentWide / AutoAugment, random erasing,
//!   and a resize + center crop evaluation path
//! - **Samplers**: seeded shuffling, sequential order and equally sized
//!   distributed shards
//! - **Batch mixing**: MixUp and CutMix with soft targets whose rows always
//!   sum to 1
//! - **Datasets**: class-per-directory folders, CIFAR-10/100 and
//!   Fashion-MNIST, behind one registry
//!
//! ## Modules
//!
//! - `config`: run configuration (JSON + presets)
//! - `dataset`: dataset capability, loaders and the registry
//! - `transform`: training and evaluation transform pipelines
//! - `sampler`: epoch index orderings
//! - `mixing`: MixUp, CutMix and the per-batch selector
//! - `batch`: host batches, targets and tensor conversion
//! - `loader`: parallel batch iteration
//! - `pipeline`: wires everything into train/eval loaders
//! - `utils`: logging and the error type
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vision_batch::{build_pipeline, DataConfig};
//!
//! let mut config = DataConfig::imagenet_strong();
//! let pipeline = build_pipeline(&mut config)?;
//!
//! for batch in pipeline.train.iter(0) {
//!     let batch = batch?;
//!     // batch.images: [N, 3, 224, 224], batch.target: soft rows
//! }
//! ```

pub mod backend;
pub mod batch;
pub mod config;
pub mod dataset;
pub mod loader;
pub mod mixing;
pub mod pipeline;
pub mod sampler;
pub mod transform;
pub mod utils;

// Re-export commonly used items for convenience
pub use batch::{BatchTargets, ClassificationBatch, ImageBatch, Target};
pub use config::{DataConfig, ImageSize};
pub use dataset::{build_datasets, DatasetKind, ImageDataset, ImageFolder};
pub use loader::{DataLoader, LoadedBatch};
pub use mixing::{CutMix, MixPolicySelector, MixUp, MixingOperator, MixingPolicy};
pub use pipeline::{assemble, build_pipeline, Pipeline};
pub use sampler::{DistributedSampler, RandomSampler, Sampler, SamplerFactory, SequentialSampler};
pub use transform::{EvalTransform, ImageTensor, SampleTransform, TrainTransform, TransformSpec};
pub use utils::error::{PipelineError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
