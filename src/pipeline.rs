//! Pipeline assembly
//!
//! Wires the dataset pair, both transform pipelines, the samplers and the
//! mixing selector into a training and an evaluation [`DataLoader`].

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::DataConfig;
use crate::dataset::{build_datasets, ImageDataset};
use crate::loader::DataLoader;
use crate::mixing::MixPolicySelector;
use crate::sampler::SamplerFactory;
use crate::transform::{EvalTransform, TrainTransform, TransformSpec};
use crate::utils::error::Result;

/// Both loaders of a run
#[derive(Debug)]
pub struct Pipeline {
    pub train: DataLoader,
    pub eval: DataLoader,
    /// Classes discovered from the training dataset
    pub num_classes: usize,
    /// Training batches per epoch
    pub iter_per_epoch: usize,
}

/// Assemble loaders over already constructed datasets
///
/// Writes `num_classes` and `iter_per_epoch` back into `config`.
pub fn assemble(
    train_dataset: Arc<dyn ImageDataset>,
    eval_dataset: Arc<dyn ImageDataset>,
    config: &mut DataConfig,
) -> Result<Pipeline> {
    config.validate()?;
    let spec = TransformSpec::from_config(config)?;

    let num_classes = train_dataset.num_classes();
    if num_classes != config.num_classes {
        info!(
            "num_classes set to {} from the dataset (configured {})",
            num_classes, config.num_classes
        );
    }
    config.num_classes = num_classes;
    if eval_dataset.num_classes() != num_classes {
        warn!(
            "Eval dataset has {} classes, train has {}",
            eval_dataset.num_classes(),
            num_classes
        );
    }

    let train_transform = TrainTransform::build(&spec)?;
    info!("Train transform: {}", train_transform.stages().join(" -> "));
    let eval_transform = EvalTransform::build(&spec)?;
    info!(
        "Eval transform: resize {:?} -> center crop {}",
        eval_transform.resize(),
        spec.test_size
    );

    let samplers = SamplerFactory::from_config(config);
    let train_sampler = samplers.train(train_dataset.len())?;
    let eval_sampler = samplers.eval(eval_dataset.len())?;

    let selector = MixPolicySelector::from_config(config)?;

    if config.pin_memory {
        info!("pin_memory requested; host batches are not pinned");
    }

    let train = DataLoader::new(
        "train",
        train_dataset,
        Arc::new(train_transform),
        train_sampler,
        config.batch_size,
        config.num_workers,
        config.seed,
    )?
    .with_mixing(Arc::new(selector));

    let eval = DataLoader::new(
        "eval",
        eval_dataset,
        Arc::new(eval_transform),
        eval_sampler,
        config.batch_size,
        config.num_workers,
        config.seed,
    )?;

    let iter_per_epoch = train.len();
    config.iter_per_epoch = iter_per_epoch;

    info!(
        "Pipeline ready: {} train batches, {} eval batches of {} ({:?} sampling, {} workers)",
        iter_per_epoch,
        eval.len(),
        config.batch_size,
        samplers.mode(),
        config.num_workers
    );

    Ok(Pipeline {
        train,
        eval,
        num_classes,
        iter_per_epoch,
    })
}

/// Resolve the configured dataset and assemble its loaders
///
/// Transform and sampling settings are checked before any dataset is opened.
pub fn build_pipeline(config: &mut DataConfig) -> Result<Pipeline> {
    config.validate()?;
    TransformSpec::from_config(config)?;
    SamplerFactory::from_config(config).train(0)?;

    let datasets = build_datasets(config)?;
    assemble(datasets.train, datasets.eval, config)
}
