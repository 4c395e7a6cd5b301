//! Dataset registry
//!
//! Maps the configured `dataset_type` to a [`DatasetKind`] and builds the
//! train/eval pair with the kind's construction strategy:
//!
//! - `Directory`: train and eval come from `data_dir/train_split` and
//!   `data_dir/val_split`
//! - `DownloadAndSplit`: one archive under `data_dir` provides both splits,
//!   fetched first when `download` is set

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::DataConfig;
use crate::dataset::cifar::{load_cifar, CifarVariant};
use crate::dataset::fashion_mnist;
use crate::dataset::{ImageDataset, ImageFolder};
use crate::utils::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    ImageFolder,
    Cifar10,
    Cifar100,
    FashionMnist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionStrategy {
    Directory,
    DownloadAndSplit,
}

type OpenSplit = fn(&Path, bool) -> Result<Arc<dyn ImageDataset>>;
type Download = fn(&Path) -> Result<()>;
type IsPresent = fn(&Path) -> bool;

struct RegistryEntry {
    kind: DatasetKind,
    name: &'static str,
    strategy: ConstructionStrategy,
    /// Open one split: a split directory for `Directory`, the root and a train flag otherwise
    open: OpenSplit,
    download: Option<(IsPresent, Download)>,
}

fn open_folder(dir: &Path, _train: bool) -> Result<Arc<dyn ImageDataset>> {
    Ok(Arc::new(ImageFolder::new(dir)?))
}

fn open_cifar10(root: &Path, train: bool) -> Result<Arc<dyn ImageDataset>> {
    Ok(Arc::new(load_cifar(root, CifarVariant::Cifar10, train)?))
}

fn open_cifar100(root: &Path, train: bool) -> Result<Arc<dyn ImageDataset>> {
    Ok(Arc::new(load_cifar(root, CifarVariant::Cifar100, train)?))
}

fn open_fashion_mnist(root: &Path, train: bool) -> Result<Arc<dyn ImageDataset>> {
    Ok(Arc::new(fashion_mnist::load_fashion_mnist(root, train)?))
}

fn cifar10_present(root: &Path) -> bool {
    CifarVariant::Cifar10.is_present(root)
}

fn download_cifar10(root: &Path) -> Result<()> {
    CifarVariant::Cifar10.download(root)
}

fn cifar100_present(root: &Path) -> bool {
    CifarVariant::Cifar100.is_present(root)
}

fn download_cifar100(root: &Path) -> Result<()> {
    CifarVariant::Cifar100.download(root)
}

const REGISTRY: &[RegistryEntry] = &[
    RegistryEntry {
        kind: DatasetKind::ImageFolder,
        name: "ImageFolder",
        strategy: ConstructionStrategy::Directory,
        open: open_folder,
        download: None,
    },
    RegistryEntry {
        kind: DatasetKind::Cifar10,
        name: "CIFAR10",
        strategy: ConstructionStrategy::DownloadAndSplit,
        open: open_cifar10,
        download: Some((cifar10_present, download_cifar10)),
    },
    RegistryEntry {
        kind: DatasetKind::Cifar100,
        name: "CIFAR100",
        strategy: ConstructionStrategy::DownloadAndSplit,
        open: open_cifar100,
        download: Some((cifar100_present, download_cifar100)),
    },
    RegistryEntry {
        kind: DatasetKind::FashionMnist,
        name: "FashionMNIST",
        strategy: ConstructionStrategy::DownloadAndSplit,
        open: open_fashion_mnist,
        download: Some((fashion_mnist::is_present, fashion_mnist::download)),
    },
];

fn entry(kind: DatasetKind) -> &'static RegistryEntry {
    REGISTRY
        .iter()
        .find(|e| e.kind == kind)
        .unwrap_or(&REGISTRY[0])
}

impl DatasetKind {
    /// Every registered kind, in registry order
    pub fn all() -> Vec<DatasetKind> {
        REGISTRY.iter().map(|e| e.kind).collect()
    }

    /// Look up a kind by its registry name
    pub fn parse(name: &str) -> Result<Self> {
        REGISTRY
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.kind)
            .ok_or_else(|| PipelineError::UnsupportedDataset {
                name: name.to_string(),
                accepted: REGISTRY
                    .iter()
                    .map(|e| e.name)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    pub fn name(&self) -> &'static str {
        entry(*self).name
    }

    pub fn strategy(&self) -> ConstructionStrategy {
        entry(*self).strategy
    }

    /// Fetch the dataset into `root` if it is not there yet
    ///
    /// Directory datasets cannot be downloaded.
    pub fn download(&self, root: &Path) -> Result<()> {
        match entry(*self).download {
            Some((is_present, download)) => {
                if is_present(root) {
                    info!("{} already present in {:?}", self.name(), root);
                    Ok(())
                } else {
                    download(root)
                }
            }
            None => Err(PipelineError::Config(format!(
                "{} datasets are read from a directory and cannot be downloaded",
                self.name()
            ))),
        }
    }
}

/// Training and evaluation datasets of one run
#[derive(Clone)]
pub struct DatasetPair {
    pub kind: DatasetKind,
    pub train: Arc<dyn ImageDataset>,
    pub eval: Arc<dyn ImageDataset>,
}

impl std::fmt::Debug for DatasetPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetPair")
            .field("kind", &self.kind)
            .field("train_len", &self.train.len())
            .field("eval_len", &self.eval.len())
            .field("num_classes", &self.train.num_classes())
            .finish()
    }
}

/// Build the train/eval datasets named by `config.dataset_type`
pub fn build_datasets(config: &DataConfig) -> Result<DatasetPair> {
    let kind = DatasetKind::parse(&config.dataset_type)?;
    let entry = entry(kind);
    let root = config.data_dir.as_path();

    let (train, eval) = match entry.strategy {
        ConstructionStrategy::Directory => (
            (entry.open)(&root.join(&config.train_split), true)?,
            (entry.open)(&root.join(&config.val_split), false)?,
        ),
        ConstructionStrategy::DownloadAndSplit => {
            if config.download {
                kind.download(root)?;
            }
            ((entry.open)(root, true)?, (entry.open)(root, false)?)
        }
    };

    info!(
        "Dataset {}: {} train / {} eval samples, {} classes",
        kind.name(),
        train.len(),
        eval.len(),
        train.num_classes()
    );

    Ok(DatasetPair { kind, train, eval })
}
