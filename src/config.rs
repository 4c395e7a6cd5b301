//! Run Configuration Module
//!
//! Defines the configuration consumed by the batch pipeline: dataset
//! selection, per-sample transforms, sampling/batching and batch mixing.
//!
//! The pipeline writes two derived values back into the configuration after
//! it has been assembled: `num_classes` (discovered from the dataset) and
//! `iter_per_epoch` (number of training batches).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{PipelineError, Result, ResultExt};

/// An image size: a single number or a `[height, width]` pair
///
/// In resize stages a `Square` size resizes the shorter side and keeps the
/// aspect ratio, a `Rect` size resizes to exactly `(height, width)`. Crop
/// stages always produce `(n, n)` or `(height, width)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ImageSize {
    Square(u32),
    Rect(u32, u32),
}

impl ImageSize {
    /// `(height, width)` of a crop with this size
    pub fn dims(&self) -> (u32, u32) {
        match *self {
            ImageSize::Square(s) => (s, s),
            ImageSize::Rect(h, w) => (h, w),
        }
    }

    fn is_empty(&self) -> bool {
        let (h, w) = self.dims();
        h == 0 || w == 0
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSize::Square(s) => write!(f, "{}", s),
            ImageSize::Rect(h, w) => write!(f, "{}x{}", h, w),
        }
    }
}

/// Configuration for the whole data pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    // ---- dataset selection ----
    /// Registry name of the dataset kind (ImageFolder, CIFAR10, CIFAR100, FashionMNIST)
    pub dataset_type: String,

    /// Root directory of the dataset
    pub data_dir: PathBuf,

    /// Sub-directory holding the training split (image folders only)
    pub train_split: String,

    /// Sub-directory holding the validation split (image folders only)
    pub val_split: String,

    /// Fetch archive datasets that are missing from `data_dir`
    pub download: bool,

    // ---- training transform ----
    /// Output size of the training crop
    pub train_size: ImageSize,

    /// `RandomResizedCrop` or `ResizeRandomCrop`
    pub train_resize_mode: String,

    /// Zero padding applied before the random crop of `ResizeRandomCrop`
    pub random_crop_pad: u32,

    /// Area fraction range of `RandomResizedCrop`
    pub random_crop_scale: (f64, f64),

    /// Aspect ratio range of `RandomResizedCrop`
    pub random_crop_ratio: (f64, f64),

    /// Horizontal flip probability (0 disables the stage)
    pub hflip: f64,

    /// Auto augment policy name: `ra*`, `ta_wide*`, `aa*`, or none
    pub auto_aug: Option<String>,

    /// Random erasing probability (0 disables the stage)
    pub remode: f64,

    /// Interpolation used by every resize (nearest, bilinear, bicubic, lanczos)
    pub interpolation: String,

    /// Per-channel normalization mean
    pub mean: [f32; 3],

    /// Per-channel normalization standard deviation
    pub std: [f32; 3],

    // ---- evaluation transform ----
    /// Output size of the evaluation center crop
    pub test_size: ImageSize,

    /// `resize_shorter` scales only the shorter side, anything else resizes both
    pub test_resize_mode: String,

    /// Crop ratio: the image is resized to `floor(test_size / center_crop_ptr)` before cropping
    pub center_crop_ptr: f64,

    // ---- sampling / batching ----
    /// Shard the dataset across `world_size` processes
    pub distributed: bool,

    /// Number of shards in distributed mode
    pub world_size: usize,

    /// Shard index of this process in distributed mode
    pub rank: usize,

    /// Samples per batch
    pub batch_size: usize,

    /// Worker threads fetching and transforming samples (0 = consuming thread)
    pub num_workers: usize,

    /// Accepted for compatibility with GPU loaders; host batches are never pinned
    pub pin_memory: bool,

    /// Base seed for shuffling, per-sample transforms and mixing
    pub seed: u64,

    // ---- mixing ----
    /// MixUp Beta concentration (0 disables MixUp)
    pub mixup: f64,

    /// CutMix Beta concentration (0 disables CutMix)
    pub cutmix: f64,

    /// Probability that a selected mixing operator leaves the batch untouched
    #[serde(alias = "mix_prob_skip")]
    pub mix_skip_prob: f64,

    /// Number of classes; overwritten with the value discovered from the dataset
    pub num_classes: usize,

    /// Training batches per epoch; written by the pipeline
    pub iter_per_epoch: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_type: "ImageFolder".to_string(),
            data_dir: PathBuf::from("data/imagenet"),
            train_split: "train".to_string(),
            val_split: "val".to_string(),
            download: false,
            train_size: ImageSize::Square(224),
            train_resize_mode: "RandomResizedCrop".to_string(),
            random_crop_pad: 4,
            random_crop_scale: (0.08, 1.0),
            random_crop_ratio: (3.0 / 4.0, 4.0 / 3.0),
            hflip: 0.5,
            auto_aug: None,
            remode: 0.0,
            interpolation: "bilinear".to_string(),
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            test_size: ImageSize::Square(224),
            test_resize_mode: "resize_shorter".to_string(),
            center_crop_ptr: 0.875,
            distributed: false,
            world_size: 1,
            rank: 0,
            batch_size: 64,
            num_workers: 4,
            pin_memory: false,
            seed: 42,
            mixup: 0.0,
            cutmix: 0.0,
            mix_skip_prob: 0.5,
            num_classes: 1000,
            iter_per_epoch: 0,
        }
    }
}

impl DataConfig {
    /// ImageNet-style recipe with RandAugment, random erasing, MixUp and CutMix
    pub fn imagenet_strong() -> Self {
        Self {
            auto_aug: Some("ra".to_string()),
            remode: 0.25,
            mixup: 0.2,
            cutmix: 1.0,
            ..Default::default()
        }
    }

    /// Small-image recipe for CIFAR-10
    pub fn cifar10() -> Self {
        Self {
            dataset_type: "CIFAR10".to_string(),
            data_dir: PathBuf::from("data/cifar"),
            train_size: ImageSize::Square(32),
            train_resize_mode: "ResizeRandomCrop".to_string(),
            test_size: ImageSize::Square(32),
            test_resize_mode: "fixed".to_string(),
            center_crop_ptr: 1.0,
            mean: [0.4914, 0.4822, 0.4465],
            std: [0.2470, 0.2435, 0.2616],
            batch_size: 128,
            num_classes: 10,
            ..Default::default()
        }
    }

    /// Validate value ranges
    ///
    /// Mode and policy names are checked when the transform spec and the
    /// dataset registry resolve them, so that their errors carry the
    /// accepted set.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.train_size.is_empty() || self.test_size.is_empty() {
            return Err(PipelineError::Config(format!(
                "train_size ({}) and test_size ({}) must be non-zero",
                self.train_size, self.test_size
            )));
        }

        for (name, p) in [
            ("hflip", self.hflip),
            ("remode", self.remode),
            ("mix_skip_prob", self.mix_skip_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(PipelineError::Config(format!(
                    "{} must be in range [0.0, 1.0], got {}",
                    name, p
                )));
            }
        }

        if !(self.center_crop_ptr > 0.0 && self.center_crop_ptr <= 1.0) {
            return Err(PipelineError::Config(format!(
                "center_crop_ptr must be in range (0.0, 1.0], got {}",
                self.center_crop_ptr
            )));
        }

        let (s0, s1) = self.random_crop_scale;
        if !(s0 > 0.0 && s0 <= s1 && s1 <= 1.0) {
            return Err(PipelineError::Config(format!(
                "random_crop_scale must satisfy 0 < min <= max <= 1, got ({}, {})",
                s0, s1
            )));
        }

        let (r0, r1) = self.random_crop_ratio;
        if !(r0 > 0.0 && r0 <= r1) {
            return Err(PipelineError::Config(format!(
                "random_crop_ratio must satisfy 0 < min <= max, got ({}, {})",
                r0, r1
            )));
        }

        if self.std.iter().any(|s| *s <= 0.0) {
            return Err(PipelineError::Config(format!(
                "std must be positive for every channel, got {:?}",
                self.std
            )));
        }

        if self.mixup < 0.0 || self.cutmix < 0.0 {
            return Err(PipelineError::Config(format!(
                "mixup ({}) and cutmix ({}) must be >= 0 (0 disables)",
                self.mixup, self.cutmix
            )));
        }

        if self.distributed && self.world_size == 0 {
            return Err(PipelineError::Config(
                "world_size must be greater than 0 in distributed mode".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether any mixing operator is enabled
    pub fn mixing_enabled(&self) -> bool {
        self.mixup > 0.0 || self.cutmix > 0.0
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).with_context(|| format!("invalid configuration in {:?}", path))
    }
}
