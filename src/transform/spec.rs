//! Resolved transform settings
//!
//! `TransformSpec` is resolved once from a [`DataConfig`]: every mode and
//! policy name is parsed here, so an unsupported value fails while the
//! pipeline is built instead of on the first sample.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::config::{DataConfig, ImageSize};
use crate::transform::auto_augment::AutoAugmentPolicy;
use crate::utils::error::{PipelineError, Result};

/// Name of the evaluation mode that scales only the shorter side
pub const RESIZE_SHORTER: &str = "resize_shorter";

/// Resampling filter used by every resize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos,
}

impl Interpolation {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "nearest" => Ok(Interpolation::Nearest),
            "bilinear" => Ok(Interpolation::Bilinear),
            "bicubic" => Ok(Interpolation::Bicubic),
            "lanczos" => Ok(Interpolation::Lanczos),
            _ => Err(PipelineError::UnsupportedInterpolation(name.to_string())),
        }
    }

    pub fn filter(&self) -> FilterType {
        match self {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Bilinear => FilterType::Triangle,
            Interpolation::Bicubic => FilterType::CatmullRom,
            Interpolation::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// Spatial stage of the training pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum TrainResize {
    /// Crop a random area/aspect box, then resize it to `size`
    RandomResizedCrop {
        size: ImageSize,
        scale: (f64, f64),
        ratio: (f64, f64),
    },
    /// Resize to `size`, then take a random crop of `size` from the zero-padded image
    ResizeRandomCrop { size: ImageSize, pad: u32 },
}

impl TrainResize {
    /// Resolve the configured resize mode
    pub fn from_config(config: &DataConfig) -> Result<Self> {
        match config.train_resize_mode.as_str() {
            "RandomResizedCrop" => Ok(TrainResize::RandomResizedCrop {
                size: config.train_size,
                scale: config.random_crop_scale,
                ratio: config.random_crop_ratio,
            }),
            "ResizeRandomCrop" => Ok(TrainResize::ResizeRandomCrop {
                size: config.train_size,
                pad: config.random_crop_pad,
            }),
            other => Err(PipelineError::UnsupportedResizeMode(other.to_string())),
        }
    }

    /// Output `(height, width)` of the stage
    pub fn output_dims(&self) -> (u32, u32) {
        match self {
            TrainResize::RandomResizedCrop { size, .. } => size.dims(),
            TrainResize::ResizeRandomCrop { size, .. } => size.dims(),
        }
    }
}

/// Resize applied before the evaluation center crop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalResize {
    /// Scale the shorter side to this length, keeping the aspect ratio
    ShorterSide(u32),
    /// Resize to exactly `(height, width)`
    Exact { height: u32, width: u32 },
}

impl EvalResize {
    /// `floor(target / crop_ratio)` per dimension; `resize_shorter` keeps only the first
    pub fn new(size: ImageSize, crop_ratio: f64, mode: &str) -> Self {
        let (h, w) = size.dims();
        let height = (h as f64 / crop_ratio).floor() as u32;
        let width = (w as f64 / crop_ratio).floor() as u32;

        if mode == RESIZE_SHORTER {
            EvalResize::ShorterSide(height)
        } else {
            EvalResize::Exact { height, width }
        }
    }

    /// The equivalent resize size
    pub fn as_size(&self) -> ImageSize {
        match *self {
            EvalResize::ShorterSide(s) => ImageSize::Square(s),
            EvalResize::Exact { height, width } => ImageSize::Rect(height, width),
        }
    }
}

/// Immutable description of both transform pipelines
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSpec {
    pub train_resize: TrainResize,
    pub hflip: f64,
    pub auto_augment: Option<AutoAugmentPolicy>,
    pub random_erasing: f64,
    pub interpolation: Interpolation,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub test_size: ImageSize,
    pub eval_resize: EvalResize,
}

impl TransformSpec {
    pub fn from_config(config: &DataConfig) -> Result<Self> {
        let train_resize = TrainResize::from_config(config)?;
        let auto_augment = AutoAugmentPolicy::parse(config.auto_aug.as_deref())?;
        let interpolation = Interpolation::parse(&config.interpolation)?;

        Ok(Self {
            train_resize,
            hflip: config.hflip,
            auto_augment,
            random_erasing: config.remode,
            interpolation,
            mean: config.mean,
            std: config.std,
            test_size: config.test_size,
            eval_resize: EvalResize::new(
                config.test_size,
                config.center_crop_ptr,
                &config.test_resize_mode,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_resize_arithmetic() {
        let resize = EvalResize::new(ImageSize::Square(224), 0.875, RESIZE_SHORTER);
        assert_eq!(resize, EvalResize::ShorterSide(256));

        let resize = EvalResize::new(ImageSize::Rect(224, 160), 0.875, "fixed");
        assert_eq!(
            resize,
            EvalResize::Exact {
                height: 256,
                width: 182
            }
        );
    }

    #[test]
    fn test_eval_resize_without_crop_ratio() {
        let resize = EvalResize::new(ImageSize::Square(32), 1.0, "fixed");
        assert_eq!(resize.as_size(), ImageSize::Rect(32, 32));
    }

    #[test]
    fn test_unknown_resize_mode_is_config_error() {
        let config = DataConfig {
            train_resize_mode: "Unknown".to_string(),
            ..Default::default()
        };
        let err = TransformSpec::from_config(&config).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedResizeMode(ref m) if m == "Unknown"));
    }

    #[test]
    fn test_interpolation_names() {
        assert_eq!(Interpolation::parse("bilinear").unwrap(), Interpolation::Bilinear);
        assert_eq!(Interpolation::parse("BICUBIC").unwrap(), Interpolation::Bicubic);
        assert!(matches!(
            Interpolation::parse("area"),
            Err(PipelineError::UnsupportedInterpolation(_))
        ));
    }

    #[test]
    fn test_spec_resolves_policy_once() {
        let config = DataConfig {
            auto_aug: Some("ta_wide".to_string()),
            train_resize_mode: "ResizeRandomCrop".to_string(),
            ..Default::default()
        };
        let spec = TransformSpec::from_config(&config).unwrap();
        assert_eq!(spec.auto_augment, Some(AutoAugmentPolicy::TrivialAugmentWide));
        assert!(matches!(
            spec.train_resize,
            TrainResize::ResizeRandomCrop { pad: 4, .. }
        ));
    }
}
