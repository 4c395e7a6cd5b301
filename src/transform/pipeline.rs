//! Training and evaluation transform pipelines

use image::DynamicImage;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::config::ImageSize;
use crate::transform::auto_augment::AutoAugmentPolicy;
use crate::transform::geometric::{
    center_crop, random_crop, random_horizontal_flip, random_resized_crop, resize,
};
use crate::transform::photometric::{normalize, random_erasing, to_tensor};
use crate::transform::spec::{EvalResize, Interpolation, TrainResize, TransformSpec};
use crate::transform::{ImageTensor, SampleTransform};
use crate::utils::error::{PipelineError, Result};

fn check_dims(name: &str, (height, width): (u32, u32)) -> Result<()> {
    if height == 0 || width == 0 {
        return Err(PipelineError::Config(format!(
            "{} output size must be non-zero, got {}x{}",
            name, height, width
        )));
    }
    Ok(())
}

fn check_image(image: &DynamicImage) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::InvalidInput(format!(
            "cannot transform an empty {}x{} image",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

/// Randomized per-sample pipeline used for training
///
/// Stage order: flip, auto augment, spatial resize, tensor conversion,
/// normalization, random erasing. Disabled stages are left out when the
/// pipeline is built.
#[derive(Debug, Clone)]
pub struct TrainTransform {
    hflip: Option<f64>,
    auto_augment: Option<AutoAugmentPolicy>,
    resize: TrainResize,
    interpolation: Interpolation,
    mean: [f32; 3],
    std: [f32; 3],
    random_erasing: Option<f64>,
}

impl TrainTransform {
    pub fn build(spec: &TransformSpec) -> Result<Self> {
        check_dims("train", spec.train_resize.output_dims())?;

        let transform = Self {
            hflip: (spec.hflip > 0.0).then_some(spec.hflip),
            auto_augment: spec.auto_augment,
            resize: spec.train_resize.clone(),
            interpolation: spec.interpolation,
            mean: spec.mean,
            std: spec.std,
            random_erasing: (spec.random_erasing > 0.0).then_some(spec.random_erasing),
        };
        debug!("Train transform stages: {}", transform.stages().join(" -> "));
        Ok(transform)
    }

    /// Names of the active stages, in order
    pub fn stages(&self) -> Vec<String> {
        let mut stages = Vec::new();
        if let Some(p) = self.hflip {
            stages.push(format!("RandomHorizontalFlip({})", p));
        }
        if let Some(policy) = self.auto_augment {
            stages.push(format!("{:?}", policy));
        }
        match &self.resize {
            TrainResize::RandomResizedCrop { size, .. } => {
                stages.push(format!("RandomResizedCrop({})", size))
            }
            TrainResize::ResizeRandomCrop { size, pad } => {
                stages.push(format!("Resize({})", size));
                stages.push(format!("RandomCrop({}, pad={})", size, pad));
            }
        }
        stages.push("ToTensor".to_string());
        stages.push("Normalize".to_string());
        if let Some(p) = self.random_erasing {
            stages.push(format!("RandomErasing({})", p));
        }
        stages
    }
}

impl SampleTransform for TrainTransform {
    fn apply(&self, image: DynamicImage, rng: &mut ChaCha8Rng) -> Result<ImageTensor> {
        check_image(&image)?;
        let filter = self.interpolation.filter();
        let mut img = image.to_rgb8();

        if let Some(p) = self.hflip {
            img = random_horizontal_flip(img, p, rng);
        }

        if let Some(policy) = self.auto_augment {
            img = policy.apply(img, rng, self.interpolation);
        }

        img = match &self.resize {
            TrainResize::RandomResizedCrop { size, scale, ratio } => {
                random_resized_crop(&img, *size, *scale, *ratio, filter, rng)
            }
            TrainResize::ResizeRandomCrop { size, pad } => {
                let resized = resize(&img, *size, filter);
                let (h, w) = size.dims();
                random_crop(&resized, h, w, *pad, rng)
            }
        };

        let mut tensor = to_tensor(&img);
        normalize(&mut tensor, &self.mean, &self.std);

        if let Some(p) = self.random_erasing {
            random_erasing(&mut tensor, p, rng);
        }

        Ok(tensor)
    }
}

/// Deterministic pipeline used for evaluation: resize, center crop, normalize
#[derive(Debug, Clone)]
pub struct EvalTransform {
    resize: EvalResize,
    crop: ImageSize,
    interpolation: Interpolation,
    mean: [f32; 3],
    std: [f32; 3],
}

impl EvalTransform {
    pub fn build(spec: &TransformSpec) -> Result<Self> {
        check_dims("eval", spec.test_size.dims())?;
        check_dims("eval resize", spec.eval_resize.as_size().dims())?;

        debug!(
            "Eval transform: resize {:?}, center crop {}",
            spec.eval_resize, spec.test_size
        );
        Ok(Self {
            resize: spec.eval_resize,
            crop: spec.test_size,
            interpolation: spec.interpolation,
            mean: spec.mean,
            std: spec.std,
        })
    }

    /// Resize applied before the center crop
    pub fn resize(&self) -> EvalResize {
        self.resize
    }
}

impl SampleTransform for EvalTransform {
    fn apply(&self, image: DynamicImage, _rng: &mut ChaCha8Rng) -> Result<ImageTensor> {
        check_image(&image)?;
        let img = image.to_rgb8();
        let resized = resize(&img, self.resize.as_size(), self.interpolation.filter());
        let (h, w) = self.crop.dims();
        let cropped = center_crop(&resized, h, w);

        let mut tensor = to_tensor(&cropped);
        normalize(&mut tensor, &self.mean, &self.std);
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataConfig;
    use image::{Rgb, RgbImage};
    use rand::SeedableRng;

    fn photo(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_eval_transform_output_shape() {
        let spec = TransformSpec::from_config(&DataConfig::default()).unwrap();
        let transform = EvalTransform::build(&spec).unwrap();
        assert_eq!(transform.resize(), EvalResize::ShorterSide(256));

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let tensor = transform.apply(photo(500, 375), &mut rng).unwrap();
        assert_eq!(tensor.shape(), [3, 224, 224]);
    }

    #[test]
    fn test_eval_transform_is_deterministic() {
        let spec = TransformSpec::from_config(&DataConfig::default()).unwrap();
        let transform = EvalTransform::build(&spec).unwrap();

        let a = transform
            .apply(photo(300, 260), &mut ChaCha8Rng::seed_from_u64(1))
            .unwrap();
        let b = transform
            .apply(photo(300, 260), &mut ChaCha8Rng::seed_from_u64(2))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_train_transform_output_shape() {
        let config = DataConfig {
            auto_aug: Some("ra".to_string()),
            remode: 0.5,
            ..DataConfig::default()
        };
        let spec = TransformSpec::from_config(&config).unwrap();
        let transform = TrainTransform::build(&spec).unwrap();
        assert_eq!(transform.stages().len(), 6);

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..5 {
            let tensor = transform.apply(photo(320, 240), &mut rng).unwrap();
            assert_eq!(tensor.shape(), [3, 224, 224]);
        }
    }

    #[test]
    fn test_resize_random_crop_on_small_images() {
        let spec = TransformSpec::from_config(&DataConfig::cifar10()).unwrap();
        let transform = TrainTransform::build(&spec).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let tensor = transform.apply(photo(32, 32), &mut rng).unwrap();
        assert_eq!(tensor.shape(), [3, 32, 32]);
    }

    #[test]
    fn test_normalization_applied() {
        let config = DataConfig {
            hflip: 0.0,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
            ..DataConfig::cifar10()
        };
        let spec = TransformSpec::from_config(&config).unwrap();
        let transform = EvalTransform::build(&spec).unwrap();

        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([255, 255, 255])));
        let tensor = transform
            .apply(white, &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap();
        assert!(tensor.data.iter().all(|v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let spec = TransformSpec::from_config(&DataConfig::default()).unwrap();
        let transform = TrainTransform::build(&spec).unwrap();
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let err = transform
            .apply(empty, &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_grayscale_input_becomes_three_channels() {
        let spec = TransformSpec::from_config(&DataConfig::cifar10()).unwrap();
        let transform = EvalTransform::build(&spec).unwrap();
        let gray = DynamicImage::ImageLuma8(image::GrayImage::new(28, 28));
        let tensor = transform
            .apply(gray, &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap();
        assert_eq!(tensor.shape(), [3, 32, 32]);
    }
}
