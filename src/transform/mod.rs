//! Per-sample transform pipelines
//!
//! This module turns one decoded image into one normalized CHW tensor:
//!
//! ```text
//! transform/
//! ├── spec.rs          → TransformSpec, resolved once from DataConfig
//! ├── geometric.rs     → resize, crops, flips
//! ├── photometric.rs   → tensor conversion, normalization, random erasing
//! ├── auto_augment.rs  → RandAugment / TrivialAugmentWide / AutoAugment
//! └── pipeline.rs      → TrainTransform and EvalTransform
//! ```
//!
//! The stage layout of a pipeline is fixed when it is built; only the random
//! content (flip decisions, crop boxes, augment ops) changes per call. Each
//! call receives its own RNG so that workers never share mutable state.

pub mod auto_augment;
pub mod geometric;
pub mod photometric;
pub mod pipeline;
pub mod spec;

pub use auto_augment::{AugmentOp, AutoAugmentPolicy};
pub use pipeline::{EvalTransform, TrainTransform};
pub use spec::{EvalResize, Interpolation, TrainResize, TransformSpec};

use image::DynamicImage;
use rand_chacha::ChaCha8Rng;

use crate::utils::error::Result;

/// A single image as a CHW float tensor
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    /// Values laid out channel-major: `data[c * H * W + y * W + x]`
    pub data: Vec<f32>,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageTensor {
    /// Create a tensor, checking that the buffer matches the shape
    pub fn new(data: Vec<f32>, channels: usize, height: usize, width: usize) -> Option<Self> {
        if data.len() != channels * height * width {
            return None;
        }
        Some(Self {
            data,
            channels,
            height,
            width,
        })
    }

    /// `[channels, height, width]`
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    /// Values of one channel plane
    pub fn plane(&self, channel: usize) -> &[f32] {
        let size = self.height * self.width;
        &self.data[channel * size..(channel + 1) * size]
    }
}

/// Maps one raw image to one normalized tensor
///
/// Implementations are immutable after construction and shared between
/// loader workers.
pub trait SampleTransform: Send + Sync {
    fn apply(&self, image: DynamicImage, rng: &mut ChaCha8Rng) -> Result<ImageTensor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_tensor_shape_check() {
        assert!(ImageTensor::new(vec![0.0; 12], 3, 2, 2).is_some());
        assert!(ImageTensor::new(vec![0.0; 11], 3, 2, 2).is_none());
    }

    #[test]
    fn test_plane_slices_channel() {
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let tensor = ImageTensor::new(data, 3, 2, 2).unwrap();
        assert_eq!(tensor.plane(1), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(tensor.shape(), [3, 2, 2]);
    }
}
