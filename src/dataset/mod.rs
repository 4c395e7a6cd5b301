//! Dataset Module
//!
//! Datasets are seen by the rest of the pipeline only through the
//! [`ImageDataset`] capability: a length, an indexed fetch returning a decoded
//! image with its class index, and the class names.
//!
//! - `folder`: one sub-directory per class, images decoded on demand
//! - `cifar`: CIFAR-10 / CIFAR-100 binary archives, held in memory
//! - `fashion_mnist`: Fashion-MNIST idx files, held in memory
//! - `download`: archive fetching and unpacking
//! - `registry`: maps a dataset type name to its construction strategy

pub mod cifar;
pub mod download;
pub mod fashion_mnist;
pub mod folder;
pub mod registry;

pub use folder::ImageFolder;
pub use registry::{build_datasets, ConstructionStrategy, DatasetKind, DatasetPair};

use image::{DynamicImage, GrayImage, RgbImage};

use crate::utils::error::{PipelineError, Result};

/// Indexed access to labeled images
pub trait ImageDataset: Send + Sync {
    fn len(&self) -> usize;

    /// Decoded image and class index of sample `index`
    fn get(&self, index: usize) -> Result<(DynamicImage, usize)>;

    /// Class names, indexed by label
    fn classes(&self) -> &[String];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn num_classes(&self) -> usize {
        self.classes().len()
    }
}

/// Channel layout of raw pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Interleaved RGB, 3 bytes per pixel
    Rgb,
    /// Single luminance byte per pixel
    Luma,
}

impl PixelLayout {
    pub fn channels(&self) -> usize {
        match self {
            PixelLayout::Rgb => 3,
            PixelLayout::Luma => 1,
        }
    }
}

/// Fixed-size images held as one contiguous byte buffer
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    width: u32,
    height: u32,
    layout: PixelLayout,
    pixels: Vec<u8>,
    labels: Vec<usize>,
    classes: Vec<String>,
}

impl InMemoryDataset {
    pub fn new(
        width: u32,
        height: u32,
        layout: PixelLayout,
        pixels: Vec<u8>,
        labels: Vec<usize>,
        classes: Vec<String>,
    ) -> Result<Self> {
        let image_len = width as usize * height as usize * layout.channels();
        if pixels.len() != image_len * labels.len() {
            return Err(PipelineError::Dataset(format!(
                "{} pixel bytes do not hold {} images of {}x{}x{}",
                pixels.len(),
                labels.len(),
                layout.channels(),
                height,
                width
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= classes.len()) {
            return Err(PipelineError::Dataset(format!(
                "label {} out of range for {} classes",
                bad,
                classes.len()
            )));
        }

        Ok(Self {
            width,
            height,
            layout,
            pixels,
            labels,
            classes,
        })
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    fn image_len(&self) -> usize {
        self.width as usize * self.height as usize * self.layout.channels()
    }
}

impl ImageDataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Result<(DynamicImage, usize)> {
        let label = *self.labels.get(index).ok_or_else(|| {
            PipelineError::Dataset(format!(
                "index {} out of range for {} samples",
                index,
                self.labels.len()
            ))
        })?;

        let n = self.image_len();
        let raw = self.pixels[index * n..(index + 1) * n].to_vec();
        let invalid = || PipelineError::Dataset(format!("corrupt pixel buffer for sample {}", index));

        let image = match self.layout {
            PixelLayout::Rgb => DynamicImage::ImageRgb8(
                RgbImage::from_raw(self.width, self.height, raw).ok_or_else(invalid)?,
            ),
            PixelLayout::Luma => DynamicImage::ImageLuma8(
                GrayImage::from_raw(self.width, self.height, raw).ok_or_else(invalid)?,
            ),
        };

        Ok((image, label))
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{}", i)).collect()
    }

    #[test]
    fn test_in_memory_get() {
        let pixels: Vec<u8> = (0..2 * 2 * 2 * 3).map(|v| v as u8).collect();
        let dataset =
            InMemoryDataset::new(2, 2, PixelLayout::Rgb, pixels, vec![1, 0], classes(2)).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.num_classes(), 2);

        let (image, label) = dataset.get(1).unwrap();
        assert_eq!(label, 0);
        let rgb = image.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [12, 13, 14]);
    }

    #[test]
    fn test_in_memory_luma() {
        let dataset =
            InMemoryDataset::new(3, 1, PixelLayout::Luma, vec![9, 8, 7], vec![0], classes(1))
                .unwrap();
        let (image, _) = dataset.get(0).unwrap();
        assert_eq!(image.to_luma8().get_pixel(2, 0).0, [7]);
    }

    #[test]
    fn test_in_memory_validation() {
        assert!(InMemoryDataset::new(2, 2, PixelLayout::Rgb, vec![0; 5], vec![0], classes(1)).is_err());
        assert!(InMemoryDataset::new(1, 1, PixelLayout::Luma, vec![0], vec![3], classes(2)).is_err());
    }

    #[test]
    fn test_in_memory_index_out_of_range() {
        let dataset =
            InMemoryDataset::new(1, 1, PixelLayout::Luma, vec![0], vec![0], classes(1)).unwrap();
        assert!(matches!(dataset.get(1), Err(PipelineError::Dataset(_))));
    }
}
