//! Tensor-level stages: conversion, normalization and random erasing.

use image::RgbImage;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::transform::geometric::uniform;
use crate::transform::ImageTensor;

/// Area fraction range of an erased region
pub const ERASE_SCALE: (f64, f64) = (0.02, 0.33);

/// Aspect ratio range of an erased region
pub const ERASE_RATIO: (f64, f64) = (0.3, 3.3);

/// Convert an RGB image to a CHW tensor with values in [0, 1]
pub fn to_tensor(img: &RgbImage) -> ImageTensor {
    let (width, height) = img.dimensions();
    let plane = width as usize * height as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (i, pixel) in img.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = pixel[c] as f32 / 255.0;
        }
    }

    ImageTensor {
        data,
        channels: 3,
        height: height as usize,
        width: width as usize,
    }
}

/// Normalize every channel in place: `(v - mean[c]) / std[c]`
pub fn normalize(tensor: &mut ImageTensor, mean: &[f32; 3], std: &[f32; 3]) {
    let plane = tensor.height * tensor.width;
    for (c, values) in tensor.data.chunks_mut(plane.max(1)).enumerate() {
        let (m, s) = (mean[c % 3], std[c % 3]);
        for v in values.iter_mut() {
            *v = (*v - m) / s;
        }
    }
}

/// Region chosen for erasing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseBox {
    pub top: usize,
    pub left: usize,
    pub height: usize,
    pub width: usize,
}

/// Sample an erase region strictly smaller than `height x width`
///
/// Returns `None` when ten attempts fail to fit a region.
pub fn sample_erase_box(height: usize, width: usize, rng: &mut ChaCha8Rng) -> Option<EraseBox> {
    let area = (height * width) as f64;
    let log_ratio = (ERASE_RATIO.0.ln(), ERASE_RATIO.1.ln());

    for _ in 0..10 {
        let erase_area = area * uniform(rng, ERASE_SCALE.0, ERASE_SCALE.1);
        let aspect = uniform(rng, log_ratio.0, log_ratio.1).exp();

        let h = (erase_area * aspect).sqrt().round() as usize;
        let w = (erase_area / aspect).sqrt().round() as usize;
        if !(h < height && w < width) {
            continue;
        }

        let top = rng.gen_range(0..=height - h);
        let left = rng.gen_range(0..=width - w);
        return Some(EraseBox {
            top,
            left,
            height: h,
            width: w,
        });
    }

    None
}

/// With probability `p`, zero a random rectangle in every channel
pub fn random_erasing(tensor: &mut ImageTensor, p: f64, rng: &mut ChaCha8Rng) -> Option<EraseBox> {
    if rng.gen::<f64>() >= p {
        return None;
    }

    let erase = sample_erase_box(tensor.height, tensor.width, rng)?;
    let plane = tensor.height * tensor.width;
    for c in 0..tensor.channels {
        for y in erase.top..erase.top + erase.height {
            let row = c * plane + y * tensor.width;
            tensor.data[row + erase.left..row + erase.left + erase.width].fill(0.0);
        }
    }

    Some(erase)
}
