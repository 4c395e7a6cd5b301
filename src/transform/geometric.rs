//! Geometric primitives on RGB images: resize, crops and flips.

use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::config::ImageSize;

/// Target `(width, height)` when the shorter side becomes `size`
pub fn shorter_side_dims(width: u32, height: u32, size: u32) -> (u32, u32) {
    if width <= height {
        let long = (size as u64 * height as u64 / width.max(1) as u64) as u32;
        (size, long)
    } else {
        let long = (size as u64 * width as u64 / height.max(1) as u64) as u32;
        (long, size)
    }
}

/// Resize following the `ImageSize` convention (square = shorter side)
pub fn resize(img: &RgbImage, size: ImageSize, filter: FilterType) -> RgbImage {
    let (width, height) = img.dimensions();
    let (new_w, new_h) = match size {
        ImageSize::Square(s) => shorter_side_dims(width, height, s),
        ImageSize::Rect(h, w) => (w, h),
    };

    if (new_w, new_h) == (width, height) {
        return img.clone();
    }
    imageops::resize(img, new_w, new_h, filter)
}

/// Crop a `height x width` window whose top-left corner is `(top, left)`
///
/// The window may extend past the image; uncovered pixels are zero.
pub fn crop_padded(img: &RgbImage, top: i64, left: i64, height: u32, width: u32) -> RgbImage {
    let (img_w, img_h) = img.dimensions();
    let mut out = RgbImage::new(width, height);

    let y_start = top.max(0);
    let y_end = (top + height as i64).min(img_h as i64);
    let x_start = left.max(0);
    let x_end = (left + width as i64).min(img_w as i64);

    for y in y_start..y_end {
        for x in x_start..x_end {
            let pixel = *img.get_pixel(x as u32, y as u32);
            out.put_pixel((x - left) as u32, (y - top) as u32, pixel);
        }
    }

    out
}

/// Center crop to `(height, width)`, zero-padding when the image is smaller
pub fn center_crop(img: &RgbImage, height: u32, width: u32) -> RgbImage {
    let (img_w, img_h) = img.dimensions();
    if (img_w, img_h) == (width, height) {
        return img.clone();
    }
    let top = ((img_h as f64 - height as f64) / 2.0).round() as i64;
    let left = ((img_w as f64 - width as f64) / 2.0).round() as i64;
    crop_padded(img, top, left, height, width)
}

/// Random top-left offset for a crop of `target` out of `len` padded by `pad` on both sides
fn random_offset(len: u32, target: u32, pad: u32, rng: &mut ChaCha8Rng) -> i64 {
    let lo = -(pad as i64);
    let hi = len as i64 + pad as i64 - target as i64;
    if hi < lo {
        // Even the padded image is too small; center it.
        (len as i64 - target as i64) / 2
    } else {
        rng.gen_range(lo..=hi)
    }
}

/// Random `(height, width)` crop out of the image padded by `pad` zero pixels
pub fn random_crop(
    img: &RgbImage,
    height: u32,
    width: u32,
    pad: u32,
    rng: &mut ChaCha8Rng,
) -> RgbImage {
    let (img_w, img_h) = img.dimensions();
    let top = random_offset(img_h, height, pad, rng);
    let left = random_offset(img_w, width, pad, rng);
    crop_padded(img, top, left, height, width)
}

/// Crop box chosen by `RandomResizedCrop`, in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub top: u32,
    pub left: u32,
    pub height: u32,
    pub width: u32,
}

/// Sample a box covering a random area fraction in `scale` with aspect ratio in `ratio`
///
/// Ten attempts are made; if none fits, a central crop with the aspect
/// ratio clamped into `ratio` is used.
pub fn random_resized_crop_box(
    img_w: u32,
    img_h: u32,
    scale: (f64, f64),
    ratio: (f64, f64),
    rng: &mut ChaCha8Rng,
) -> CropBox {
    let area = img_w as f64 * img_h as f64;
    let log_ratio = (ratio.0.ln(), ratio.1.ln());

    for _ in 0..10 {
        let target_area = area * uniform(rng, scale.0, scale.1);
        let aspect = uniform(rng, log_ratio.0, log_ratio.1).exp();

        let w = (target_area * aspect).sqrt().round() as u32;
        let h = (target_area / aspect).sqrt().round() as u32;

        if w > 0 && h > 0 && w <= img_w && h <= img_h {
            let top = rng.gen_range(0..=img_h - h);
            let left = rng.gen_range(0..=img_w - w);
            return CropBox {
                top,
                left,
                height: h,
                width: w,
            };
        }
    }

    let in_ratio = img_w as f64 / img_h as f64;
    let (w, h) = if in_ratio < ratio.0 {
        (img_w, (img_w as f64 / ratio.0).round() as u32)
    } else if in_ratio > ratio.1 {
        ((img_h as f64 * ratio.1).round() as u32, img_h)
    } else {
        (img_w, img_h)
    };
    let (w, h) = (w.clamp(1, img_w.max(1)), h.clamp(1, img_h.max(1)));

    CropBox {
        top: (img_h - h) / 2,
        left: (img_w - w) / 2,
        height: h,
        width: w,
    }
}

/// Crop a random area/aspect box and resize it to `size`
pub fn random_resized_crop(
    img: &RgbImage,
    size: ImageSize,
    scale: (f64, f64),
    ratio: (f64, f64),
    filter: FilterType,
    rng: &mut ChaCha8Rng,
) -> RgbImage {
    let (img_w, img_h) = img.dimensions();
    let crop = random_resized_crop_box(img_w, img_h, scale, ratio, rng);
    let cropped = imageops::crop_imm(img, crop.left, crop.top, crop.width, crop.height).to_image();
    let (out_h, out_w) = size.dims();
    imageops::resize(&cropped, out_w, out_h, filter)
}

/// Mirror the image left-right with probability `p`
pub fn random_horizontal_flip(img: RgbImage, p: f64, rng: &mut ChaCha8Rng) -> RgbImage {
    if rng.gen::<f64>() < p {
        imageops::flip_horizontal(&img)
    } else {
        img
    }
}

/// Uniform sample in `[lo, hi)`, or `lo` when the range is empty
pub(crate) fn uniform(rng: &mut ChaCha8Rng, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}
