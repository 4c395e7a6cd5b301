//! Automatic augmentation policies
//!
//! Three schedules share one set of image operations:
//!
//! - **RandAugment**: two random ops per image at a fixed magnitude (bin 9 of 31)
//! - **TrivialAugmentWide**: one random op per image at a random magnitude, wide ranges
//! - **AutoAugment (ImageNet)**: one of 25 learned sub-policies, each op gated by its probability
//!
//! The policy is resolved from its configured name once; applying it only
//! draws the per-image random choices.

use image::{Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::transform::spec::Interpolation;
use crate::utils::error::{PipelineError, Result};

/// Number of magnitude bins used by RandAugment and TrivialAugmentWide
const WIDE_BINS: usize = 31;

/// Number of magnitude bins used by the ImageNet AutoAugment table
const IMAGENET_BINS: usize = 10;

const RAND_AUGMENT_OPS: usize = 2;
const RAND_AUGMENT_MAGNITUDE: usize = 9;

/// A single image operation of the augmentation space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AugmentOp {
    Identity,
    ShearX,
    ShearY,
    TranslateX,
    TranslateY,
    Rotate,
    Brightness,
    Color,
    Contrast,
    Sharpness,
    Posterize,
    Solarize,
    AutoContrast,
    Equalize,
    Invert,
}

/// Op space sampled by RandAugment and TrivialAugmentWide
const SAMPLED_OPS: [AugmentOp; 14] = [
    AugmentOp::Identity,
    AugmentOp::ShearX,
    AugmentOp::ShearY,
    AugmentOp::TranslateX,
    AugmentOp::TranslateY,
    AugmentOp::Rotate,
    AugmentOp::Brightness,
    AugmentOp::Color,
    AugmentOp::Contrast,
    AugmentOp::Sharpness,
    AugmentOp::Posterize,
    AugmentOp::Solarize,
    AugmentOp::AutoContrast,
    AugmentOp::Equalize,
];

/// Magnitude ranges of an op space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ranges {
    Standard,
    Wide,
}

/// One step of an AutoAugment sub-policy: op, probability, magnitude bin
type PolicyStep = (AugmentOp, f64, Option<usize>);

/// The 25 ImageNet sub-policies
const IMAGENET_POLICY: [[PolicyStep; 2]; 25] = {
    use AugmentOp::*;
    [
        [(Posterize, 0.4, Some(8)), (Rotate, 0.6, Some(9))],
        [(Solarize, 0.6, Some(5)), (AutoContrast, 0.6, None)],
        [(Equalize, 0.8, None), (Equalize, 0.6, None)],
        [(Posterize, 0.6, Some(7)), (Posterize, 0.6, Some(6))],
        [(Equalize, 0.4, None), (Solarize, 0.2, Some(4))],
        [(Equalize, 0.4, None), (Rotate, 0.8, Some(8))],
        [(Solarize, 0.6, Some(3)), (Equalize, 0.6, None)],
        [(Posterize, 0.8, Some(5)), (Equalize, 1.0, None)],
        [(Rotate, 0.2, Some(3)), (Solarize, 0.6, Some(8))],
        [(Equalize, 0.6, None), (Posterize, 0.4, Some(6))],
        [(Rotate, 0.8, Some(8)), (Color, 0.4, Some(0))],
        [(Rotate, 0.4, Some(9)), (Equalize, 0.6, None)],
        [(Equalize, 0.0, None), (Equalize, 0.8, None)],
        [(Invert, 0.6, None), (Equalize, 1.0, None)],
        [(Color, 0.6, Some(4)), (Contrast, 1.0, Some(8))],
        [(Rotate, 0.8, Some(8)), (Color, 1.0, Some(2))],
        [(Color, 0.8, Some(8)), (Solarize, 0.8, Some(7))],
        [(Sharpness, 0.4, Some(7)), (Invert, 0.6, None)],
        [(ShearX, 0.6, Some(5)), (Equalize, 1.0, None)],
        [(Color, 0.4, Some(0)), (Equalize, 0.6, None)],
        [(Equalize, 0.4, None), (Solarize, 0.2, Some(4))],
        [(Solarize, 0.6, Some(5)), (AutoContrast, 0.6, None)],
        [(Invert, 0.6, None), (Equalize, 1.0, None)],
        [(Color, 0.6, Some(4)), (Contrast, 1.0, Some(8))],
        [(Equalize, 0.8, None), (Equalize, 0.6, None)],
    ]
};

/// Value of bin `bin` in `num_bins` evenly spaced points from `lo` to `hi`
fn linspace(lo: f64, hi: f64, bin: usize, num_bins: usize) -> f64 {
    if num_bins <= 1 {
        return lo;
    }
    lo + (hi - lo) * bin as f64 / (num_bins - 1) as f64
}

impl AugmentOp {
    /// Whether the magnitude gets a random sign
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            AugmentOp::ShearX
                | AugmentOp::ShearY
                | AugmentOp::TranslateX
                | AugmentOp::TranslateY
                | AugmentOp::Rotate
                | AugmentOp::Brightness
                | AugmentOp::Color
                | AugmentOp::Contrast
                | AugmentOp::Sharpness
        )
    }

    /// Whether the op takes a magnitude at all
    pub fn has_magnitude(&self) -> bool {
        !matches!(
            self,
            AugmentOp::Identity | AugmentOp::AutoContrast | AugmentOp::Equalize | AugmentOp::Invert
        )
    }

    /// Unsigned magnitude of `bin` for an image of `width x height`
    fn magnitude(&self, bin: usize, num_bins: usize, width: u32, height: u32, ranges: Ranges) -> f64 {
        let wide = ranges == Ranges::Wide;
        match self {
            AugmentOp::ShearX | AugmentOp::ShearY => {
                linspace(0.0, if wide { 0.99 } else { 0.3 }, bin, num_bins)
            }
            AugmentOp::TranslateX => {
                let max = if wide { 32.0 } else { 150.0 / 331.0 * width as f64 };
                linspace(0.0, max, bin, num_bins)
            }
            AugmentOp::TranslateY => {
                let max = if wide { 32.0 } else { 150.0 / 331.0 * height as f64 };
                linspace(0.0, max, bin, num_bins)
            }
            AugmentOp::Rotate => linspace(0.0, if wide { 135.0 } else { 30.0 }, bin, num_bins),
            AugmentOp::Brightness
            | AugmentOp::Color
            | AugmentOp::Contrast
            | AugmentOp::Sharpness => linspace(0.0, if wide { 0.99 } else { 0.9 }, bin, num_bins),
            AugmentOp::Posterize => {
                let steps = if wide { 6.0 } else { 4.0 };
                let divisor = (num_bins.max(2) - 1) as f64 / steps;
                8.0 - (bin as f64 / divisor).round()
            }
            AugmentOp::Solarize => linspace(255.0, 0.0, bin, num_bins),
            AugmentOp::Identity
            | AugmentOp::AutoContrast
            | AugmentOp::Equalize
            | AugmentOp::Invert => 0.0,
        }
    }

    /// Apply the op with a (signed) magnitude
    pub fn apply(&self, img: &RgbImage, magnitude: f64, interpolation: Interpolation) -> RgbImage {
        let (width, height) = img.dimensions();
        match self {
            AugmentOp::Identity => img.clone(),
            AugmentOp::ShearX => warp(img, interpolation, |x, y| (x + magnitude * y, y)),
            AugmentOp::ShearY => warp(img, interpolation, |x, y| (x, y + magnitude * x)),
            AugmentOp::TranslateX => {
                let shift = magnitude.trunc();
                warp(img, interpolation, |x, y| (x - shift, y))
            }
            AugmentOp::TranslateY => {
                let shift = magnitude.trunc();
                warp(img, interpolation, |x, y| (x, y - shift))
            }
            AugmentOp::Rotate => rotate(img, magnitude, interpolation),
            AugmentOp::Brightness => blend(img, &RgbImage::new(width, height), 1.0 + magnitude),
            AugmentOp::Color => blend(img, &grayscale(img), 1.0 + magnitude),
            AugmentOp::Contrast => {
                let mean = mean_luminance(img).round().clamp(0.0, 255.0) as u8;
                blend(img, &RgbImage::from_pixel(width, height, Rgb([mean; 3])), 1.0 + magnitude)
            }
            AugmentOp::Sharpness => blend(img, &smooth(img), 1.0 + magnitude),
            AugmentOp::Posterize => posterize(img, magnitude.clamp(0.0, 8.0) as u8),
            AugmentOp::Solarize => solarize(img, magnitude),
            AugmentOp::AutoContrast => autocontrast(img),
            AugmentOp::Equalize => equalize(img),
            AugmentOp::Invert => map_values(img, |v| 255 - v),
        }
    }
}

/// Automatic augmentation policy, resolved once from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoAugmentPolicy {
    RandAugment,
    TrivialAugmentWide,
    ImageNet,
}

impl AutoAugmentPolicy {
    /// Resolve a policy by name prefix (`ra*`, `ta_wide*`, `aa*`)
    ///
    /// A missing, empty or `none` name disables the stage. Any other name is
    /// a configuration error.
    pub fn parse(name: Option<&str>) -> Result<Option<Self>> {
        let name = match name.map(str::trim) {
            None | Some("") => return Ok(None),
            Some(n) if n.eq_ignore_ascii_case("none") => return Ok(None),
            Some(n) => n,
        };

        if name.starts_with("ra") {
            Ok(Some(AutoAugmentPolicy::RandAugment))
        } else if name.starts_with("ta_wide") {
            Ok(Some(AutoAugmentPolicy::TrivialAugmentWide))
        } else if name.starts_with("aa") {
            Ok(Some(AutoAugmentPolicy::ImageNet))
        } else {
            Err(PipelineError::UnsupportedAutoAugment(name.to_string()))
        }
    }

    /// Apply the policy's random choice of ops to one image
    pub fn apply(&self, img: RgbImage, rng: &mut ChaCha8Rng, interpolation: Interpolation) -> RgbImage {
        let (width, height) = img.dimensions();
        match self {
            AutoAugmentPolicy::RandAugment => {
                let mut out = img;
                for _ in 0..RAND_AUGMENT_OPS {
                    let op = SAMPLED_OPS[rng.gen_range(0..SAMPLED_OPS.len())];
                    let magnitude = op.magnitude(
                        RAND_AUGMENT_MAGNITUDE,
                        WIDE_BINS,
                        width,
                        height,
                        Ranges::Standard,
                    );
                    let magnitude = random_sign(op, magnitude, rng);
                    out = op.apply(&out, magnitude, interpolation);
                }
                out
            }
            AutoAugmentPolicy::TrivialAugmentWide => {
                let op = SAMPLED_OPS[rng.gen_range(0..SAMPLED_OPS.len())];
                let magnitude = if op.has_magnitude() {
                    let bin = rng.gen_range(0..WIDE_BINS);
                    op.magnitude(bin, WIDE_BINS, width, height, Ranges::Wide)
                } else {
                    0.0
                };
                let magnitude = random_sign(op, magnitude, rng);
                op.apply(&img, magnitude, interpolation)
            }
            AutoAugmentPolicy::ImageNet => {
                let sub_policy = &IMAGENET_POLICY[rng.gen_range(0..IMAGENET_POLICY.len())];
                let mut out = img;
                for &(op, prob, bin) in sub_policy {
                    if rng.gen::<f64>() > prob {
                        continue;
                    }
                    let magnitude = bin
                        .map(|b| op.magnitude(b, IMAGENET_BINS, width, height, Ranges::Standard))
                        .unwrap_or(0.0);
                    let magnitude = random_sign(op, magnitude, rng);
                    out = op.apply(&out, magnitude, interpolation);
                }
                out
            }
        }
    }
}

fn random_sign(op: AugmentOp, magnitude: f64, rng: &mut ChaCha8Rng) -> f64 {
    if op.is_signed() && rng.gen::<bool>() {
        -magnitude
    } else {
        magnitude
    }
}

/// Resample through an inverse coordinate map; pixels mapped outside the image are black
fn warp<F>(img: &RgbImage, interpolation: Interpolation, src: F) -> RgbImage
where
    F: Fn(f64, f64) -> (f64, f64),
{
    let (width, height) = img.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let (sx, sy) = src(x as f64, y as f64);
        match interpolation {
            Interpolation::Nearest => nearest_sample(img, sx, sy),
            _ => bilinear_sample(img, sx, sy),
        }
    })
}

/// Rotate counter-clockwise by `degrees` around the image center
fn rotate(img: &RgbImage, degrees: f64, interpolation: Interpolation) -> RgbImage {
    if degrees == 0.0 {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    let cx = (width as f64 - 1.0) / 2.0;
    let cy = (height as f64 - 1.0) / 2.0;
    let (sin_a, cos_a) = degrees.to_radians().sin_cos();

    warp(img, interpolation, |x, y| {
        let dx = x - cx;
        let dy = y - cy;
        (cx + dx * cos_a - dy * sin_a, cy + dx * sin_a + dy * cos_a)
    })
}

fn nearest_sample(img: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (width, height) = img.dimensions();
    let (xi, yi) = (x.round(), y.round());
    if xi < 0.0 || yi < 0.0 || xi >= width as f64 || yi >= height as f64 {
        return Rgb([0, 0, 0]);
    }
    *img.get_pixel(xi as u32, yi as u32)
}

fn bilinear_sample(img: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (width, height) = img.dimensions();

    if x < 0.0 || y < 0.0 || x > (width - 1) as f64 || y > (height - 1) as f64 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f64 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f64 * fx * (1.0 - fy)
            + p01[c] as f64 * (1.0 - fx) * fy
            + p11[c] as f64 * fx * fy;
        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}

/// `img * factor + degenerate * (1 - factor)`, clamped to the u8 range
fn blend(img: &RgbImage, degenerate: &RgbImage, factor: f64) -> RgbImage {
    let mut out = img.clone();
    for (dst, src) in out.pixels_mut().zip(degenerate.pixels()) {
        for c in 0..3 {
            let v = dst[c] as f64 * factor + src[c] as f64 * (1.0 - factor);
            dst[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

fn luminance(pixel: &Rgb<u8>) -> f64 {
    0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64
}

fn grayscale(img: &RgbImage) -> RgbImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let gray = luminance(pixel).round().clamp(0.0, 255.0) as u8;
        *pixel = Rgb([gray; 3]);
    }
    out
}

fn mean_luminance(img: &RgbImage) -> f64 {
    let count = img.width() as f64 * img.height() as f64;
    if count == 0.0 {
        return 0.0;
    }
    img.pixels().map(luminance).sum::<f64>() / count
}

/// 3x3 smoothing with weights 1 around and 5 in the center; border pixels are kept
fn smooth(img: &RgbImage) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut out = img.clone();
    if width < 3 || height < 3 {
        return out;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = [0.0f64; 3];
            for ky in 0..3 {
                for kx in 0..3 {
                    let weight = if kx == 1 && ky == 1 { 5.0 } else { 1.0 };
                    let p = img.get_pixel(x + kx - 1, y + ky - 1);
                    for c in 0..3 {
                        acc[c] += weight * p[c] as f64;
                    }
                }
            }
            let pixel = acc.map(|v| (v / 13.0).round().clamp(0.0, 255.0) as u8);
            out.put_pixel(x, y, Rgb(pixel));
        }
    }
    out
}

fn map_values<F: Fn(u8) -> u8>(img: &RgbImage, f: F) -> RgbImage {
    let mut out = img.clone();
    for v in out.iter_mut() {
        *v = f(*v);
    }
    out
}

/// Keep the `bits` most significant bits of every channel
fn posterize(img: &RgbImage, bits: u8) -> RgbImage {
    if bits >= 8 {
        return img.clone();
    }
    let mask = !((1u16 << (8 - bits)) - 1) as u8;
    map_values(img, |v| v & mask)
}

/// Invert every channel value at or above `threshold`
fn solarize(img: &RgbImage, threshold: f64) -> RgbImage {
    map_values(img, |v| if v as f64 >= threshold { 255 - v } else { v })
}

/// Stretch every channel to the full range
fn autocontrast(img: &RgbImage) -> RgbImage {
    let mut lo = [255u8; 3];
    let mut hi = [0u8; 3];
    for pixel in img.pixels() {
        for c in 0..3 {
            lo[c] = lo[c].min(pixel[c]);
            hi[c] = hi[c].max(pixel[c]);
        }
    }

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            if hi[c] > lo[c] {
                let scale = 255.0 / (hi[c] - lo[c]) as f64;
                let v = (pixel[c] - lo[c]) as f64 * scale;
                pixel[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// Per-channel histogram equalization
fn equalize(img: &RgbImage) -> RgbImage {
    let mut luts = [[0u8; 256]; 3];

    for (c, lut) in luts.iter_mut().enumerate() {
        let mut histogram = [0u64; 256];
        for pixel in img.pixels() {
            histogram[pixel[c] as usize] += 1;
        }

        let identity = |lut: &mut [u8; 256]| {
            for (i, v) in lut.iter_mut().enumerate() {
                *v = i as u8;
            }
        };

        let last = histogram.iter().rposition(|&h| h > 0);
        let nonzero = histogram.iter().filter(|&&h| h > 0).count();
        let total: u64 = histogram.iter().sum();
        let step = match last {
            Some(last) if nonzero > 1 => (total - histogram[last]) / 255,
            _ => 0,
        };

        if step == 0 {
            identity(lut);
            continue;
        }

        let mut n = step / 2;
        for (i, v) in lut.iter_mut().enumerate() {
            *v = (n / step).min(255) as u8;
            n += histogram[i];
        }
    }

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            pixel[c] = luts[c][pixel[c] as usize];
        }
    }
    out
}
