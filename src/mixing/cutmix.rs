//! CutMix: paste a rectangle from the neighbouring image
//!
//! The box is sized from the mixing ratio, centered on a random pixel and
//! clipped to the image, so its actual area can be smaller than the ratio
//! asks for. Labels are weighted by the clipped area: each row keeps the
//! fraction of its own pixels that survived (`CutBox::kept_fraction`) and
//! the partner gets the rest. A box clipped to zero area changes nothing.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use crate::batch::{ImageBatch, Target};
use crate::mixing::{check_lengths, Mixed, MixingOperator, MixingPolicy};
use crate::utils::error::Result;

/// Half-open pixel rectangle `[top, bottom) x [left, right)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutBox {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl CutBox {
    /// Box for `ratio` centered on `(row, col)`, clipped to `height x width`
    pub fn clipped(height: usize, width: usize, ratio: f64, row: usize, col: usize) -> Self {
        let cut = ratio.max(0.0).sqrt();
        let half_height = (0.5 * cut * height as f64).floor() as usize;
        let half_width = (0.5 * cut * width as f64).floor() as usize;

        Self {
            top: row.saturating_sub(half_height),
            bottom: (row + half_height).min(height),
            left: col.saturating_sub(half_width),
            right: (col + half_width).min(width),
        }
    }

    /// Draw the center uniformly over the image and clip the box
    pub fn sample(height: usize, width: usize, ratio: f64, rng: &mut ChaCha8Rng) -> Self {
        let row = (rng.gen::<f64>() * height as f64) as usize;
        let col = (rng.gen::<f64>() * width as f64) as usize;
        Self::clipped(height, width, ratio, row, col)
    }

    pub fn height(&self) -> usize {
        self.bottom - self.top
    }

    pub fn width(&self) -> usize {
        self.right - self.left
    }

    pub fn area(&self) -> usize {
        self.height() * self.width()
    }

    /// `1 - area / (height * width)`: share of each image left untouched
    pub fn kept_fraction(&self, height: usize, width: usize) -> f64 {
        let total = (height * width) as f64;
        if total == 0.0 {
            return 1.0;
        }
        1.0 - self.area() as f64 / total
    }
}

#[derive(Debug, Clone)]
pub struct CutMix {
    policy: MixingPolicy,
}

impl CutMix {
    pub fn new(policy: MixingPolicy) -> Self {
        Self { policy }
    }
}

impl MixingOperator for CutMix {
    fn name(&self) -> &'static str {
        "CutMix"
    }

    fn policy(&self) -> &MixingPolicy {
        &self.policy
    }

    fn apply(&self, batch: ImageBatch, target: Target, rng: &mut ChaCha8Rng) -> Result<Mixed> {
        if self.policy.should_skip(rng) {
            return Ok(Mixed::skipped(batch, target));
        }
        check_lengths(&batch, &target)?;

        let target = target.to_soft(self.policy.num_classes())?;
        let ratio = self.policy.sample_ratio(rng);

        let [n, c, h, w] = batch.shape();
        let cut = CutBox::sample(h, w, ratio, rng);
        let keep = cut.kept_fraction(h, w);
        trace!("CutMix ratio {:.4}, box {:?}, kept {:.4}", ratio, cut, keep);

        // The partner copy is taken before any pixel is overwritten.
        let partner = batch.rolled();
        let mut batch = batch;
        let data = batch.data_mut();
        for plane in 0..n * c {
            for y in cut.top..cut.bottom {
                let row = plane * h * w + y * w;
                let span = row + cut.left..row + cut.right;
                data[span.clone()].copy_from_slice(&partner.data()[span]);
            }
        }

        let target = target.mix(&target.rolled(), keep as f32)?;

        Ok(Mixed {
            batch,
            target,
            applied: true,
        })
    }
}
