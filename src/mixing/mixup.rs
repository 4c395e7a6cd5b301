//! MixUp: blend every image with its neighbour in the batch

use rand_chacha::ChaCha8Rng;
use tracing::trace;

use crate::batch::{ImageBatch, Target};
use crate::mixing::{check_lengths, Mixed, MixingOperator, MixingPolicy};
use crate::utils::error::Result;

#[derive(Debug, Clone)]
pub struct MixUp {
    policy: MixingPolicy,
}

impl MixUp {
    pub fn new(policy: MixingPolicy) -> Self {
        Self { policy }
    }
}

impl MixingOperator for MixUp {
    fn name(&self) -> &'static str {
        "MixUp"
    }

    fn policy(&self) -> &MixingPolicy {
        &self.policy
    }

    /// `batch * (1 - r) + rolled * r`, and the same for the targets
    fn apply(&self, batch: ImageBatch, target: Target, rng: &mut ChaCha8Rng) -> Result<Mixed> {
        if self.policy.should_skip(rng) {
            return Ok(Mixed::skipped(batch, target));
        }
        check_lengths(&batch, &target)?;

        let target = target.to_soft(self.policy.num_classes())?;
        let ratio = self.policy.sample_ratio(rng) as f32;
        trace!("MixUp ratio {:.4}", ratio);

        let partner = batch.rolled();
        let mut batch = batch;
        for (v, p) in batch.data_mut().iter_mut().zip(partner.data()) {
            *v = *v * (1.0 - ratio) + p * ratio;
        }

        let target = target.mix(&target.rolled(), 1.0 - ratio)?;

        Ok(Mixed {
            batch,
            target,
            applied: true,
        })
    }
}
