//! Batch mixing augmentations
//!
//! ```text
//! mixing/
//! ├── mod.rs       → MixingPolicy, MixingOperator trait
//! ├── mixup.rs     → pairwise interpolation of whole images
//! ├── cutmix.rs    → region swap between paired images
//! └── selector.rs  → MixPolicySelector: picks one operator per batch
//! ```
//!
//! Both operators pair sample `i` with sample `i - 1 (mod N)`, promote hard
//! labels to one-hot rows and mix the rows with the same weights used for
//! the pixels, so every target row keeps a total mass of 1.

pub mod cutmix;
pub mod mixup;
pub mod selector;

pub use cutmix::{CutBox, CutMix};
pub use mixup::MixUp;
pub use selector::{default_collate, Collated, MixPolicySelector};

use std::fmt::Debug;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Beta, Distribution};

use crate::batch::{ImageBatch, Target};
use crate::utils::error::{PipelineError, Result};

/// Per-operator configuration, immutable after construction
#[derive(Debug, Clone)]
pub struct MixingPolicy {
    skip_probability: f64,
    alpha: f64,
    num_classes: usize,
    beta: Beta<f64>,
}

impl MixingPolicy {
    pub fn new(skip_probability: f64, alpha: f64, num_classes: usize) -> Result<Self> {
        if !(0.0..=1.0).contains(&skip_probability) {
            return Err(PipelineError::Config(format!(
                "mix skip probability must be in range [0.0, 1.0], got {}",
                skip_probability
            )));
        }
        if num_classes == 0 {
            return Err(PipelineError::Config(
                "num_classes must be greater than 0 for mixing".to_string(),
            ));
        }
        let beta = Beta::new(alpha, alpha).map_err(|e| {
            PipelineError::Config(format!("invalid mixing alpha {}: {}", alpha, e))
        })?;

        Ok(Self {
            skip_probability,
            alpha,
            num_classes,
            beta,
        })
    }

    pub fn skip_probability(&self) -> f64 {
        self.skip_probability
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Draw u ~ U(0, 1); the batch is left alone when `skip_probability > u`
    pub fn should_skip(&self, rng: &mut ChaCha8Rng) -> bool {
        let u: f64 = rng.gen();
        self.skip_probability > u
    }

    /// Mixing ratio `1 - x` with `x ~ Beta(alpha, alpha)`
    pub fn sample_ratio(&self, rng: &mut ChaCha8Rng) -> f64 {
        1.0 - self.beta.sample(rng)
    }
}

/// Result of one mixing call
#[derive(Debug, Clone)]
pub struct Mixed {
    pub batch: ImageBatch,
    pub target: Target,
    /// False when the skip draw left the batch untouched
    pub applied: bool,
}

impl Mixed {
    fn skipped(batch: ImageBatch, target: Target) -> Self {
        Self {
            batch,
            target,
            applied: false,
        }
    }
}

/// A batch-level transform mixing pixels and labels of paired samples
pub trait MixingOperator: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn policy(&self) -> &MixingPolicy;

    fn apply(&self, batch: ImageBatch, target: Target, rng: &mut ChaCha8Rng) -> Result<Mixed>;
}

fn check_lengths(batch: &ImageBatch, target: &Target) -> Result<()> {
    if batch.len() != target.len() {
        return Err(PipelineError::InvalidBatch(format!(
            "batch has {} images but {} targets",
            batch.len(),
            target.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::batch::{ImageBatch, Target};
    use crate::transform::ImageTensor;

    /// N constant images where image `i` holds the value `i`, labels `0..N`
    pub fn numbered_batch(n: usize, height: usize, width: usize) -> (ImageBatch, Target) {
        let samples = (0..n)
            .map(|i| {
                ImageTensor::new(vec![i as f32; 3 * height * width], 3, height, width).unwrap()
            })
            .collect();
        (
            ImageBatch::stack(samples).unwrap(),
            Target::Hard((0..n).collect()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_policy_validation() {
        assert!(MixingPolicy::new(0.5, 1.0, 10).is_ok());
        assert!(MixingPolicy::new(1.5, 1.0, 10).is_err());
        assert!(MixingPolicy::new(0.5, 0.0, 10).is_err());
        assert!(MixingPolicy::new(0.5, 1.0, 0).is_err());
    }

    #[test]
    fn test_skip_boundaries() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let always = MixingPolicy::new(1.0, 1.0, 2).unwrap();
        let never = MixingPolicy::new(0.0, 1.0, 2).unwrap();
        for _ in 0..1000 {
            assert!(always.should_skip(&mut rng));
            assert!(!never.should_skip(&mut rng));
        }
    }

    #[test]
    fn test_ratio_in_unit_interval() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let policy = MixingPolicy::new(0.0, 0.2, 2).unwrap();
        for _ in 0..1000 {
            let r = policy.sample_ratio(&mut rng);
            assert!((0.0..=1.0).contains(&r));
        }
    }
}
