//! Collate step: stack samples, then apply at most one mixing operator

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::batch::{ImageBatch, Target};
use crate::config::DataConfig;
use crate::mixing::{CutMix, MixUp, MixingOperator, MixingPolicy};
use crate::transform::ImageTensor;
use crate::utils::error::Result;

/// A collated batch
#[derive(Debug, Clone)]
pub struct Collated {
    pub images: ImageBatch,
    pub target: Target,
    /// Name of the operator that mixed this batch, if any
    pub mixed_by: Option<&'static str>,
}

/// Stack images and keep labels as hard targets
pub fn default_collate(samples: Vec<(ImageTensor, usize)>) -> Result<(ImageBatch, Target)> {
    let (images, labels): (Vec<_>, Vec<_>) = samples.into_iter().unzip();
    Ok((ImageBatch::stack(images)?, Target::Hard(labels)))
}

/// Picks one configured operator uniformly per batch
#[derive(Debug, Default)]
pub struct MixPolicySelector {
    operators: Vec<Box<dyn MixingOperator>>,
}

impl MixPolicySelector {
    pub fn new(operators: Vec<Box<dyn MixingOperator>>) -> Self {
        Self { operators }
    }

    /// MixUp when `mixup > 0`, CutMix when `cutmix > 0`, each with its own alpha
    pub fn from_config(config: &DataConfig) -> Result<Self> {
        let mut operators: Vec<Box<dyn MixingOperator>> = Vec::new();

        if config.mixup > 0.0 {
            let policy = MixingPolicy::new(config.mix_skip_prob, config.mixup, config.num_classes)?;
            operators.push(Box::new(MixUp::new(policy)));
        }
        if config.cutmix > 0.0 {
            let policy =
                MixingPolicy::new(config.mix_skip_prob, config.cutmix, config.num_classes)?;
            operators.push(Box::new(CutMix::new(policy)));
        }

        let selector = Self::new(operators);
        if selector.is_empty() {
            info!("Batch mixing disabled");
        } else {
            info!(
                "Batch mixing: {} (skip probability {}, {} classes)",
                selector.names().join(" | "),
                config.mix_skip_prob,
                config.num_classes
            );
        }
        Ok(selector)
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.operators.iter().map(|op| op.name()).collect()
    }

    pub fn operators(&self) -> &[Box<dyn MixingOperator>] {
        &self.operators
    }

    /// Stack the samples and mix them with one randomly chosen operator
    pub fn collate(
        &self,
        samples: Vec<(ImageTensor, usize)>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Collated> {
        let (images, target) = default_collate(samples)?;

        if self.operators.is_empty() {
            return Ok(Collated {
                images,
                target,
                mixed_by: None,
            });
        }

        let operator = &self.operators[rng.gen_range(0..self.operators.len())];
        let mixed = operator.apply(images, target, rng)?;

        Ok(Collated {
            images: mixed.batch,
            target: mixed.target,
            mixed_by: mixed.applied.then(|| operator.name()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn samples(n: usize) -> Vec<(ImageTensor, usize)> {
        (0..n)
            .map(|i| {
                (
                    ImageTensor::new(vec![i as f32; 3 * 4 * 4], 3, 4, 4).unwrap(),
                    i % 3,
                )
            })
            .collect()
    }

    #[test]
    fn test_no_operators_is_structural_collate() {
        let selector = MixPolicySelector::from_config(&DataConfig::default()).unwrap();
        assert!(selector.is_empty());

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let collated = selector.collate(samples(4), &mut rng).unwrap();
        assert_eq!(collated.images.shape(), [4, 3, 4, 4]);
        assert_eq!(collated.target, Target::Hard(vec![0, 1, 2, 0]));
        assert!(collated.mixed_by.is_none());
    }

    #[test]
    fn test_each_operator_gets_its_own_alpha() {
        let config = DataConfig {
            mixup: 0.2,
            cutmix: 1.0,
            num_classes: 3,
            ..DataConfig::default()
        };
        let selector = MixPolicySelector::from_config(&config).unwrap();
        assert_eq!(selector.names(), vec!["MixUp", "CutMix"]);
        assert_eq!(selector.operators()[0].policy().alpha(), 0.2);
        assert_eq!(selector.operators()[1].policy().alpha(), 1.0);
        assert_eq!(selector.operators()[1].policy().skip_probability(), 0.5);
    }

    #[test]
    fn test_choice_redrawn_per_batch() {
        let config = DataConfig {
            mixup: 1.0,
            cutmix: 1.0,
            mix_skip_prob: 0.0,
            num_classes: 3,
            ..DataConfig::default()
        };
        let selector = MixPolicySelector::from_config(&config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let mut seen_mixup = false;
        let mut seen_cutmix = false;
        for _ in 0..100 {
            let collated = selector.collate(samples(4), &mut rng).unwrap();
            assert!(collated.target.is_soft());
            for sum in collated.target.row_sums() {
                assert!((sum - 1.0).abs() < 1e-5);
            }
            match collated.mixed_by {
                Some("MixUp") => seen_mixup = true,
                Some("CutMix") => seen_cutmix = true,
                other => panic!("unexpected operator {:?}", other),
            }
        }
        assert!(seen_mixup && seen_cutmix);
    }

    #[test]
    fn test_skipped_batch_keeps_hard_targets() {
        let config = DataConfig {
            mixup: 1.0,
            mix_skip_prob: 1.0,
            num_classes: 3,
            ..DataConfig::default()
        };
        let selector = MixPolicySelector::from_config(&config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let collated = selector.collate(samples(2), &mut rng).unwrap();
        assert!(!collated.target.is_soft());
        assert!(collated.mixed_by.is_none());
    }
}
