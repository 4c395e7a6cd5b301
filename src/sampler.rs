//! Index ordering strategies
//!
//! A sampler yields the dataset indices visited during one epoch. Local runs
//! use a seeded permutation for training and the natural order for
//! evaluation; distributed runs split one shared ordering into equally sized
//! shards, one per replica.

use std::fmt::Debug;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::config::DataConfig;
use crate::utils::error::{PipelineError, Result};

/// Produces the index order of one epoch
pub trait Sampler: Send + Sync + Debug {
    /// Indices to visit in `epoch`
    fn indices(&self, epoch: u64) -> Vec<usize>;

    /// Number of indices per epoch
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn permutation(len: usize, seed: u64, epoch: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch));
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut rng);
    indices
}

/// `0..len` in order
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    len: usize,
}

impl SequentialSampler {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Sampler for SequentialSampler {
    fn indices(&self, _epoch: u64) -> Vec<usize> {
        (0..self.len).collect()
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// A fresh permutation of `0..len` per epoch, seeded by `seed + epoch`
#[derive(Debug, Clone)]
pub struct RandomSampler {
    len: usize,
    seed: u64,
}

impl RandomSampler {
    pub fn new(len: usize, seed: u64) -> Self {
        Self { len, seed }
    }
}

impl Sampler for RandomSampler {
    fn indices(&self, epoch: u64) -> Vec<usize> {
        permutation(self.len, self.seed, epoch)
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// One shard of a dataset split across `num_replicas` processes
///
/// The ordering is padded by wrapping around to a multiple of
/// `num_replicas`, so every shard has `ceil(len / num_replicas)` indices.
/// Shard `rank` takes every `num_replicas`-th index starting at `rank`.
#[derive(Debug, Clone)]
pub struct DistributedSampler {
    dataset_len: usize,
    num_replicas: usize,
    rank: usize,
    shuffle: bool,
    seed: u64,
}

impl DistributedSampler {
    pub fn new(
        dataset_len: usize,
        num_replicas: usize,
        rank: usize,
        shuffle: bool,
        seed: u64,
    ) -> Result<Self> {
        if num_replicas == 0 {
            return Err(PipelineError::Config(
                "num_replicas must be greater than 0".to_string(),
            ));
        }
        if rank >= num_replicas {
            return Err(PipelineError::ShardOutOfRange { rank, num_replicas });
        }

        Ok(Self {
            dataset_len,
            num_replicas,
            rank,
            shuffle,
            seed,
        })
    }

    /// Padded length of the shared ordering
    pub fn total_size(&self) -> usize {
        self.len() * self.num_replicas
    }
}

impl Sampler for DistributedSampler {
    fn indices(&self, epoch: u64) -> Vec<usize> {
        if self.dataset_len == 0 {
            return Vec::new();
        }

        let mut order = if self.shuffle {
            permutation(self.dataset_len, self.seed, epoch)
        } else {
            (0..self.dataset_len).collect()
        };

        let total = self.total_size();
        let mut i = 0;
        while order.len() < total {
            order.push(order[i]);
            i += 1;
        }

        order
            .into_iter()
            .skip(self.rank)
            .step_by(self.num_replicas)
            .collect()
    }

    fn len(&self) -> usize {
        self.dataset_len.div_ceil(self.num_replicas)
    }
}

/// Local or sharded sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    Local,
    Distributed { num_replicas: usize, rank: usize },
}

impl SamplingMode {
    pub fn from_config(config: &DataConfig) -> Self {
        if config.distributed {
            SamplingMode::Distributed {
                num_replicas: config.world_size,
                rank: config.rank,
            }
        } else {
            SamplingMode::Local
        }
    }
}

/// Builds the training and evaluation samplers for one run
#[derive(Debug, Clone)]
pub struct SamplerFactory {
    mode: SamplingMode,
    seed: u64,
}

impl SamplerFactory {
    pub fn new(mode: SamplingMode, seed: u64) -> Self {
        Self { mode, seed }
    }

    pub fn from_config(config: &DataConfig) -> Self {
        Self::new(SamplingMode::from_config(config), config.seed)
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    /// Shuffled order for training
    pub fn train(&self, dataset_len: usize) -> Result<Box<dyn Sampler>> {
        let sampler: Box<dyn Sampler> = match self.mode {
            SamplingMode::Local => Box::new(RandomSampler::new(dataset_len, self.seed)),
            SamplingMode::Distributed { num_replicas, rank } => Box::new(DistributedSampler::new(
                dataset_len,
                num_replicas,
                rank,
                true,
                self.seed,
            )?),
        };
        debug!("Train sampler: {:?}", sampler);
        Ok(sampler)
    }

    /// Unshuffled order for evaluation
    pub fn eval(&self, dataset_len: usize) -> Result<Box<dyn Sampler>> {
        let sampler: Box<dyn Sampler> = match self.mode {
            SamplingMode::Local => Box::new(SequentialSampler::new(dataset_len)),
            SamplingMode::Distributed { num_replicas, rank } => Box::new(DistributedSampler::new(
                dataset_len,
                num_replicas,
                rank,
                false,
                self.seed,
            )?),
        };
        debug!("Eval sampler: {:?}", sampler);
        Ok(sampler)
    }
}
