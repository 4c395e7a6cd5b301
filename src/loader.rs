//! Batch loader
//!
//! A [`DataLoader`] walks its sampler's order for one epoch in chunks of
//! `batch_size`, fetches and transforms the samples of a chunk on a rayon
//! pool and collates them on the consuming thread. The last chunk may be
//! short; it is kept.
//!
//! Randomness is derived, never shared: the sample at position `p` of epoch
//! `e` is transformed with stream `p` of `ChaCha8Rng(seed + e)` and the
//! collate step draws from stream `u64::MAX` of the same generator, so a
//! batch is identical whatever the number of workers.

use std::sync::Arc;

use burn::prelude::Backend;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::batch::{ClassificationBatch, ImageBatch, Target};
use crate::dataset::ImageDataset;
use crate::mixing::{default_collate, MixPolicySelector};
use crate::sampler::Sampler;
use crate::transform::{ImageTensor, SampleTransform};
use crate::utils::error::{PipelineError, Result};
use crate::utils::logging::BatchProgress;

const COLLATE_STREAM: u64 = u64::MAX;

fn epoch_rng(seed: u64, epoch: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch));
    rng.set_stream(stream);
    rng
}

/// One batch as handed to the training loop
#[derive(Debug, Clone)]
pub struct LoadedBatch {
    /// Position of the batch within its epoch
    pub index: usize,
    pub images: ImageBatch,
    pub target: Target,
    /// Mixing operator applied to this batch, if any
    pub mixed_by: Option<&'static str>,
}

impl LoadedBatch {
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> ClassificationBatch<B> {
        ClassificationBatch::from_parts(&self.images, &self.target, device)
    }
}

pub struct DataLoader {
    name: &'static str,
    dataset: Arc<dyn ImageDataset>,
    transform: Arc<dyn SampleTransform>,
    sampler: Box<dyn Sampler>,
    mixing: Option<Arc<MixPolicySelector>>,
    batch_size: usize,
    seed: u64,
    pool: Option<ThreadPool>,
}

impl std::fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("name", &self.name)
            .field("samples", &self.sampler.len())
            .field("batch_size", &self.batch_size)
            .field("batches", &self.len())
            .field("workers", &self.num_workers())
            .field("mixing", &self.mixing.as_ref().map(|m| m.names()))
            .finish()
    }
}

impl DataLoader {
    /// Create a loader; `num_workers == 0` fetches on the consuming thread
    pub fn new(
        name: &'static str,
        dataset: Arc<dyn ImageDataset>,
        transform: Arc<dyn SampleTransform>,
        sampler: Box<dyn Sampler>,
        batch_size: usize,
        num_workers: usize,
        seed: u64,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(PipelineError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        let pool = if num_workers > 0 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(num_workers)
                .thread_name(move |i| format!("{}-loader-{}", name, i))
                .build()
                .map_err(|e| {
                    PipelineError::Config(format!("failed to start {} loader workers: {}", name, e))
                })?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            name,
            dataset,
            transform,
            sampler,
            mixing: None,
            batch_size,
            seed,
            pool,
        })
    }

    /// Use the mixing collate instead of the structural one
    pub fn with_mixing(mut self, selector: Arc<MixPolicySelector>) -> Self {
        self.mixing = (!selector.is_empty()).then_some(selector);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Batches per epoch: `ceil(samples / batch_size)`
    pub fn len(&self) -> usize {
        self.sampler.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_workers(&self) -> usize {
        self.pool.as_ref().map_or(0, |p| p.current_num_threads())
    }

    pub fn is_mixing(&self) -> bool {
        self.mixing.is_some()
    }

    pub fn dataset(&self) -> &Arc<dyn ImageDataset> {
        &self.dataset
    }

    /// Iterate the batches of `epoch`
    pub fn iter(&self, epoch: u64) -> BatchIter<'_> {
        let indices = self.sampler.indices(epoch);
        debug!(
            "[{}] epoch {}: {} samples in {} batches",
            self.name,
            epoch,
            indices.len(),
            self.len()
        );

        BatchIter {
            loader: self,
            epoch,
            indices,
            next_batch: 0,
            collate_rng: epoch_rng(self.seed, epoch, COLLATE_STREAM),
            progress: BatchProgress::new(self.name, epoch as usize, self.len()),
            done: false,
        }
    }

    fn fetch(&self, epoch: u64, position: usize, index: usize) -> Result<(ImageTensor, usize)> {
        let (image, label) = self.dataset.get(index)?;
        let mut rng = epoch_rng(self.seed, epoch, position as u64);
        let tensor = self.transform.apply(image, &mut rng)?;
        Ok((tensor, label))
    }

    fn fetch_chunk(&self, epoch: u64, start: usize, chunk: &[usize]) -> Result<Vec<(ImageTensor, usize)>> {
        match &self.pool {
            Some(pool) => pool.install(|| {
                chunk
                    .par_iter()
                    .enumerate()
                    .map(|(offset, &index)| self.fetch(epoch, start + offset, index))
                    .collect()
            }),
            None => chunk
                .iter()
                .enumerate()
                .map(|(offset, &index)| self.fetch(epoch, start + offset, index))
                .collect(),
        }
    }
}

/// Batches of one epoch
///
/// The first error ends the iteration after it is returned.
pub struct BatchIter<'a> {
    loader: &'a DataLoader,
    epoch: u64,
    indices: Vec<usize>,
    next_batch: usize,
    collate_rng: ChaCha8Rng,
    progress: BatchProgress,
    done: bool,
}

impl BatchIter<'_> {
    fn load(&mut self, start: usize, end: usize) -> Result<LoadedBatch> {
        let samples = self
            .loader
            .fetch_chunk(self.epoch, start, &self.indices[start..end])?;

        let (images, target, mixed_by) = match &self.loader.mixing {
            Some(selector) => {
                let collated = selector.collate(samples, &mut self.collate_rng)?;
                (collated.images, collated.target, collated.mixed_by)
            }
            None => {
                let (images, target) = default_collate(samples)?;
                (images, target, None)
            }
        };

        Ok(LoadedBatch {
            index: self.next_batch,
            images,
            target,
            mixed_by,
        })
    }
}

impl Iterator for BatchIter<'_> {
    type Item = Result<LoadedBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let start = self.next_batch * self.loader.batch_size;
        if start >= self.indices.len() {
            self.done = true;
            self.progress.finish();
            return None;
        }
        let end = (start + self.loader.batch_size).min(self.indices.len());

        let result = self.load(start, end);
        self.next_batch += 1;
        match &result {
            Ok(batch) => self.progress.record(batch.mixed_by.is_some()),
            Err(e) => {
                warn!("[{}] epoch {} stopped: {}", self.loader.name, self.epoch, e);
                self.done = true;
            }
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = self.loader.len().saturating_sub(self.next_batch);
        (0, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataConfig;
    use crate::dataset::{InMemoryDataset, PixelLayout};
    use crate::sampler::{RandomSampler, SequentialSampler};
    use crate::transform::{EvalTransform, TrainTransform, TransformSpec};
    use image::DynamicImage;

    fn dataset(n: usize) -> Arc<dyn ImageDataset> {
        let pixels: Vec<u8> = (0..n).flat_map(|i| vec![(i * 10) as u8; 8 * 8 * 3]).collect();
        let labels = (0..n).map(|i| i % 3).collect();
        let classes = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        Arc::new(InMemoryDataset::new(8, 8, PixelLayout::Rgb, pixels, labels, classes).unwrap())
    }

    fn small_config() -> DataConfig {
        DataConfig {
            train_size: crate::config::ImageSize::Square(8),
            test_size: crate::config::ImageSize::Square(8),
            train_resize_mode: "ResizeRandomCrop".to_string(),
            test_resize_mode: "fixed".to_string(),
            center_crop_ptr: 1.0,
            num_classes: 3,
            ..DataConfig::default()
        }
    }

    fn eval_transform() -> Arc<dyn SampleTransform> {
        let spec = TransformSpec::from_config(&small_config()).unwrap();
        Arc::new(EvalTransform::build(&spec).unwrap())
    }

    /// Fails on one index
    struct Flaky {
        inner: Arc<dyn ImageDataset>,
        bad: usize,
    }

    impl ImageDataset for Flaky {
        fn len(&self) -> usize {
            self.inner.len()
        }

        fn get(&self, index: usize) -> Result<(DynamicImage, usize)> {
            if index == self.bad {
                return Err(PipelineError::Dataset(format!("sample {} unreadable", index)));
            }
            self.inner.get(index)
        }

        fn classes(&self) -> &[String] {
            self.inner.classes()
        }
    }

    #[test]
    fn test_keeps_last_partial_batch() {
        let loader = DataLoader::new(
            "eval",
            dataset(10),
            eval_transform(),
            Box::new(SequentialSampler::new(10)),
            4,
            0,
            0,
        )
        .unwrap();
        assert_eq!(loader.len(), 3);

        let batches: Vec<LoadedBatch> = loader.iter(0).map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].images.shape(), [4, 3, 8, 8]);
        assert_eq!(batches[2].images.shape(), [2, 3, 8, 8]);
        assert_eq!(batches[2].target, Target::Hard(vec![2, 0]));
        assert!(batches.iter().all(|b| b.mixed_by.is_none()));
    }

    #[test]
    fn test_worker_count_does_not_change_batches() {
        let spec = TransformSpec::from_config(&small_config()).unwrap();
        let transform: Arc<dyn SampleTransform> = Arc::new(TrainTransform::build(&spec).unwrap());

        let make = |workers| {
            DataLoader::new(
                "train",
                dataset(9),
                transform.clone(),
                Box::new(RandomSampler::new(9, 3)),
                4,
                workers,
                3,
            )
            .unwrap()
        };

        let serial: Vec<LoadedBatch> = make(0).iter(1).map(|b| b.unwrap()).collect();
        let parallel: Vec<LoadedBatch> = make(3).iter(1).map(|b| b.unwrap()).collect();
        assert_eq!(serial.len(), parallel.len());
        for (a, b) in serial.iter().zip(&parallel) {
            assert_eq!(a.images, b.images);
            assert_eq!(a.target, b.target);
        }
    }

    #[test]
    fn test_mixing_collate_produces_soft_targets() {
        let config = DataConfig {
            mixup: 1.0,
            cutmix: 1.0,
            mix_skip_prob: 0.0,
            ..small_config()
        };
        let selector = Arc::new(MixPolicySelector::from_config(&config).unwrap());
        let loader = DataLoader::new(
            "train",
            dataset(6),
            eval_transform(),
            Box::new(RandomSampler::new(6, 0)),
            3,
            2,
            0,
        )
        .unwrap()
        .with_mixing(selector);
        assert!(loader.is_mixing());

        for batch in loader.iter(0) {
            let batch = batch.unwrap();
            assert!(batch.target.is_soft());
            assert!(batch.mixed_by.is_some());
            for sum in batch.target.row_sums() {
                assert!((sum - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_fetch_error_reaches_consumer_and_ends_epoch() {
        let flaky: Arc<dyn ImageDataset> = Arc::new(Flaky {
            inner: dataset(8),
            bad: 5,
        });
        let loader = DataLoader::new(
            "train",
            flaky,
            eval_transform(),
            Box::new(SequentialSampler::new(8)),
            2,
            2,
            0,
        )
        .unwrap();

        let results: Vec<Result<LoadedBatch>> = loader.iter(0).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok() && results[1].is_ok());
        assert!(matches!(results[2], Err(PipelineError::Dataset(_))));
    }

    #[test]
    fn test_tensor_conversion() {
        let loader = DataLoader::new(
            "eval",
            dataset(2),
            eval_transform(),
            Box::new(SequentialSampler::new(2)),
            2,
            0,
            0,
        )
        .unwrap();
        let batch = loader.iter(0).next().unwrap().unwrap();
        let tensors = batch.to_tensors::<burn::backend::NdArray>(&Default::default());
        assert_eq!(tensors.images.dims(), [2, 3, 8, 8]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = DataLoader::new(
            "eval",
            dataset(2),
            eval_transform(),
            Box::new(SequentialSampler::new(2)),
            0,
            0,
            0,
        );
        assert!(result.is_err());
    }
}
