//! Batches and targets
//!
//! `ImageBatch` holds N stacked CHW samples in one contiguous buffer and
//! `Target` holds their labels, either as class indices or as per-class
//! weights. Mixing operators work on these host-side types; a finished batch
//! is converted to `burn` tensors with [`ClassificationBatch::from_parts`].

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::transform::ImageTensor;
use crate::utils::error::{PipelineError, Result};

/// A stack of images with shape `[batch, channels, height, width]`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    data: Vec<f32>,
    shape: [usize; 4],
}

impl ImageBatch {
    /// Wrap a contiguous NCHW buffer
    pub fn new(data: Vec<f32>, shape: [usize; 4]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(PipelineError::InvalidBatch(format!(
                "buffer of {} values does not match shape {:?}",
                data.len(),
                shape
            )));
        }
        Ok(Self { data, shape })
    }

    /// Stack samples along a new leading axis; all samples must share one shape
    pub fn stack(samples: Vec<ImageTensor>) -> Result<Self> {
        let first = samples
            .first()
            .ok_or_else(|| PipelineError::InvalidBatch("cannot stack an empty batch".to_string()))?;
        let [c, h, w] = first.shape();

        let mut data = Vec::with_capacity(samples.len() * c * h * w);
        for (i, sample) in samples.iter().enumerate() {
            if sample.shape() != [c, h, w] {
                return Err(PipelineError::InvalidBatch(format!(
                    "sample {} has shape {:?}, expected {:?}",
                    i,
                    sample.shape(),
                    [c, h, w]
                )));
            }
            data.extend_from_slice(&sample.data);
        }

        Ok(Self {
            data,
            shape: [samples.len(), c, h, w],
        })
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.shape[0] == 0
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Values per sample
    pub fn sample_len(&self) -> usize {
        self.shape[1] * self.shape[2] * self.shape[3]
    }

    /// Values of sample `index`
    pub fn sample(&self, index: usize) -> &[f32] {
        let n = self.sample_len();
        &self.data[index * n..(index + 1) * n]
    }

    /// Cyclic shift by one along the batch axis: sample `i` of the result is sample `i - 1`
    pub fn rolled(&self) -> Self {
        let mut data = self.data.clone();
        if !data.is_empty() {
            data.rotate_right(self.sample_len());
        }
        Self {
            data,
            shape: self.shape,
        }
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::<B, 4>::from_floats(TensorData::new(self.data.clone(), self.shape), device)
    }
}

/// Labels of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// One class index per sample
    Hard(Vec<usize>),
    /// Row-major `[batch, num_classes]` class weights; every row sums to 1
    Soft { weights: Vec<f32>, num_classes: usize },
}

impl Target {
    /// Number of samples
    pub fn len(&self) -> usize {
        match self {
            Target::Hard(labels) => labels.len(),
            Target::Soft {
                weights,
                num_classes,
            } => weights.len() / (*num_classes).max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_soft(&self) -> bool {
        matches!(self, Target::Soft { .. })
    }

    /// Promote hard labels to one-hot rows; soft targets are returned unchanged
    pub fn to_soft(self, num_classes: usize) -> Result<Target> {
        match self {
            Target::Soft {
                weights,
                num_classes: n,
            } => {
                if n != num_classes {
                    return Err(PipelineError::InvalidBatch(format!(
                        "soft target has {} classes, expected {}",
                        n, num_classes
                    )));
                }
                Ok(Target::Soft {
                    weights,
                    num_classes: n,
                })
            }
            Target::Hard(labels) => {
                let mut weights = vec![0.0f32; labels.len() * num_classes];
                for (row, &label) in labels.iter().enumerate() {
                    if label >= num_classes {
                        return Err(PipelineError::InvalidBatch(format!(
                            "label {} out of range for {} classes",
                            label, num_classes
                        )));
                    }
                    weights[row * num_classes + label] = 1.0;
                }
                Ok(Target::Soft {
                    weights,
                    num_classes,
                })
            }
        }
    }

    /// Cyclic shift by one row, matching [`ImageBatch::rolled`]
    pub fn rolled(&self) -> Target {
        match self {
            Target::Hard(labels) => {
                let mut labels = labels.clone();
                if !labels.is_empty() {
                    labels.rotate_right(1);
                }
                Target::Hard(labels)
            }
            Target::Soft {
                weights,
                num_classes,
            } => {
                let mut weights = weights.clone();
                if !weights.is_empty() {
                    weights.rotate_right(*num_classes);
                }
                Target::Soft {
                    weights,
                    num_classes: *num_classes,
                }
            }
        }
    }

    /// `self * keep + partner * (1 - keep)`; both targets must be soft with the same shape
    pub fn mix(&self, partner: &Target, keep: f32) -> Result<Target> {
        match (self, partner) {
            (
                Target::Soft {
                    weights,
                    num_classes,
                },
                Target::Soft {
                    weights: other,
                    num_classes: other_classes,
                },
            ) if num_classes == other_classes && weights.len() == other.len() => {
                let weights = weights
                    .iter()
                    .zip(other)
                    .map(|(a, b)| a * keep + b * (1.0 - keep))
                    .collect();
                Ok(Target::Soft {
                    weights,
                    num_classes: *num_classes,
                })
            }
            _ => Err(PipelineError::InvalidBatch(
                "targets must be soft with matching shapes to be mixed".to_string(),
            )),
        }
    }

    /// Sum of every row; 1 per sample for hard targets
    pub fn row_sums(&self) -> Vec<f32> {
        match self {
            Target::Hard(labels) => vec![1.0; labels.len()],
            Target::Soft {
                weights,
                num_classes,
            } => weights
                .chunks((*num_classes).max(1))
                .map(|row| row.iter().sum())
                .collect(),
        }
    }
}

/// Batch targets as tensors
#[derive(Debug, Clone)]
pub enum BatchTargets<B: Backend> {
    /// Class indices with shape `[batch]`
    Hard(Tensor<B, 1, Int>),
    /// Class weights with shape `[batch, num_classes]`
    Soft(Tensor<B, 2>),
}

/// A finished batch ready for a training step
#[derive(Debug, Clone)]
pub struct ClassificationBatch<B: Backend> {
    /// Images with shape `[batch, channels, height, width]`
    pub images: Tensor<B, 4>,
    pub targets: BatchTargets<B>,
}

impl<B: Backend> ClassificationBatch<B> {
    pub fn from_parts(images: &ImageBatch, target: &Target, device: &B::Device) -> Self {
        let images_tensor = images.to_tensor::<B>(device);
        let batch_size = target.len();

        let targets = match target {
            Target::Hard(labels) => {
                let data: Vec<i64> = labels.iter().map(|&l| l as i64).collect();
                BatchTargets::Hard(Tensor::<B, 1, Int>::from_data(
                    TensorData::new(data, [batch_size]),
                    device,
                ))
            }
            Target::Soft {
                weights,
                num_classes,
            } => BatchTargets::Soft(Tensor::<B, 2>::from_floats(
                TensorData::new(weights.clone(), [batch_size, *num_classes]),
                device,
            )),
        };

        Self {
            images: images_tensor,
            targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f32) -> ImageTensor {
        ImageTensor::new(vec![value; 3 * 2 * 2], 3, 2, 2).unwrap()
    }

    #[test]
    fn test_stack_shape() {
        let batch = ImageBatch::stack(vec![sample(0.0), sample(1.0), sample(2.0)]).unwrap();
        assert_eq!(batch.shape(), [3, 3, 2, 2]);
        assert_eq!(batch.len(), 3);
        assert!(batch.sample(2).iter().all(|v| *v == 2.0));
    }

    #[test]
    fn test_stack_rejects_mismatched_samples() {
        let odd = ImageTensor::new(vec![0.0; 3 * 4 * 4], 3, 4, 4).unwrap();
        assert!(ImageBatch::stack(vec![sample(0.0), odd]).is_err());
        assert!(ImageBatch::stack(Vec::new()).is_err());
    }

    #[test]
    fn test_rolled_pairs_with_previous_sample() {
        let batch = ImageBatch::stack(vec![sample(0.0), sample(1.0), sample(2.0)]).unwrap();
        let rolled = batch.rolled();
        assert!(rolled.sample(0).iter().all(|v| *v == 2.0));
        assert!(rolled.sample(1).iter().all(|v| *v == 0.0));
        assert!(rolled.sample(2).iter().all(|v| *v == 1.0));

        let target = Target::Hard(vec![7, 8, 9]).rolled();
        assert_eq!(target, Target::Hard(vec![9, 7, 8]));
    }

    #[test]
    fn test_to_soft_is_one_hot() {
        let soft = Target::Hard(vec![2, 0]).to_soft(3).unwrap();
        assert_eq!(
            soft,
            Target::Soft {
                weights: vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0],
                num_classes: 3
            }
        );
        assert_eq!(soft.len(), 2);
        assert_eq!(soft.row_sums(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_to_soft_rejects_out_of_range_label() {
        let err = Target::Hard(vec![5]).to_soft(3).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidBatch(_)));
    }

    #[test]
    fn test_mix_keeps_row_mass() {
        let a = Target::Hard(vec![0, 1]).to_soft(2).unwrap();
        let b = a.rolled();
        let mixed = a.mix(&b, 0.7).unwrap();
        for sum in mixed.row_sums() {
            assert!((sum - 1.0).abs() < 1e-6);
        }
        assert!(Target::Hard(vec![0]).mix(&Target::Hard(vec![1]), 0.5).is_err());
    }

    #[test]
    fn test_tensor_conversion() {
        type B = burn::backend::NdArray;
        let device = Default::default();

        let images = ImageBatch::stack(vec![sample(0.0), sample(1.0)]).unwrap();
        let hard = ClassificationBatch::<B>::from_parts(&images, &Target::Hard(vec![1, 0]), &device);
        assert_eq!(hard.images.dims(), [2, 3, 2, 2]);
        match hard.targets {
            BatchTargets::Hard(t) => assert_eq!(t.dims(), [2]),
            BatchTargets::Soft(_) => panic!("expected hard targets"),
        }

        let soft_target = Target::Hard(vec![1, 0]).to_soft(4).unwrap();
        let soft = ClassificationBatch::<B>::from_parts(&images, &soft_target, &device);
        match soft.targets {
            BatchTargets::Soft(t) => assert_eq!(t.dims(), [2, 4]),
            BatchTargets::Hard(_) => panic!("expected soft targets"),
        }
    }
}
