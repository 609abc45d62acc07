//! In-memory grid samples and minibatch assembly.
//!
//! Datasets hold plain `f32` buffers; tensors are only materialized when a
//! batch is stacked onto a device. This keeps dataset code backend-agnostic
//! and lets validation stack the same samples on the inner backend.

use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::NcaError;
use crate::model::ChannelLayout;

/// One training example: a channels-first image and a dense target map.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSample {
    pub image: Vec<f32>,
    pub target: Vec<f32>,
    pub channels: usize,
    pub target_channels: usize,
    pub height: usize,
    pub width: usize,
}

impl GridSample {
    pub fn new(
        image: Vec<f32>,
        target: Vec<f32>,
        channels: usize,
        target_channels: usize,
        height: usize,
        width: usize,
    ) -> Result<Self, NcaError> {
        let pixels = height * width;
        if image.len() != channels * pixels {
            return Err(NcaError::dataset(format!(
                "image buffer holds {} values, expected {}x{}x{}",
                image.len(),
                channels,
                height,
                width
            )));
        }
        if target.len() != target_channels * pixels {
            return Err(NcaError::dataset(format!(
                "target buffer holds {} values, expected {}x{}x{}",
                target.len(),
                target_channels,
                height,
                width
            )));
        }
        Ok(Self {
            image,
            target,
            channels,
            target_channels,
            height,
            width,
        })
    }
}

/// A stacked minibatch on a device.
pub struct Batch<B: Backend> {
    /// `[batch, channels, h, w]` input image channels.
    pub image: Tensor<B, 4>,
    /// `[batch, target_channels, h, w]` dense target map.
    pub target: Tensor<B, 4>,
}

/// Stacks [`GridSample`]s into [`Batch`]es on a fixed device.
pub struct BatchStacker<B: Backend> {
    device: B::Device,
}

impl<B: Backend> BatchStacker<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Stack the samples at `indices` of `dataset`.
    pub fn stack<D: Dataset<GridSample>>(
        &self,
        dataset: &D,
        indices: &[usize],
    ) -> Result<Batch<B>, NcaError> {
        if indices.is_empty() {
            return Err(NcaError::dataset("cannot stack an empty batch"));
        }
        let first = dataset
            .get(indices[0])
            .ok_or_else(|| NcaError::dataset(format!("index {} out of range", indices[0])))?;
        let (c, tc, h, w) = (
            first.channels,
            first.target_channels,
            first.height,
            first.width,
        );

        let mut images = Vec::with_capacity(indices.len() * c * h * w);
        let mut targets = Vec::with_capacity(indices.len() * tc * h * w);
        for &index in indices {
            let sample = dataset
                .get(index)
                .ok_or_else(|| NcaError::dataset(format!("index {index} out of range")))?;
            if (sample.channels, sample.target_channels, sample.height, sample.width)
                != (c, tc, h, w)
            {
                return Err(NcaError::dataset(
                    "all samples in a batch must share one shape",
                ));
            }
            images.extend_from_slice(&sample.image);
            targets.extend_from_slice(&sample.target);
        }

        let n = indices.len();
        let image = Tensor::<B, 1>::from_floats(images.as_slice(), &self.device)
            .reshape([n, c, h, w]);
        let target = Tensor::<B, 1>::from_floats(targets.as_slice(), &self.device)
            .reshape([n, tc, h, w]);
        Ok(Batch { image, target })
    }
}

/// Pad image channels up to the full state layout with zeros or noise.
///
/// The input must carry exactly `layout.image` channels; hidden and output
/// channels are appended empty.
pub fn pad_input<B: Backend>(
    image: Tensor<B, 4>,
    layout: &ChannelLayout,
    noise: bool,
) -> Result<Tensor<B, 4>, NcaError> {
    let [b, c, h, w] = image.dims();
    if c == layout.total() {
        return Ok(image);
    }
    if c != layout.image {
        return Err(NcaError::invalid_input(format!(
            "input carries {c} channels, layout expects {} image channels",
            layout.image
        )));
    }
    let device = image.device();
    let pad = layout.total() - c;
    let padding = if noise {
        Tensor::random([b, pad, h, w], Distribution::Uniform(0.0, 1.0), &device)
    } else {
        Tensor::zeros([b, pad, h, w], &device)
    };
    Ok(Tensor::cat(vec![image, padding], 1))
}

/// Iterator over (optionally shuffled) minibatch index sets.
pub struct Minibatches {
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl Minibatches {
    /// Shuffled minibatches for one training epoch.
    pub fn shuffled(len: usize, batch_size: usize, rng: &mut StdRng) -> Self {
        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(rng);
        Self {
            indices,
            batch_size,
            cursor: 0,
        }
    }

    /// Sequential minibatches, for evaluation.
    pub fn sequential(len: usize, batch_size: usize) -> Self {
        Self {
            indices: (0..len).collect(),
            batch_size,
            cursor: 0,
        }
    }
}

impl Iterator for Minibatches {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.indices.len() {
            return None;
        }
        let end = usize::min(self.cursor + self.batch_size, self.indices.len());
        let batch = self.indices[self.cursor..end].to_vec();
        self.cursor = end;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::data::dataset::InMemDataset;
    use rand::SeedableRng;

    type B = NdArray;

    fn sample(value: f32) -> GridSample {
        GridSample::new(vec![value; 3 * 4 * 4], vec![value; 16], 3, 1, 4, 4).unwrap()
    }

    #[test]
    fn test_sample_shape_validation() {
        assert!(GridSample::new(vec![0.0; 10], vec![0.0; 16], 3, 1, 4, 4).is_err());
        assert!(GridSample::new(vec![0.0; 48], vec![0.0; 15], 3, 1, 4, 4).is_err());
    }

    #[test]
    fn test_stacking() {
        let dataset = InMemDataset::new(vec![sample(0.0), sample(1.0), sample(2.0)]);
        let stacker = BatchStacker::<B>::new(Default::default());
        let batch = stacker.stack(&dataset, &[0, 2]).unwrap();
        assert_eq!(batch.image.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.target.dims(), [2, 1, 4, 4]);

        let total: f32 = batch.image.sum().into_scalar();
        assert_eq!(total, 2.0 * 48.0);
    }

    #[test]
    fn test_pad_input() {
        let device = Default::default();
        let layout = ChannelLayout::new(3, 5, 1);
        let image = Tensor::<B, 4>::ones([2, 3, 4, 4], &device);
        let padded = pad_input(image, &layout, false).unwrap();
        assert_eq!(padded.dims(), [2, 9, 4, 4]);

        // Padded channels are zeros.
        let hidden: f32 = padded
            .clone()
            .slice([0..2, 3..9, 0..4, 0..4])
            .abs()
            .sum()
            .into_scalar();
        assert_eq!(hidden, 0.0);

        // Wrong channel count is rejected.
        let bad = Tensor::<B, 4>::ones([2, 4, 4, 4], &device);
        assert!(pad_input(bad, &layout, false).is_err());

        // Already padded input passes through.
        let full = pad_input(padded.clone(), &layout, false).unwrap();
        assert_eq!(full.dims(), padded.dims());
    }

    #[test]
    fn test_minibatches_cover_dataset() {
        let mut rng = StdRng::seed_from_u64(7);
        let batches: Vec<Vec<usize>> = Minibatches::shuffled(10, 4, &mut rng).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 2);

        let mut seen: Vec<usize> = batches.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }
}
