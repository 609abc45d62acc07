//! NCA model flavors and the shared update-rule backbone.
//!
//! Every flavor (growing, classification, segmentation, depth) wraps the
//! same [`NcaBackbone`] and differs only in channel layout, loss and
//! metrics. The trainer talks to all of them through [`NcaModel`].

pub mod backbone;
pub mod cascade;
pub mod classification;
pub mod depth;
pub mod growing;
pub mod segmentation;

pub use backbone::{NcaBackbone, NcaBackboneConfig};
pub use cascade::Cascade;
pub use classification::{ClassificationNca, ClassificationNcaConfig};
pub use depth::{DepthNca, DepthNcaConfig};
pub use growing::{GrowingNca, GrowingNcaConfig};
pub use segmentation::{SegmentationNca, SegmentationNcaConfig};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::NcaError;

/// Per-cell channel layout of a grid state.
///
/// The channel axis is ordered `[image | hidden | output]`. Image channels
/// carry the visible input (or the generated image for growing tasks),
/// hidden channels are free cell memory, output channels hold predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub image: usize,
    pub hidden: usize,
    pub output: usize,
}

impl ChannelLayout {
    pub fn new(image: usize, hidden: usize, output: usize) -> Self {
        Self {
            image,
            hidden,
            output,
        }
    }

    /// Total number of state channels.
    pub fn total(&self) -> usize {
        self.image + self.hidden + self.output
    }

    /// Index of the first output channel.
    pub fn output_offset(&self) -> usize {
        self.image + self.hidden
    }
}

/// Whether a validation metric improves upwards or downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    Higher,
    Lower,
}

impl MetricDirection {
    /// True when `candidate` improves on `best` by more than `min_delta`.
    pub fn improved(&self, best: Option<f64>, candidate: f64, min_delta: f64) -> bool {
        match (self, best) {
            (_, None) => candidate.is_finite(),
            (MetricDirection::Higher, Some(best)) => candidate > best + min_delta,
            (MetricDirection::Lower, Some(best)) => candidate < best - min_delta,
        }
    }
}

/// The metric a flavor wants monitored during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationMetric {
    pub name: &'static str,
    pub direction: MetricDirection,
}

/// Loss bundle returned by [`NcaModel::loss`]: the differentiable total
/// plus named per-term scalars for run logging.
pub struct NcaLoss<B: Backend> {
    pub total: Tensor<B, 1>,
    pub terms: Vec<(String, f64)>,
}

impl<B: Backend> NcaLoss<B> {
    /// Bundle with a single named term equal to the total.
    pub fn single(name: &str, total: Tensor<B, 1>) -> Self {
        let value: f64 = total.clone().into_scalar().elem();
        Self {
            total,
            terms: vec![(name.to_string(), value)],
        }
    }

    /// Scalar value of the total loss.
    pub fn total_value(&self) -> f64 {
        self.total.clone().into_scalar().elem()
    }
}

/// The seam between model flavors and the trainer.
pub trait NcaModel<B: Backend> {
    /// Channel layout of the grid state this model operates on.
    fn layout(&self) -> ChannelLayout;

    /// Whether hidden/output padding uses uniform noise instead of zeros.
    fn pad_noise(&self) -> bool {
        true
    }

    /// Whether the image channels are injected input the rule never edits.
    fn input_frozen(&self) -> bool {
        false
    }

    /// One CA update. Preserves the state shape `[batch, total, h, w]`.
    fn step(&self, state: Tensor<B, 4>) -> Tensor<B, 4>;

    /// Iterate [`NcaModel::step`] `steps` times.
    fn forward(&self, state: Tensor<B, 4>, steps: usize) -> Tensor<B, 4> {
        let mut state = state;
        for _ in 0..steps {
            state = self.step(state);
        }
        state
    }

    /// Flavor loss on a rolled-out state against a dense target map.
    fn loss(&self, state: Tensor<B, 4>, target: Tensor<B, 4>) -> NcaLoss<B>;

    /// Flavor metrics on a rolled-out state against a dense target map.
    fn metrics(&self, state: Tensor<B, 4>, target: Tensor<B, 4>) -> BTreeMap<String, f64>;

    /// The metric monitored for best-model tracking and early stopping.
    fn validation_metric(&self) -> ValidationMetric;
}

/// Save module weights next to `path` (a `.bin` extension is applied).
pub fn save_weights<B: Backend, M: Module<B>>(model: &M, path: &Path) -> Result<PathBuf, NcaError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|e| NcaError::Checkpoint(format!("saving {}: {e}", path.display())))?;
    Ok(path.with_extension("bin"))
}

/// Load module weights saved by [`save_weights`] into `model`.
pub fn load_weights<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> Result<M, NcaError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| NcaError::Checkpoint(format!("loading {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_layout() {
        let layout = ChannelLayout::new(4, 12, 0);
        assert_eq!(layout.total(), 16);
        assert_eq!(layout.output_offset(), 16);

        let layout = ChannelLayout::new(3, 18, 1);
        assert_eq!(layout.total(), 22);
        assert_eq!(layout.output_offset(), 21);
    }

    #[test]
    fn test_metric_direction() {
        let up = MetricDirection::Higher;
        assert!(up.improved(None, 0.1, 0.0));
        assert!(up.improved(Some(0.5), 0.6, 0.0));
        assert!(!up.improved(Some(0.5), 0.5, 0.0));
        assert!(!up.improved(Some(0.5), 0.59, 0.1));

        let down = MetricDirection::Lower;
        assert!(down.improved(Some(0.5), 0.4, 0.0));
        assert!(!down.improved(Some(0.5), 0.6, 0.0));
        assert!(!down.improved(None, f64::NAN, 0.0));
    }
}
