//! Segmentation NCA: per-pixel binary masks over an injected input image.

use std::collections::BTreeMap;

use burn::config::Config;
use burn::module::Module;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

use super::backbone::{NcaBackbone, NcaBackboneConfig};
use super::{ChannelLayout, MetricDirection, NcaLoss, NcaModel, ValidationMetric};
use crate::error::NcaError;

/// Configuration for [`SegmentationNca`].
#[derive(Config, Debug)]
pub struct SegmentationNcaConfig {
    #[config(default = 3)]
    pub num_image_channels: usize,
    #[config(default = 18)]
    pub num_hidden_channels: usize,
    /// Mask channels; one per binary class.
    #[config(default = 1)]
    pub num_classes: usize,
    #[config(default = 128)]
    pub hidden_dim: usize,
    #[config(default = 0.5)]
    pub fire_rate: f64,
    #[config(default = true)]
    pub pad_noise: bool,
}

impl SegmentationNcaConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SegmentationNca<B>, NcaError> {
        if self.num_classes == 0 {
            return Err(NcaError::model("segmentation needs at least one class"));
        }
        if self.num_image_channels == 0 || self.num_hidden_channels == 0 {
            return Err(NcaError::model(
                "segmentation needs image and hidden channels",
            ));
        }
        let backbone = NcaBackboneConfig::new(self.num_image_channels, self.num_hidden_channels)
            .with_num_output_channels(self.num_classes)
            .with_hidden_dim(self.hidden_dim)
            .with_fire_rate(self.fire_rate)
            .with_immutable_image(true)
            .with_pad_noise(self.pad_noise)
            .init(device);
        Ok(SegmentationNca { backbone })
    }
}

/// Dense binary prediction flavor: BCE-with-logits loss on the output
/// channels, Dice/IoU as validation metrics.
#[derive(Module, Debug)]
pub struct SegmentationNca<B: Backend> {
    backbone: NcaBackbone<B>,
}

impl<B: Backend> SegmentationNca<B> {
    fn logits(&self, state: &Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, c, h, w] = state.dims();
        let offset = self.layout().output_offset();
        state.clone().slice([0..b, offset..c, 0..h, 0..w])
    }
}

/// Numerically stable binary cross-entropy on logits, averaged over cells.
fn bce_with_logits<B: Backend>(logits: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    let softplus = (logits.clone().abs().neg().exp().add_scalar(1.0)).log();
    (relu(logits.clone()) - logits * target + softplus).mean()
}

impl<B: Backend> NcaModel<B> for SegmentationNca<B> {
    fn layout(&self) -> ChannelLayout {
        self.backbone.layout()
    }

    fn pad_noise(&self) -> bool {
        self.backbone.pad_noise()
    }

    fn input_frozen(&self) -> bool {
        true
    }

    fn step(&self, state: Tensor<B, 4>) -> Tensor<B, 4> {
        self.backbone.step(state)
    }

    fn loss(&self, state: Tensor<B, 4>, target: Tensor<B, 4>) -> NcaLoss<B> {
        let bce = bce_with_logits(self.logits(&state), target);
        NcaLoss::single("bce", bce)
    }

    fn metrics(&self, state: Tensor<B, 4>, target: Tensor<B, 4>) -> BTreeMap<String, f64> {
        let logits = self.logits(&state);
        let bce: f64 = bce_with_logits(logits.clone(), target.clone())
            .into_scalar()
            .elem();

        let predicted = sigmoid(logits).greater_elem(0.5).float();
        let tp: f64 = (predicted.clone() * target.clone())
            .sum()
            .into_scalar()
            .elem();
        let predicted_area: f64 = predicted.sum().into_scalar().elem();
        let target_area: f64 = target.sum().into_scalar().elem();

        let dice = (2.0 * tp + 1e-8) / (predicted_area + target_area + 1e-8);
        let iou = (tp + 1e-8) / (predicted_area + target_area - tp + 1e-8);

        BTreeMap::from([
            ("bce".to_string(), bce),
            ("dice".to_string(), dice),
            ("iou".to_string(), iou),
        ])
    }

    fn validation_metric(&self) -> ValidationMetric {
        ValidationMetric {
            name: "dice",
            direction: MetricDirection::Higher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_metrics_on_perfect_prediction() {
        let device = Default::default();
        let nca = SegmentationNcaConfig::new()
            .with_num_hidden_channels(4)
            .with_hidden_dim(16)
            .init::<B>(&device)
            .unwrap();

        // Output channel strongly positive everywhere, target all ones.
        let c = nca.layout().total();
        let state = Tensor::<B, 4>::zeros([1, c, 4, 4], &device).slice_assign(
            [0..1, c - 1..c, 0..4, 0..4],
            Tensor::ones([1, 1, 4, 4], &device) * 10.0,
        );
        let target = Tensor::<B, 4>::ones([1, 1, 4, 4], &device);

        let metrics = nca.metrics(state, target);
        assert!(metrics["dice"] > 0.99);
        assert!(metrics["iou"] > 0.99);
        assert!(metrics["bce"] < 1e-3);
    }

    #[test]
    fn test_bce_penalizes_wrong_prediction() {
        let device = Default::default();
        let logits = Tensor::<B, 4>::ones([1, 1, 2, 2], &device) * 5.0;
        let hit = bce_with_logits(logits.clone(), Tensor::ones([1, 1, 2, 2], &device));
        let miss = bce_with_logits(logits, Tensor::zeros([1, 1, 2, 2], &device));
        let hit: f32 = hit.into_scalar();
        let miss: f32 = miss.into_scalar();
        assert!(hit < miss);
    }
}
