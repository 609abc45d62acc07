//! Self-classifying NCA: every foreground cell votes for a class.

use std::collections::BTreeMap;

use burn::config::Config;
use burn::module::Module;
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

use super::backbone::{NcaBackbone, NcaBackboneConfig};
use super::{ChannelLayout, MetricDirection, NcaLoss, NcaModel, ValidationMetric};
use crate::error::NcaError;

/// Configuration for [`ClassificationNca`].
#[derive(Config, Debug)]
pub struct ClassificationNcaConfig {
    pub num_classes: usize,
    #[config(default = 1)]
    pub num_image_channels: usize,
    #[config(default = 9)]
    pub num_hidden_channels: usize,
    #[config(default = 128)]
    pub hidden_dim: usize,
    #[config(default = 0.5)]
    pub fire_rate: f64,
    #[config(default = true)]
    pub pad_noise: bool,
    /// Mean image intensity above which a cell counts as foreground.
    #[config(default = 0.1)]
    pub foreground_threshold: f64,
}

impl ClassificationNcaConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ClassificationNca<B>, NcaError> {
        if self.num_classes < 2 {
            return Err(NcaError::model("classification needs at least two classes"));
        }
        if self.num_image_channels == 0 || self.num_hidden_channels == 0 {
            return Err(NcaError::model(
                "classification needs image and hidden channels",
            ));
        }
        let backbone = NcaBackboneConfig::new(self.num_image_channels, self.num_hidden_channels)
            .with_num_output_channels(self.num_classes)
            .with_hidden_dim(self.hidden_dim)
            .with_fire_rate(self.fire_rate)
            .with_immutable_image(true)
            .with_pad_noise(self.pad_noise)
            .init(device);
        Ok(ClassificationNca {
            backbone,
            foreground_threshold: self.foreground_threshold,
        })
    }
}

/// Classification flavor. Targets are dense label maps: every cell of a
/// sample carries the sample's class index, and loss/metrics only count
/// foreground cells (mean image intensity above the threshold).
#[derive(Module, Debug)]
pub struct ClassificationNca<B: Backend> {
    backbone: NcaBackbone<B>,
    foreground_threshold: f64,
}

impl<B: Backend> ClassificationNca<B> {
    fn logits(&self, state: &Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, c, h, w] = state.dims();
        let offset = self.layout().output_offset();
        state.clone().slice([0..b, offset..c, 0..h, 0..w])
    }

    /// Foreground mask `[b, 1, h, w]` from the injected image channels.
    fn foreground(&self, state: &Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, _c, h, w] = state.dims();
        let img = self.layout().image;
        state
            .clone()
            .slice([0..b, 0..img, 0..h, 0..w])
            .mean_dim(1)
            .greater_elem(self.foreground_threshold)
            .float()
    }

    /// One-hot encode a dense label map `[b, 1, h, w]` to `[b, k, h, w]`.
    fn one_hot(&self, target: &Tensor<B, 4>) -> Tensor<B, 4> {
        let classes = self.layout().output;
        let planes: Vec<Tensor<B, 4>> = (0..classes)
            .map(|class| target.clone().equal_elem(class as f64).float())
            .collect();
        Tensor::cat(planes, 1)
    }
}

impl<B: Backend> NcaModel<B> for ClassificationNca<B> {
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
        let mask = self.foreground(&state);
        let log_probs = log_softmax(self.logits(&state), 1);
        let one_hot = self.one_hot(&target);

        // Per-cell cross-entropy, averaged over foreground cells.
        let per_cell = (one_hot * log_probs).sum_dim(1).neg() * mask.clone();
        let total = per_cell.sum() / mask.sum().add_scalar(1e-8);
        NcaLoss::single("cross_entropy", total)
    }

    fn metrics(&self, state: Tensor<B, 4>, target: Tensor<B, 4>) -> BTreeMap<String, f64> {
        let mask = self.foreground(&state);
        let predicted = self.logits(&state).argmax(1).float();
        let hits = predicted.equal(target).float() * mask.clone();

        let foreground: f64 = mask.sum().into_scalar().elem();
        let correct: f64 = hits.sum().into_scalar().elem();
        let accuracy = if foreground > 0.0 {
            correct / foreground
        } else {
            0.0
        };
        BTreeMap::from([("accuracy".to_string(), accuracy)])
    }

    fn validation_metric(&self) -> ValidationMetric {
        ValidationMetric {
            name: "accuracy",
            direction: MetricDirection::Higher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn model(device: &<B as Backend>::Device) -> ClassificationNca<B> {
        ClassificationNcaConfig::new(3)
            .with_num_hidden_channels(4)
            .with_hidden_dim(16)
            .init::<B>(device)
            .unwrap()
    }

    #[test]
    fn test_rejects_single_class() {
        let device = Default::default();
        assert!(ClassificationNcaConfig::new(1).init::<B>(&device).is_err());
    }

    #[test]
    fn test_accuracy_on_confident_logits() {
        let device = Default::default();
        let nca = model(&device);
        let c = nca.layout().total();

        // Bright input everywhere, logits peaked on class 2.
        let mut state = Tensor::<B, 4>::zeros([1, c, 4, 4], &device);
        state = state.slice_assign(
            [0..1, 0..1, 0..4, 0..4],
            Tensor::ones([1, 1, 4, 4], &device),
        );
        state = state.slice_assign(
            [0..1, c - 1..c, 0..4, 0..4],
            Tensor::ones([1, 1, 4, 4], &device) * 8.0,
        );
        let target = Tensor::<B, 4>::ones([1, 1, 4, 4], &device) * 2.0;

        let metrics = nca.metrics(state.clone(), target.clone());
        assert!(metrics["accuracy"] > 0.99);

        let loss = nca.loss(state, target);
        assert!(loss.total_value() < 0.01);
    }
}
