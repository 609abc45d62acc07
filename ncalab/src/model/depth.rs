//! Depth-estimation NCA: per-pixel regression over an injected input image.

use std::collections::BTreeMap;

use burn::config::Config;
use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

use super::backbone::{NcaBackbone, NcaBackboneConfig};
use super::{ChannelLayout, MetricDirection, NcaLoss, NcaModel, ValidationMetric};
use crate::error::NcaError;

/// Configuration for [`DepthNca`].
#[derive(Config, Debug)]
pub struct DepthNcaConfig {
    #[config(default = 3)]
    pub num_image_channels: usize,
    #[config(default = 12)]
    pub num_hidden_channels: usize,
    #[config(default = 128)]
    pub hidden_dim: usize,
    #[config(default = 0.5)]
    pub fire_rate: f64,
    #[config(default = true)]
    pub pad_noise: bool,
}

impl DepthNcaConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<DepthNca<B>, NcaError> {
        if self.num_image_channels == 0 || self.num_hidden_channels == 0 {
            return Err(NcaError::model(
                "depth estimation needs image and hidden channels",
            ));
        }
        let backbone = NcaBackboneConfig::new(self.num_image_channels, self.num_hidden_channels)
            .with_num_output_channels(1)
            .with_hidden_dim(self.hidden_dim)
            .with_fire_rate(self.fire_rate)
            .with_immutable_image(true)
            .with_pad_noise(self.pad_noise)
            .init(device);
        Ok(DepthNca { backbone })
    }
}

/// Dense regression flavor: MSE on a single output channel, RMSE monitored.
#[derive(Module, Debug)]
pub struct DepthNca<B: Backend> {
    backbone: NcaBackbone<B>,
}

impl<B: Backend> DepthNca<B> {
    fn prediction(&self, state: &Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, c, h, w] = state.dims();
        let offset = self.layout().output_offset();
        state.clone().slice([0..b, offset..c, 0..h, 0..w])
    }
}

impl<B: Backend> NcaModel<B> for DepthNca<B> {
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
        let diff = self.prediction(&state) - target;
        let mse = (diff.clone() * diff).mean();
        NcaLoss::single("mse", mse)
    }

    fn metrics(&self, state: Tensor<B, 4>, target: Tensor<B, 4>) -> BTreeMap<String, f64> {
        let diff = self.prediction(&state) - target;
        let mse: f64 = (diff.clone() * diff).mean().into_scalar().elem();
        BTreeMap::from([("mse".to_string(), mse), ("rmse".to_string(), mse.sqrt())])
    }

    fn validation_metric(&self) -> ValidationMetric {
        ValidationMetric {
            name: "rmse",
            direction: MetricDirection::Lower,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_layout_has_one_output_channel() {
        let device = Default::default();
        let nca = DepthNcaConfig::new()
            .with_num_hidden_channels(5)
            .with_hidden_dim(16)
            .init::<B>(&device)
            .unwrap();
        let layout = nca.layout();
        assert_eq!(layout.output, 1);
        assert_eq!(layout.total(), 9);
    }

    #[test]
    fn test_rmse_is_monitored_downwards() {
        let device = Default::default();
        let nca = DepthNcaConfig::new()
            .with_num_hidden_channels(5)
            .with_hidden_dim(16)
            .init::<B>(&device)
            .unwrap();
        let metric = nca.validation_metric();
        assert_eq!(metric.name, "rmse");
        assert_eq!(metric.direction, MetricDirection::Lower);
    }
}
