//! Growing NCA: grows an RGBA image from a single seed cell.

use std::collections::BTreeMap;

use burn::config::Config;
use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

use super::backbone::{NcaBackbone, NcaBackboneConfig};
use super::{ChannelLayout, MetricDirection, NcaLoss, NcaModel, ValidationMetric};
use crate::error::NcaError;

/// Configuration for [`GrowingNca`].
#[derive(Config, Debug)]
pub struct GrowingNcaConfig {
    /// Visible channels; RGBA, with alpha doubling as the alive channel.
    #[config(default = 4)]
    pub num_image_channels: usize,
    #[config(default = 12)]
    pub num_hidden_channels: usize,
    #[config(default = 128)]
    pub hidden_dim: usize,
    #[config(default = 0.5)]
    pub fire_rate: f64,
    #[config(default = true)]
    pub use_alive_mask: bool,
}

impl GrowingNcaConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<GrowingNca<B>, NcaError> {
        if self.num_hidden_channels == 0 {
            return Err(NcaError::model("growing NCA needs hidden channels"));
        }
        if self.use_alive_mask && self.num_image_channels < 4 {
            return Err(NcaError::model(
                "alive masking needs an alpha channel; use at least 4 image channels",
            ));
        }
        let backbone = NcaBackboneConfig::new(self.num_image_channels, self.num_hidden_channels)
            .with_hidden_dim(self.hidden_dim)
            .with_fire_rate(self.fire_rate)
            .with_use_alive_mask(self.use_alive_mask)
            .with_pad_noise(false)
            .init(device);
        Ok(GrowingNca { backbone })
    }
}

/// Image-generation flavor. The image channels are grown, not injected, so
/// the state is seeded with a single alive cell instead of an input image.
#[derive(Module, Debug)]
pub struct GrowingNca<B: Backend> {
    backbone: NcaBackbone<B>,
}

impl<B: Backend> GrowingNca<B> {
    /// Seed state: all zeros except alpha and hidden channels of the
    /// center cell, which start at one.
    pub fn seed(
        &self,
        batch: usize,
        height: usize,
        width: usize,
        device: &B::Device,
    ) -> Tensor<B, 4> {
        let layout = self.layout();
        let c = layout.total();
        let alpha = layout.image - 1;
        let (cy, cx) = (height / 2, width / 2);
        Tensor::zeros([batch, c, height, width], device).slice_assign(
            [0..batch, alpha..c, cy..cy + 1, cx..cx + 1],
            Tensor::ones([batch, c - alpha, 1, 1], device),
        )
    }
}

impl<B: Backend> NcaModel<B> for GrowingNca<B> {
    fn layout(&self) -> ChannelLayout {
        self.backbone.layout()
    }

    fn pad_noise(&self) -> bool {
        false
    }

    fn step(&self, state: Tensor<B, 4>) -> Tensor<B, 4> {
        self.backbone.step(state)
    }

    fn loss(&self, state: Tensor<B, 4>, target: Tensor<B, 4>) -> NcaLoss<B> {
        let [b, _c, h, w] = state.dims();
        let img = self.layout().image;
        let grown = state.slice([0..b, 0..img, 0..h, 0..w]);
        let diff = grown - target;
        let mse = (diff.clone() * diff).mean();
        NcaLoss::single("mse", mse)
    }

    fn metrics(&self, state: Tensor<B, 4>, target: Tensor<B, 4>) -> BTreeMap<String, f64> {
        let [b, _c, h, w] = state.dims();
        let img = self.layout().image;
        let grown = state.slice([0..b, 0..img, 0..h, 0..w]);
        let diff = grown - target;
        let mse: f64 = (diff.clone() * diff).mean().into_scalar().elem();
        let psnr = if mse > 0.0 {
            -10.0 * mse.log10()
        } else {
            f64::INFINITY
        };
        BTreeMap::from([("mse".to_string(), mse), ("psnr".to_string(), psnr)])
    }

    fn validation_metric(&self) -> ValidationMetric {
        ValidationMetric {
            name: "psnr",
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
    fn test_seed_state() {
        let device = Default::default();
        let nca = GrowingNcaConfig::new()
            .with_num_hidden_channels(4)
            .with_hidden_dim(16)
            .init::<B>(&device)
            .unwrap();
        let seed = nca.seed(2, 9, 9, &device);
        assert_eq!(seed.dims(), [2, 8, 9, 9]);

        // One alive cell: alpha sums to one per sample.
        let alpha = seed.clone().slice([0..2, 3..4, 0..9, 0..9]);
        let total: f32 = alpha.sum().into_scalar();
        assert_eq!(total, 2.0);

        // RGB channels stay empty.
        let rgb: f32 = seed.slice([0..2, 0..3, 0..9, 0..9]).abs().sum().into_scalar();
        assert_eq!(rgb, 0.0);
    }

    #[test]
    fn test_alive_mask_requires_alpha() {
        let device = Default::default();
        let result = GrowingNcaConfig::new()
            .with_num_image_channels(3)
            .init::<B>(&device);
        assert!(result.is_err());
    }

    #[test]
    fn test_loss_is_zero_on_perfect_match() {
        let device = Default::default();
        let nca = GrowingNcaConfig::new()
            .with_num_hidden_channels(4)
            .with_hidden_dim(16)
            .init::<B>(&device)
            .unwrap();
        let state = Tensor::<B, 4>::ones([1, 8, 4, 4], &device);
        let target = Tensor::<B, 4>::ones([1, 4, 4, 4], &device);
        let loss = nca.loss(state, target);
        assert!(loss.total_value() < 1e-9);
    }
}
