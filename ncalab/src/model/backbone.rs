//! The shared NCA update rule.
//!
//! A fixed depthwise perception filter bank (identity, Sobel-x, Sobel-y per
//! channel) feeds a two-layer 1x1 convolution network that produces a state
//! delta. The last layer is zero-initialized, so an untrained rule leaves
//! the grid unchanged. Cell updates are gated by a stochastic fire mask and,
//! optionally, by an alive mask on the alpha channel.

use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::Initializer;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::module::conv2d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Distribution, Tensor};

use super::ChannelLayout;

const IDENTITY: [f32; 9] = [0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
const SOBEL_X: [f32; 9] = [
    -0.125, 0.0, 0.125, -0.25, 0.0, 0.25, -0.125, 0.0, 0.125,
];
const SOBEL_Y: [f32; 9] = [
    -0.125, -0.25, -0.125, 0.0, 0.0, 0.0, 0.125, 0.25, 0.125,
];

/// Fixed perception filter bank: identity + Sobel pair for every state
/// channel, shaped `[3 * channels, 1, 3, 3]` for a depthwise convolution.
pub fn perception_filters<B: Backend>(channels: usize, device: &B::Device) -> Tensor<B, 4> {
    let mut data = Vec::with_capacity(channels * 3 * 9);
    for _ in 0..channels {
        data.extend_from_slice(&IDENTITY);
        data.extend_from_slice(&SOBEL_X);
        data.extend_from_slice(&SOBEL_Y);
    }
    Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([channels * 3, 1, 3, 3])
}

/// Configuration for [`NcaBackbone`].
#[derive(Config, Debug)]
pub struct NcaBackboneConfig {
    /// Visible image channels at the front of the state.
    pub num_image_channels: usize,
    /// Free cell-memory channels.
    pub num_hidden_channels: usize,
    /// Prediction channels at the back of the state.
    #[config(default = 0)]
    pub num_output_channels: usize,
    /// Width of the update network's intermediate layer.
    #[config(default = 128)]
    pub hidden_dim: usize,
    /// Probability that a cell fires in a given step.
    #[config(default = 0.5)]
    pub fire_rate: f64,
    /// Gate updates on an alpha-channel alive mask.
    #[config(default = false)]
    pub use_alive_mask: bool,
    /// Restore the image channels after every step.
    #[config(default = false)]
    pub immutable_image: bool,
    /// Pad hidden/output channels with noise instead of zeros.
    #[config(default = true)]
    pub pad_noise: bool,
    /// Alpha threshold below which a neighborhood counts as dead.
    #[config(default = 0.1)]
    pub alive_threshold: f64,
}

impl NcaBackboneConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> NcaBackbone<B> {
        let channels =
            self.num_image_channels + self.num_hidden_channels + self.num_output_channels;
        let fc0 = Conv2dConfig::new([channels * 3, self.hidden_dim], [1, 1]).init(device);
        let fc1 = Conv2dConfig::new([self.hidden_dim, channels], [1, 1])
            .with_bias(false)
            .with_initializer(Initializer::Zeros)
            .init(device);
        NcaBackbone {
            filters: perception_filters(channels, device),
            fc0,
            fc1,
            num_image_channels: self.num_image_channels,
            num_hidden_channels: self.num_hidden_channels,
            num_output_channels: self.num_output_channels,
            fire_rate: self.fire_rate,
            use_alive_mask: self.use_alive_mask,
            immutable_image: self.immutable_image,
            pad_noise: self.pad_noise,
            alive_threshold: self.alive_threshold,
        }
    }
}

/// The learned local update rule shared by every model flavor.
#[derive(Module, Debug)]
pub struct NcaBackbone<B: Backend> {
    filters: Tensor<B, 4>,
    fc0: Conv2d<B>,
    fc1: Conv2d<B>,
    num_image_channels: usize,
    num_hidden_channels: usize,
    num_output_channels: usize,
    fire_rate: f64,
    use_alive_mask: bool,
    immutable_image: bool,
    pad_noise: bool,
    alive_threshold: f64,
}

impl<B: Backend> NcaBackbone<B> {
    pub fn layout(&self) -> ChannelLayout {
        ChannelLayout::new(
            self.num_image_channels,
            self.num_hidden_channels,
            self.num_output_channels,
        )
    }

    pub fn pad_noise(&self) -> bool {
        self.pad_noise
    }

    pub fn immutable_image(&self) -> bool {
        self.immutable_image
    }

    /// Alive mask on the alpha channel: a cell survives if any cell in its
    /// 3x3 neighborhood has alpha above the threshold. Shape `[b, 1, h, w]`.
    pub fn alive(&self, state: &Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, _c, h, w] = state.dims();
        let device = state.device();
        let alpha_index = self.num_image_channels - 1;
        let alpha = state
            .clone()
            .slice([0..b, alpha_index..alpha_index + 1, 0..h, 0..w]);
        let living = alpha.greater_elem(self.alive_threshold).float();
        // Count living neighbors; any hit keeps the cell alive.
        let neighborhood = Tensor::ones([1, 1, 3, 3], &device);
        conv2d(
            living,
            neighborhood,
            None,
            ConvOptions::new([1, 1], [1, 1], [1, 1], 1),
        )
        .greater_elem(0.5)
        .float()
    }

    /// One CA update. Shape-preserving.
    pub fn step(&self, state: Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, c, h, w] = state.dims();
        let device = state.device();

        let pre_alive = if self.use_alive_mask {
            Some(self.alive(&state))
        } else {
            None
        };

        let perceived = conv2d(
            state.clone(),
            self.filters.clone(),
            None,
            ConvOptions::new([1, 1], [1, 1], [1, 1], c),
        );
        let mut dx = self.fc1.forward(relu(self.fc0.forward(perceived)));

        if self.fire_rate < 1.0 {
            let fire = Tensor::<B, 4>::random([b, 1, h, w], Distribution::Uniform(0.0, 1.0), &device)
                .lower_elem(self.fire_rate)
                .float()
                .repeat(1, c);
            dx = dx * fire;
        }

        let mut next = state.clone() + dx;

        if let Some(pre) = pre_alive {
            let post = self.alive(&next);
            let life = (pre * post).repeat(1, c);
            next = next * life;
        }

        if self.immutable_image {
            let img = self.num_image_channels;
            next = next.slice_assign(
                [0..b, 0..img, 0..h, 0..w],
                state.slice([0..b, 0..img, 0..h, 0..w]),
            );
        }

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_perception_filter_bank_shape() {
        let device = Default::default();
        let filters = perception_filters::<B>(16, &device);
        assert_eq!(filters.dims(), [48, 1, 3, 3]);
    }

    #[test]
    fn test_step_preserves_shape() {
        let device = Default::default();
        let backbone = NcaBackboneConfig::new(4, 12)
            .with_hidden_dim(32)
            .with_use_alive_mask(true)
            .init::<B>(&device);
        let state = Tensor::<B, 4>::random([2, 16, 8, 8], Distribution::Uniform(0.0, 1.0), &device);
        let next = backbone.step(state);
        assert_eq!(next.dims(), [2, 16, 8, 8]);
    }

    #[test]
    fn test_untrained_rule_is_identity_without_gates() {
        let device = Default::default();
        let backbone = NcaBackboneConfig::new(3, 5)
            .with_hidden_dim(16)
            .with_fire_rate(1.0)
            .init::<B>(&device);
        let state = Tensor::<B, 4>::random([1, 8, 6, 6], Distribution::Uniform(0.0, 1.0), &device);
        let next = backbone.step(state.clone());
        let diff: f32 = (next - state).abs().sum().into_scalar();
        assert!(diff < 1e-6, "zero-initialized rule changed the state");
    }

    #[test]
    fn test_immutable_image_channels() {
        let device = Default::default();
        let backbone = NcaBackboneConfig::new(3, 5)
            .with_num_output_channels(1)
            .with_hidden_dim(16)
            .with_immutable_image(true)
            .init::<B>(&device);
        let state = Tensor::<B, 4>::random([1, 9, 6, 6], Distribution::Uniform(0.0, 1.0), &device);
        let next = backbone.step(state.clone());
        let [b, _c, h, w] = state.dims();
        let before = state.slice([0..b, 0..3, 0..h, 0..w]);
        let after = next.slice([0..b, 0..3, 0..h, 0..w]);
        let diff: f32 = (after - before).abs().sum().into_scalar();
        assert!(diff < 1e-6, "image channels were modified");
    }
}
