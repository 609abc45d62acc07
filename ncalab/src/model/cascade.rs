//! Cascaded multi-scale rollout.
//!
//! The same update rule is applied across progressively finer resolutions:
//! the state starts at the coarsest scale, runs a fixed number of steps, is
//! upscaled, and continues at the next scale until full resolution. For
//! flavors with injected inputs, the image channels are refreshed from the
//! input at every scale so finer detail becomes visible as the grid grows.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::NcaModel;
use crate::error::NcaError;

/// Downscale by an integer factor with block averaging. Height and width
/// must be divisible by the factor.
pub fn downscale<B: Backend>(x: Tensor<B, 4>, factor: usize) -> Tensor<B, 4> {
    if factor <= 1 {
        return x;
    }
    let [b, c, h, w] = x.dims();
    let (nh, nw) = (h / factor, w / factor);
    x.reshape([b, c, nh, factor, nw, factor])
        .mean_dim(5)
        .mean_dim(3)
        .reshape([b, c, nh, nw])
}

/// Upscale by an integer factor with nearest-neighbor repetition.
pub fn upscale_nearest<B: Backend>(x: Tensor<B, 4>, factor: usize) -> Tensor<B, 4> {
    if factor <= 1 {
        return x;
    }
    let [b, c, h, w] = x.dims();
    x.reshape([b, c, h, 1, w, 1])
        .repeat(3, factor)
        .repeat(5, factor)
        .reshape([b, c, h * factor, w * factor])
}

/// A multi-scale rollout schedule: `scales[i]` is the downscale factor of
/// stage `i` and `steps[i]` the number of CA steps run there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cascade {
    scales: Vec<usize>,
    steps: Vec<usize>,
}

impl Cascade {
    /// Build a schedule. Scales must be strictly decreasing, end at 1, and
    /// each scale must divide its predecessor evenly.
    pub fn new(scales: Vec<usize>, steps: Vec<usize>) -> Result<Self, NcaError> {
        if scales.is_empty() || scales.len() != steps.len() {
            return Err(NcaError::invalid_input(
                "cascade needs matching, non-empty scale and step lists",
            ));
        }
        if *scales.last().unwrap_or(&0) != 1 {
            return Err(NcaError::invalid_input("cascade must end at scale 1"));
        }
        for pair in scales.windows(2) {
            if pair[1] >= pair[0] || pair[0] % pair[1] != 0 {
                return Err(NcaError::invalid_input(format!(
                    "cascade scales must strictly decrease by integer factors, got {} -> {}",
                    pair[0], pair[1]
                )));
            }
        }
        if steps.iter().any(|&s| s == 0) {
            return Err(NcaError::invalid_input("cascade steps must be positive"));
        }
        Ok(Self { scales, steps })
    }

    pub fn scales(&self) -> &[usize] {
        &self.scales
    }

    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    /// Total CA steps across all stages.
    pub fn total_steps(&self) -> usize {
        self.steps.iter().sum()
    }

    /// Input grids must be divisible by the coarsest scale.
    pub fn check_input(&self, height: usize, width: usize) -> Result<(), NcaError> {
        let coarsest = self.scales[0];
        if height % coarsest != 0 || width % coarsest != 0 {
            return Err(NcaError::invalid_input(format!(
                "grid {height}x{width} is not divisible by cascade scale {coarsest}"
            )));
        }
        Ok(())
    }

    /// Roll a padded full-resolution state through every stage. The result
    /// is at full resolution; loss and metrics are computed there.
    pub fn rollout<B: Backend, M: NcaModel<B>>(
        &self,
        model: &M,
        state: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let layout = model.layout();
        let full = state.clone();
        let mut state = downscale(state, self.scales[0]);

        for (stage, (&scale, &steps)) in self.scales.iter().zip(self.steps.iter()).enumerate() {
            state = model.forward(state, steps);

            if let Some(&next) = self.scales.get(stage + 1) {
                state = upscale_nearest(state, scale / next);
                if model.input_frozen() && layout.image > 0 {
                    let input = downscale(full.clone(), next);
                    let [b, _c, h, w] = state.dims();
                    state = state.slice_assign(
                        [0..b, 0..layout.image, 0..h, 0..w],
                        input.slice([0..b, 0..layout.image, 0..h, 0..w]),
                    );
                }
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray;

    #[test]
    fn test_schedule_validation() {
        assert!(Cascade::new(vec![8, 4, 2, 1], vec![50, 25, 15, 15]).is_ok());
        assert!(Cascade::new(vec![2, 1], vec![3, 3]).is_ok());

        // Must end at 1.
        assert!(Cascade::new(vec![4, 2], vec![5, 5]).is_err());
        // Must strictly decrease.
        assert!(Cascade::new(vec![2, 2, 1], vec![1, 1, 1]).is_err());
        // Must divide evenly.
        assert!(Cascade::new(vec![6, 4, 1], vec![1, 1, 1]).is_err());
        // Lengths must match.
        assert!(Cascade::new(vec![2, 1], vec![3]).is_err());
        // No zero-step stages.
        assert!(Cascade::new(vec![2, 1], vec![3, 0]).is_err());
    }

    #[test]
    fn test_check_input() {
        let cascade = Cascade::new(vec![8, 4, 2, 1], vec![1, 1, 1, 1]).unwrap();
        assert!(cascade.check_input(32, 32).is_ok());
        assert!(cascade.check_input(30, 32).is_err());
    }

    #[test]
    fn test_scale_helpers_roundtrip_shape() {
        let device = Default::default();
        let x = Tensor::<B, 4>::random([2, 3, 8, 8], Distribution::Uniform(0.0, 1.0), &device);
        let down = downscale(x, 4);
        assert_eq!(down.dims(), [2, 3, 2, 2]);
        let up = upscale_nearest(down, 4);
        assert_eq!(up.dims(), [2, 3, 8, 8]);
    }

    #[test]
    fn test_upscale_repeats_values() {
        let device = Default::default();
        let x = Tensor::<B, 1>::from_floats([1.0, 2.0, 3.0, 4.0].as_slice(), &device)
            .reshape([1, 1, 2, 2]);
        let up = upscale_nearest(x, 2);
        let expected = Tensor::<B, 1>::from_floats(
            [
                1.0, 1.0, 2.0, 2.0, //
                1.0, 1.0, 2.0, 2.0, //
                3.0, 3.0, 4.0, 4.0, //
                3.0, 3.0, 4.0, 4.0,
            ]
            .as_slice(),
            &device,
        )
        .reshape([1, 1, 4, 4]);
        let diff: f32 = (up - expected).abs().sum().into_scalar();
        assert!(diff < 1e-6);
    }
}
