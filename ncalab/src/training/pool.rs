//! Persistent sample pool for growing tasks.
//!
//! Instead of always starting from the seed, batches are drawn from a pool
//! of previously grown states. One slot per batch is re-seeded so the rule
//! never forgets how to grow from scratch, and a few slots are damaged with
//! a circular cutout so it learns to regenerate.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::NcaError;

/// Handle identifying which pool slots a sampled batch came from.
pub struct PoolSample {
    indices: Vec<usize>,
}

/// Pool of detached grid states.
pub struct Pool<B: Backend> {
    entries: Vec<Tensor<B, 4>>,
    damage: bool,
    rng: StdRng,
}

impl<B: Backend> Pool<B> {
    /// Fill a pool of `capacity` copies of the seed state `[1, c, h, w]`.
    pub fn new(
        capacity: usize,
        seed: Tensor<B, 4>,
        damage: bool,
        rng_seed: u64,
    ) -> Result<Self, NcaError> {
        if capacity == 0 {
            return Err(NcaError::invalid_input("pool capacity must be positive"));
        }
        if seed.dims()[0] != 1 {
            return Err(NcaError::invalid_input(
                "pool seed must be a single state [1, c, h, w]",
            ));
        }
        Ok(Self {
            entries: vec![seed; capacity],
            damage,
            rng: StdRng::seed_from_u64(rng_seed),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Draw a batch from the pool. The first slot is replaced with the
    /// fresh seed batch entry; with damage enabled, the last quarter of the
    /// batch gets a circular cutout.
    pub fn sample(&mut self, fresh: Tensor<B, 4>) -> (Tensor<B, 4>, PoolSample) {
        let [batch, c, h, w] = fresh.dims();
        let indices: Vec<usize> = (0..batch)
            .map(|_| self.rng.gen_range(0..self.entries.len()))
            .collect();

        let mut rows: Vec<Tensor<B, 4>> = indices
            .iter()
            .map(|&index| self.entries[index].clone())
            .collect();
        rows[0] = fresh.slice([0..1, 0..c, 0..h, 0..w]);

        if self.damage && batch > 1 {
            let damaged = (batch / 4).max(1);
            for row in rows.iter_mut().rev().take(damaged) {
                let cutout = self.cutout(c, h, w, &row.device());
                *row = row.clone() * cutout;
            }
        }

        (Tensor::cat(rows, 0), PoolSample { indices })
    }

    /// Write rolled-out states back into their pool slots.
    pub fn update(&mut self, sample: &PoolSample, states: Tensor<B, 4>) {
        let [batch, c, h, w] = states.dims();
        for (row, &index) in sample.indices.iter().enumerate().take(batch) {
            self.entries[index] = states
                .clone()
                .slice([row..row + 1, 0..c, 0..h, 0..w])
                .detach();
        }
    }

    /// Multiplicative mask `[1, c, h, w]` zeroing a random circle.
    fn cutout(&mut self, c: usize, h: usize, w: usize, device: &B::Device) -> Tensor<B, 4> {
        let cy = self.rng.gen_range(0.25..0.75) * h as f64;
        let cx = self.rng.gen_range(0.25..0.75) * w as f64;
        let radius = self.rng.gen_range(0.125..0.25) * h.min(w) as f64;

        let mut plane = vec![1.0f32; h * w];
        for (y, row) in plane.chunks_mut(w).enumerate() {
            for (x, value) in row.iter_mut().enumerate() {
                let dy = y as f64 - cy;
                let dx = x as f64 - cx;
                if (dy * dy + dx * dx).sqrt() <= radius {
                    *value = 0.0;
                }
            }
        }
        Tensor::<B, 1>::from_floats(plane.as_slice(), device)
            .reshape([1, 1, h, w])
            .repeat(1, c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn seed(device: &<B as Backend>::Device) -> Tensor<B, 4> {
        Tensor::ones([1, 3, 8, 8], device)
    }

    #[test]
    fn test_pool_sampling_shapes() {
        let device = Default::default();
        let mut pool = Pool::<B>::new(16, seed(&device), false, 0).unwrap();
        let fresh = Tensor::ones([4, 3, 8, 8], &device) * 0.5;
        let (batch, sample) = pool.sample(fresh);
        assert_eq!(batch.dims(), [4, 3, 8, 8]);
        assert_eq!(sample.indices.len(), 4);

        // Slot zero carries the fresh seed, not a pool entry.
        let first: f32 = batch
            .clone()
            .slice([0..1, 0..3, 0..8, 0..8])
            .mean()
            .into_scalar();
        assert!((first - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_damage_zeroes_cells() {
        let device = Default::default();
        let mut pool = Pool::<B>::new(4, seed(&device), true, 3).unwrap();
        let fresh = Tensor::ones([4, 3, 8, 8], &device);
        let (batch, _) = pool.sample(fresh);
        let total: f32 = batch.sum().into_scalar();
        assert!(total < (4 * 3 * 64) as f32, "no cells were damaged");
    }

    #[test]
    fn test_update_writes_back() {
        let device = Default::default();
        let mut pool = Pool::<B>::new(2, seed(&device), false, 0).unwrap();
        let fresh = Tensor::ones([2, 3, 8, 8], &device);
        let (_batch, sample) = pool.sample(fresh);
        pool.update(&sample, Tensor::zeros([2, 3, 8, 8], &device));

        let written = sample.indices[1];
        let value: f32 = pool.entries[written].clone().sum().into_scalar();
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_rejects_batched_seed() {
        let device = Default::default();
        let bad = Tensor::<B, 4>::ones([2, 3, 8, 8], &device);
        assert!(Pool::new(4, bad, false, 0).is_err());
    }
}
