//! Dataset splits: k-fold cross-validation and train/validation holdout.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::NcaError;

/// One rotation of a k-fold split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSplit {
    pub fold: usize,
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

/// K-fold cross-validation splitter with seeded shuffling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KFold {
    pub k: usize,
    pub seed: u64,
}

impl KFold {
    pub fn new(k: usize) -> Self {
        Self { k, seed: 42 }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Partition `len` samples into `k` rotations of disjoint, covering,
    /// near-equal folds.
    pub fn splits(&self, len: usize) -> Result<Vec<FoldSplit>, NcaError> {
        if self.k < 2 {
            return Err(NcaError::invalid_input("k-fold needs k >= 2"));
        }
        if len < self.k {
            return Err(NcaError::dataset(format!(
                "cannot split {len} samples into {} folds",
                self.k
            )));
        }

        let mut indices: Vec<usize> = (0..len).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        // The first `len % k` folds take one extra sample.
        let base = len / self.k;
        let extra = len % self.k;
        let mut splits = Vec::with_capacity(self.k);
        let mut cursor = 0;
        for fold in 0..self.k {
            let size = base + usize::from(fold < extra);
            let val: Vec<usize> = indices[cursor..cursor + size].to_vec();
            let train: Vec<usize> = indices[..cursor]
                .iter()
                .chain(indices[cursor + size..].iter())
                .copied()
                .collect();
            splits.push(FoldSplit { fold, train, val });
            cursor += size;
        }
        Ok(splits)
    }
}

/// Single seeded train/validation holdout split.
pub fn train_val_split(
    len: usize,
    val_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), NcaError> {
    if !(0.0..1.0).contains(&val_fraction) {
        return Err(NcaError::invalid_input(
            "val_fraction must lie in [0, 1)",
        ));
    }
    let mut indices: Vec<usize> = (0..len).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let val_len = ((len as f64) * val_fraction).round() as usize;
    let val = indices.split_off(len - val_len);
    Ok((indices, val))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_folds_are_disjoint_and_cover() {
        let splits = KFold::new(5).splits(23).unwrap();
        assert_eq!(splits.len(), 5);

        let mut all_val = BTreeSet::new();
        for split in &splits {
            // val and train are disjoint within a fold.
            let val: BTreeSet<_> = split.val.iter().collect();
            assert!(split.train.iter().all(|i| !val.contains(i)));
            assert_eq!(split.train.len() + split.val.len(), 23);
            all_val.extend(split.val.iter().copied());
        }
        // Validation folds jointly cover the dataset.
        assert_eq!(all_val.len(), 23);

        // Near-equal fold sizes: 23 = 5 + 5 + 5 + 4 + 4.
        let sizes: Vec<usize> = splits.iter().map(|s| s.val.len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 4, 4]);
    }

    #[test]
    fn test_splits_are_seeded() {
        let a = KFold::new(3).with_seed(1).splits(12).unwrap();
        let b = KFold::new(3).with_seed(1).splits(12).unwrap();
        let c = KFold::new(3).with_seed(2).splits(12).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_rejects_degenerate_folds() {
        assert!(KFold::new(1).splits(10).is_err());
        assert!(KFold::new(5).splits(3).is_err());
    }

    #[test]
    fn test_train_val_split() {
        let (train, val) = train_val_split(20, 0.25, 3).unwrap();
        assert_eq!(train.len(), 15);
        assert_eq!(val.len(), 5);

        let mut all: Vec<usize> = train.iter().chain(val.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());

        assert!(train_val_split(10, 1.0, 0).is_err());
    }
}
