//! Grid samples, batching and dataset splits.

pub mod dataset;
pub mod split;
pub mod synthetic;

pub use dataset::{pad_input, Batch, BatchStacker, GridSample, Minibatches};
pub use split::{train_val_split, FoldSplit, KFold};

// Dataset seam from burn, re-exported for downstream crates.
pub use burn::data::dataset::{Dataset, InMemDataset};
