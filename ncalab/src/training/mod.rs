//! Training infrastructure: trainer loop, sample pool, early stopping,
//! experiment tracking, checkpoints, run logs and k-fold evaluation.

pub mod checkpoint;
pub mod earlystopping;
pub mod experiment;
pub mod kfold;
pub mod metrics;
pub mod pool;
pub mod runlog;
pub mod summary;
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointManager};
pub use earlystopping::EarlyStopping;
pub use experiment::{Experiment, ExperimentRegistry, ExperimentStatus};
pub use kfold::{run_kfold, CrossValidation, FoldOutcome};
pub use metrics::TrainingMetrics;
pub use pool::{Pool, PoolSample};
pub use runlog::RunLogger;
pub use summary::TrainingSummary;
pub use trainer::{evaluate, NcaTrainer, TrainHooks, TrainOutcome};
