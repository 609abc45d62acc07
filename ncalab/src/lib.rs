//! # ncalab — Neural Cellular Automata training library
//!
//! Differentiable, locally-interacting update rules iterated over a grid,
//! trained for image generation, classification, segmentation and depth
//! estimation. Tensors, autodiff and optimizers come from the burn
//! framework; this crate provides the NCA flavors, the training loop,
//! cascaded multi-scale rollouts, sample pools, k-fold evaluation,
//! experiment tracking and run logging.
//!
//! ## Quick start
//!
//! ```no_run
//! use ncalab::device::{default_device, DefaultBackend};
//! use ncalab::data::synthetic;
//! use ncalab::model::GrowingNcaConfig;
//! use ncalab::training::{NcaTrainer, TrainHooks};
//! use ncalab::TrainerConfig;
//!
//! # fn main() -> Result<(), ncalab::NcaError> {
//! let device = default_device();
//! let nca = GrowingNcaConfig::new().init::<DefaultBackend>(&device)?;
//! let dataset = synthetic::growing_dataset(32, 32, 8, None)?;
//!
//! let trainer = NcaTrainer::new(TrainerConfig::default());
//! let outcome = trainer.train(nca, &device, &dataset, None, None, TrainHooks::none())?;
//! println!("best training loss: {}", outcome.summary.best_train_loss);
//! # Ok(())
//! # }
//! ```

// Foundation
pub mod config;
pub mod device;
pub mod error;
pub mod persist;

// Data pipeline
pub mod data;

// Models
pub mod model;

// Training infrastructure
pub mod training;

// Visualization
pub mod viz;

// Re-exports
pub use config::{LabConfig, OptimizerKind, TrainerConfig};
pub use error::NcaError;
pub use model::{
    Cascade, ChannelLayout, ClassificationNca, ClassificationNcaConfig, DepthNca, DepthNcaConfig,
    GrowingNca, GrowingNcaConfig, MetricDirection, NcaLoss, NcaModel, SegmentationNca,
    SegmentationNcaConfig, ValidationMetric,
};
pub use training::{
    run_kfold, EarlyStopping, NcaTrainer, Pool, RunLogger, TrainHooks, TrainOutcome,
    TrainingSummary,
};
