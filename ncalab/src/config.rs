//! Configuration types for the ncalab crate.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::NcaError;
use crate::persist;

/// Optimization method used by the trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    AdamW,
    Adam,
    Sgd,
    RmsProp,
    AdaGrad,
}

impl OptimizerKind {
    /// Initial learning rate used when the trainer config leaves `lr` unset.
    pub fn default_lr(&self) -> f64 {
        match self {
            OptimizerKind::Adam | OptimizerKind::AdamW => 16e-4,
            OptimizerKind::Sgd | OptimizerKind::RmsProp | OptimizerKind::AdaGrad => 1e-2,
        }
    }
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::AdamW
    }
}

/// Trainer hyperparameters.
///
/// Defaults reproduce the reference growing-image setup: a randomized step
/// count per batch, exponential learning-rate decay and batch duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Half-open range of CA steps, randomized in each forward pass.
    #[serde(default = "default_steps_range")]
    pub steps_range: (usize, usize),
    /// Number of CA steps used during validation and evaluation.
    #[serde(default = "default_steps_validation")]
    pub steps_validation: usize,
    /// Initial learning rate. When unset, a per-optimizer default applies.
    #[serde(default)]
    pub lr: Option<f64>,
    /// Exponential learning-rate decay applied after every batch iteration.
    #[serde(default = "default_lr_gamma")]
    pub lr_gamma: f64,
    /// Beta values for the Adam family of optimizers.
    #[serde(default = "default_adam_betas")]
    pub adam_betas: (f64, f64),
    /// How often each batch is duplicated. Values above one slightly
    /// stabilize training on tiny datasets.
    #[serde(default = "default_batch_repeat")]
    pub batch_repeat: usize,
    /// Minibatch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum number of epochs.
    #[serde(default = "default_max_epochs")]
    pub max_epochs: usize,
    /// Clip gradients to unit L2 norm.
    #[serde(default)]
    pub gradient_clipping: bool,
    /// Optimization method.
    #[serde(default)]
    pub optimizer: OptimizerKind,
    /// Save model state every `save_every` epochs.
    #[serde(default = "default_save_every")]
    pub save_every: usize,
    /// Seed for batch shuffling and step-count sampling.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            steps_range: default_steps_range(),
            steps_validation: default_steps_validation(),
            lr: None,
            lr_gamma: default_lr_gamma(),
            adam_betas: default_adam_betas(),
            batch_repeat: default_batch_repeat(),
            batch_size: default_batch_size(),
            max_epochs: default_max_epochs(),
            gradient_clipping: false,
            optimizer: OptimizerKind::default(),
            save_every: default_save_every(),
            seed: default_seed(),
        }
    }
}

impl TrainerConfig {
    /// Learning rate after applying per-optimizer defaults.
    pub fn resolved_lr(&self) -> f64 {
        self.lr.unwrap_or_else(|| self.optimizer.default_lr())
    }

    /// Check value ranges before a run starts.
    pub fn validate(&self) -> Result<(), NcaError> {
        if self.steps_range.0 >= self.steps_range.1 {
            return Err(NcaError::Config(format!(
                "steps_range lower bound {} must be below upper bound {}",
                self.steps_range.0, self.steps_range.1
            )));
        }
        if self.batch_repeat == 0 {
            return Err(NcaError::Config("batch_repeat must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(NcaError::Config("batch_size must be at least 1".into()));
        }
        if self.max_epochs == 0 {
            return Err(NcaError::Config("max_epochs must be at least 1".into()));
        }
        if self.save_every == 0 {
            return Err(NcaError::Config("save_every must be at least 1".into()));
        }
        Ok(())
    }
}

fn default_steps_range() -> (usize, usize) {
    (90, 110)
}

fn default_steps_validation() -> usize {
    100
}

fn default_lr_gamma() -> f64 {
    0.9999
}

fn default_adam_betas() -> (f64, f64) {
    (0.9, 0.99)
}

fn default_batch_repeat() -> usize {
    2
}

fn default_batch_size() -> usize {
    8
}

fn default_max_epochs() -> usize {
    200
}

fn default_save_every() -> usize {
    1
}

fn default_seed() -> u64 {
    42
}

/// Top-level lab configuration: artifact directories plus trainer defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabConfig {
    /// Directory for trained model weights.
    #[serde(default = "default_weights_dir")]
    pub weights_dir: PathBuf,
    /// Directory for run logs (scalars, info texts, exported curves).
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
    /// Directory for checkpoint manifests.
    #[serde(default = "default_checkpoints_dir")]
    pub checkpoints_dir: PathBuf,
    /// Trainer defaults, overridable per task.
    #[serde(default)]
    pub trainer: TrainerConfig,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            weights_dir: default_weights_dir(),
            runs_dir: default_runs_dir(),
            checkpoints_dir: default_checkpoints_dir(),
            trainer: TrainerConfig::default(),
        }
    }
}

impl LabConfig {
    /// Load from a JSON file, falling back to defaults when absent.
    pub fn load(path: &Path) -> Result<Self, NcaError> {
        Ok(persist::load_json(path)?.unwrap_or_default())
    }

    /// Persist to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), NcaError> {
        persist::atomic_write_json(path, self)
    }
}

fn default_weights_dir() -> PathBuf {
    PathBuf::from("weights")
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("runs")
}

fn default_checkpoints_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_trainer_config() {
        let config = TrainerConfig::default();
        assert_eq!(config.steps_range, (90, 110));
        assert_eq!(config.batch_repeat, 2);
        assert_eq!(config.optimizer, OptimizerKind::AdamW);
        assert_eq!(config.resolved_lr(), 16e-4);
        config.validate().unwrap();
    }

    #[test]
    fn test_per_optimizer_lr_defaults() {
        let mut config = TrainerConfig::default();
        config.optimizer = OptimizerKind::Sgd;
        assert_eq!(config.resolved_lr(), 1e-2);
        config.lr = Some(3e-3);
        assert_eq!(config.resolved_lr(), 3e-3);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut config = TrainerConfig::default();
        config.steps_range = (100, 100);
        assert!(config.validate().is_err());

        let mut config = TrainerConfig::default();
        config.batch_repeat = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = LabConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: LabConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.runs_dir, config.runs_dir);
        assert_eq!(parsed.trainer.steps_range, config.trainer.steps_range);
    }

    #[test]
    fn test_load_missing_yields_defaults() {
        let config = LabConfig::load(Path::new("/nonexistent/ncalab.json")).unwrap();
        assert_eq!(config.runs_dir, PathBuf::from("runs"));
    }
}
