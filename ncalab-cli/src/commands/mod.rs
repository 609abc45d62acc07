//! CLI subcommand implementations.

pub mod eval;
pub mod gif;
pub mod train;

use std::path::PathBuf;

use ncalab::training::{
    CheckpointManager, Experiment, ExperimentRegistry, ExperimentStatus, RunLogger,
    TrainingSummary,
};
use ncalab::{LabConfig, TrainerConfig};

/// Shared directories and seed for every subcommand.
pub struct TaskContext {
    pub lab: LabConfig,
    pub seed: u64,
}

impl TaskContext {
    pub fn new(runs_dir: PathBuf, weights_dir: PathBuf, checkpoints_dir: PathBuf, seed: u64) -> Self {
        let mut lab = LabConfig::default();
        lab.runs_dir = runs_dir;
        lab.weights_dir = weights_dir;
        lab.checkpoints_dir = checkpoints_dir;
        lab.trainer.seed = seed;
        Self { lab, seed }
    }

    /// Trainer config with per-task overrides applied.
    pub fn trainer_config(&self, epochs: usize, batch_size: usize) -> TrainerConfig {
        let mut config = self.lab.trainer.clone();
        config.max_epochs = epochs;
        config.batch_size = batch_size;
        config
    }

    /// Open a run logger under the configured runs directory.
    pub fn run_logger(&self, name: &str) -> anyhow::Result<RunLogger> {
        Ok(RunLogger::create(&self.lab.runs_dir, name)?)
    }

    /// Path for a task's weights (extension applied on save).
    pub fn weights_path(&self, name: &str) -> PathBuf {
        self.lab.weights_dir.join(name)
    }

    /// Record a completed experiment and its best checkpoint.
    pub fn record_experiment(
        &self,
        mut experiment: Experiment,
        summary: &TrainingSummary,
    ) -> anyhow::Result<()> {
        experiment.set_status(ExperimentStatus::Completed);

        let registry_path = self.lab.runs_dir.join("experiments.json");
        let mut registry = ExperimentRegistry::load(&registry_path)?;
        registry.add(experiment.clone());
        registry.save(&registry_path)?;

        let weights = summary.best_weights.as_ref().or(summary.weights.as_ref());
        if let Some(weights) = weights {
            let manager = CheckpointManager::new(self.lab.checkpoints_dir.clone(), 20);
            let metric = summary.best_metric.unwrap_or(summary.best_train_loss);
            manager.record(
                &experiment.id,
                summary.history.epochs_completed,
                metric,
                weights,
            )?;
        }
        tracing::info!(experiment = %experiment.id, "experiment recorded");
        Ok(())
    }
}
