//! Experiment tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NcaError;
use crate::persist;

/// Lifecycle of a training experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A recorded training experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    /// Task flavor, e.g. "growing" or "segmentation".
    pub task: String,
    pub hyperparams: serde_json::Value,
    pub status: ExperimentStatus,
    pub seed: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
}

impl Experiment {
    pub fn new(name: &str, task: &str, seed: u64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            task: task.to_string(),
            hyperparams: serde_json::Value::Object(serde_json::Map::new()),
            status: ExperimentStatus::Pending,
            seed,
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            notes: None,
        }
    }

    /// Snapshot hyperparameters from any serializable config.
    pub fn with_hyperparams<T: Serialize>(mut self, params: &T) -> Result<Self, NcaError> {
        self.hyperparams = serde_json::to_value(params)?;
        Ok(self)
    }

    pub fn set_status(&mut self, status: ExperimentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// JSON-persisted registry of experiments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentRegistry {
    pub experiments: Vec<Experiment>,
}

impl ExperimentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, experiment: Experiment) {
        self.experiments.push(experiment);
    }

    pub fn find(&self, id: &str) -> Option<&Experiment> {
        self.experiments.iter().find(|e| e.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Experiment> {
        self.experiments.iter_mut().find(|e| e.id == id)
    }

    pub fn list_by_status(&self, status: &ExperimentStatus) -> Vec<&Experiment> {
        self.experiments
            .iter()
            .filter(|e| &e.status == status)
            .collect()
    }

    pub fn load(path: &std::path::Path) -> Result<Self, NcaError> {
        Ok(persist::load_json(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), NcaError> {
        persist::atomic_write_json(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_experiment_lifecycle() {
        let mut experiment = Experiment::new("growing-emoji", "growing", 42);
        assert_eq!(experiment.status, ExperimentStatus::Pending);
        experiment.set_status(ExperimentStatus::Running);
        assert_eq!(experiment.status, ExperimentStatus::Running);
        assert!(experiment.updated_at >= experiment.created_at);
    }

    #[test]
    fn test_registry_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("experiments.json");

        let mut registry = ExperimentRegistry::new();
        let experiment = Experiment::new("seg-kfold", "segmentation", 7);
        let id = experiment.id.clone();
        registry.add(experiment);
        registry.save(&path).unwrap();

        let mut loaded = ExperimentRegistry::load(&path).unwrap();
        assert_eq!(loaded.experiments.len(), 1);
        assert!(loaded.find(&id).is_some());

        loaded
            .find_mut(&id)
            .unwrap()
            .set_status(ExperimentStatus::Completed);
        assert_eq!(
            loaded.list_by_status(&ExperimentStatus::Completed).len(),
            1
        );
    }

    #[test]
    fn test_load_missing_is_empty() {
        let registry =
            ExperimentRegistry::load(std::path::Path::new("/nonexistent/experiments.json"))
                .unwrap();
        assert!(registry.experiments.is_empty());
    }
}
