//! Checkpoint manifests for training runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::NcaError;
use crate::persist;

/// A recorded weights file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub experiment_id: String,
    pub epoch: usize,
    /// Monitored metric value at checkpoint time.
    pub metric: f64,
    pub path: PathBuf,
    pub hash: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Manages per-experiment `checkpoints.json` manifests.
pub struct CheckpointManager {
    base_dir: PathBuf,
    max_checkpoints: usize,
}

impl CheckpointManager {
    pub fn new(base_dir: PathBuf, max_checkpoints: usize) -> Self {
        Self {
            base_dir,
            max_checkpoints,
        }
    }

    fn manifest_path(&self, experiment_id: &str) -> PathBuf {
        self.base_dir.join(experiment_id).join("checkpoints.json")
    }

    /// List checkpoints recorded for an experiment.
    pub fn list(&self, experiment_id: &str) -> Result<Vec<Checkpoint>, NcaError> {
        Ok(persist::load_json(&self.manifest_path(experiment_id))?.unwrap_or_default())
    }

    /// Latest recorded checkpoint.
    pub fn latest(&self, experiment_id: &str) -> Result<Option<Checkpoint>, NcaError> {
        Ok(self.list(experiment_id)?.into_iter().last())
    }

    /// Checkpoint with the best (lowest) metric value.
    pub fn best(&self, experiment_id: &str) -> Result<Option<Checkpoint>, NcaError> {
        let checkpoints = self.list(experiment_id)?;
        Ok(checkpoints.into_iter().min_by(|a, b| {
            a.metric
                .partial_cmp(&b.metric)
                .unwrap_or(std::cmp::Ordering::Equal)
        }))
    }

    /// Record a weights file in the manifest, pruning oldest entries past
    /// the configured maximum.
    pub fn record(
        &self,
        experiment_id: &str,
        epoch: usize,
        metric: f64,
        weights: &Path,
    ) -> Result<Checkpoint, NcaError> {
        let hash = file_hash(weights)?;
        let size_bytes = std::fs::metadata(weights).map(|m| m.len()).unwrap_or(0);

        let checkpoint = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            experiment_id: experiment_id.to_string(),
            epoch,
            metric,
            path: weights.to_path_buf(),
            hash,
            size_bytes,
            created_at: Utc::now(),
        };

        let manifest = self.manifest_path(experiment_id);
        let mut checkpoints: Vec<Checkpoint> = persist::load_json(&manifest)?.unwrap_or_default();
        checkpoints.push(checkpoint.clone());
        while checkpoints.len() > self.max_checkpoints {
            checkpoints.remove(0);
        }
        persist::atomic_write_json(&manifest, &checkpoints)?;

        Ok(checkpoint)
    }
}

/// SHA-256 of a weights file's content.
fn file_hash(path: &Path) -> Result<String, NcaError> {
    let data = std::fs::read(path)
        .map_err(|e| NcaError::Checkpoint(format!("reading {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_weights(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_record_list_best() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path().join("checkpoints"), 10);
        let weights = fake_weights(dir.path(), "model.bin", b"weights-v1");

        manager.record("exp-1", 1, 0.9, &weights).unwrap();
        manager.record("exp-1", 2, 0.4, &weights).unwrap();
        manager.record("exp-1", 3, 0.6, &weights).unwrap();

        let listed = manager.list("exp-1").unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(manager.best("exp-1").unwrap().unwrap().epoch, 2);
        assert_eq!(manager.latest("exp-1").unwrap().unwrap().epoch, 3);

        // Hash is content-based.
        assert_eq!(listed[0].hash, listed[1].hash);
    }

    #[test]
    fn test_prunes_oldest() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path().join("checkpoints"), 2);
        let weights = fake_weights(dir.path(), "model.bin", b"w");

        for epoch in 0..4 {
            manager.record("exp-1", epoch, 1.0, &weights).unwrap();
        }
        let listed = manager.list("exp-1").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].epoch, 2);
    }

    #[test]
    fn test_missing_experiment_is_empty() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path().to_path_buf(), 5);
        assert!(manager.list("unknown").unwrap().is_empty());
        assert!(manager.best("unknown").unwrap().is_none());
    }
}
