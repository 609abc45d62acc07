//! Run logging under the `runs/` directory convention.
//!
//! Each run gets its own directory holding an append-only JSONL scalar log,
//! markdown info texts and optionally exported curve images. Dashboarding
//! stays external; these artifacts are plain files.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NcaError;
use crate::viz;

/// One logged scalar value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub step: usize,
    pub value: f64,
    pub wall_time: DateTime<Utc>,
}

/// Writes scalars and texts for a single training run.
pub struct RunLogger {
    dir: PathBuf,
    scalars: BufWriter<File>,
    series: BTreeMap<String, Vec<f64>>,
}

impl RunLogger {
    /// Create `runs_dir/<name>/` and open the scalar log. The run name is
    /// timestamped so repeated runs never collide.
    pub fn create(runs_dir: &Path, name: &str) -> Result<Self, NcaError> {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let dir = runs_dir.join(format!("{name}-{stamp}"));
        std::fs::create_dir_all(&dir)?;
        let scalars = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("scalars.jsonl"))?;
        Ok(Self {
            dir,
            scalars: BufWriter::new(scalars),
            series: BTreeMap::new(),
        })
    }

    /// Directory holding this run's artifacts.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append a scalar record.
    pub fn scalar(&mut self, tag: &str, step: usize, value: f64) -> Result<(), NcaError> {
        let record = ScalarRecord {
            tag: tag.to_string(),
            step,
            value,
            wall_time: Utc::now(),
        };
        serde_json::to_writer(&mut self.scalars, &record)?;
        self.scalars.write_all(b"\n")?;
        self.scalars.flush()?;
        self.series.entry(tag.to_string()).or_default().push(value);
        Ok(())
    }

    /// Write a markdown text artifact, e.g. trainer parameters.
    pub fn text(&mut self, tag: &str, text: &str) -> Result<(), NcaError> {
        std::fs::write(self.dir.join(format!("{tag}.md")), text)?;
        Ok(())
    }

    /// In-memory history of a logged tag.
    pub fn series(&self, tag: &str) -> Option<&[f64]> {
        self.series.get(tag).map(Vec::as_slice)
    }

    /// Export a logged series as a PNG curve next to the scalar log.
    pub fn export_curve(&self, tag: &str) -> Result<PathBuf, NcaError> {
        let values = self
            .series
            .get(tag)
            .ok_or_else(|| NcaError::not_found(format!("no scalars logged under '{tag}'")))?;
        let filename = format!("{}.png", tag.replace('/', "_"));
        let path = self.dir.join(filename);
        viz::loss_curve(values, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scalars_append_as_jsonl() {
        let dir = TempDir::new().unwrap();
        let mut log = RunLogger::create(dir.path(), "growing").unwrap();
        log.scalar("loss/train_mse", 0, 0.5).unwrap();
        log.scalar("loss/train_mse", 1, 0.25).unwrap();
        log.scalar("val/psnr", 0, 12.0).unwrap();

        let content = std::fs::read_to_string(log.dir().join("scalars.jsonl")).unwrap();
        let records: Vec<ScalarRecord> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].value, 0.25);
        assert_eq!(records[2].tag, "val/psnr");

        assert_eq!(log.series("loss/train_mse"), Some([0.5, 0.25].as_slice()));
    }

    #[test]
    fn test_text_artifact() {
        let dir = TempDir::new().unwrap();
        let mut log = RunLogger::create(dir.path(), "seg").unwrap();
        log.text("training_info", "**Lr:** 0.0016\n").unwrap();
        let content = std::fs::read_to_string(log.dir().join("training_info.md")).unwrap();
        assert!(content.contains("0.0016"));
    }

    #[test]
    fn test_export_curve() {
        let dir = TempDir::new().unwrap();
        let mut log = RunLogger::create(dir.path(), "depth").unwrap();
        for step in 0..10 {
            log.scalar("loss/train_mse", step, 1.0 / (step + 1) as f64)
                .unwrap();
        }
        let path = log.export_curve("loss/train_mse").unwrap();
        assert!(path.exists());
        assert!(log.export_curve("unknown").is_err());
    }
}
