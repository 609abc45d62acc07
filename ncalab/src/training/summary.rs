//! Result summary of a training run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::metrics::TrainingMetrics;

/// What a finished training run reports back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Name of the monitored validation metric.
    pub monitored: String,
    /// Best monitored value, if validation ran.
    pub best_metric: Option<f64>,
    /// Epoch of the best monitored value.
    pub best_epoch: Option<usize>,
    /// Lowest mean training loss across epochs.
    pub best_train_loss: f64,
    /// Latest saved weights, if a weights path was configured.
    pub weights: Option<PathBuf>,
    /// Best-validation weights, if a weights path was configured.
    pub best_weights: Option<PathBuf>,
    /// Metrics of the best model on the held-out test split.
    pub test_metrics: BTreeMap<String, f64>,
    /// Full scalar history of the run.
    pub history: TrainingMetrics,
}

impl TrainingSummary {
    /// Markdown-formatted report, handy for run logs.
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("Training Summary\n----------------\n");
        out.push_str(&format!("**Monitored:** {}\n", self.monitored));
        if let Some(best) = self.best_metric {
            out.push_str(&format!("**Best value:** {best:.5}\n"));
        }
        if let Some(epoch) = self.best_epoch {
            out.push_str(&format!("**Best epoch:** {epoch}\n"));
        }
        out.push_str(&format!(
            "**Best training loss:** {:.6}\n",
            self.best_train_loss
        ));
        for (name, value) in &self.test_metrics {
            out.push_str(&format!("**Test {name}:** {value:.5}\n"));
        }
        out
    }
}
