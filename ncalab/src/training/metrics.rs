//! Per-run metric history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::MetricDirection;

/// Scalar history of a training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    pub train_loss: Vec<f64>,
    /// Name of the monitored validation metric, once recorded.
    pub monitored: Option<String>,
    pub monitored_history: Vec<f64>,
    pub best_epoch: Option<usize>,
    pub best_value: Option<f64>,
    pub custom: BTreeMap<String, Vec<f64>>,
    pub total_training_secs: f64,
}

impl TrainingMetrics {
    /// Record the mean training loss of a finished epoch.
    pub fn record_epoch(&mut self, loss: f64) {
        self.train_loss.push(loss);
        self.epochs_completed += 1;
    }

    /// Record the monitored validation metric for the current epoch.
    /// Returns true when the value improves on the best seen so far.
    pub fn record_validation(
        &mut self,
        name: &str,
        value: f64,
        direction: MetricDirection,
    ) -> bool {
        self.monitored = Some(name.to_string());
        self.monitored_history.push(value);
        if direction.improved(self.best_value, value, 0.0) {
            self.best_value = Some(value);
            self.best_epoch = Some(self.epochs_completed);
            return true;
        }
        false
    }

    /// Append a secondary metric series.
    pub fn add_custom(&mut self, name: &str, value: f64) {
        self.custom.entry(name.to_string()).or_default().push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_tracking_upwards() {
        let mut metrics = TrainingMetrics::default();
        metrics.record_epoch(0.9);
        assert!(metrics.record_validation("dice", 0.4, MetricDirection::Higher));
        metrics.record_epoch(0.5);
        assert!(metrics.record_validation("dice", 0.6, MetricDirection::Higher));
        metrics.record_epoch(0.4);
        assert!(!metrics.record_validation("dice", 0.55, MetricDirection::Higher));

        assert_eq!(metrics.epochs_completed, 3);
        assert_eq!(metrics.best_value, Some(0.6));
        assert_eq!(metrics.best_epoch, Some(2));
    }

    #[test]
    fn test_best_tracking_downwards() {
        let mut metrics = TrainingMetrics::default();
        metrics.record_epoch(1.0);
        metrics.record_validation("rmse", 0.8, MetricDirection::Lower);
        metrics.record_epoch(0.9);
        metrics.record_validation("rmse", 0.3, MetricDirection::Lower);
        assert_eq!(metrics.best_value, Some(0.3));
    }

    #[test]
    fn test_custom_series() {
        let mut metrics = TrainingMetrics::default();
        metrics.add_custom("iou", 0.1);
        metrics.add_custom("iou", 0.2);
        assert_eq!(metrics.custom["iou"], vec![0.1, 0.2]);
    }
}
