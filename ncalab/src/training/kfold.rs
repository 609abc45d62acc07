//! K-fold cross-validation driver.
//!
//! Trains a fresh model per fold rotation and aggregates the per-fold
//! validation metrics. Model construction goes through a factory closure so
//! every fold starts from an independent initialization.

use std::collections::BTreeMap;

use burn::data::dataset::{Dataset, InMemDataset};
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use super::trainer::{evaluate, NcaTrainer, TrainHooks};
use crate::data::{GridSample, KFold};
use crate::error::NcaError;
use crate::model::{Cascade, NcaModel};

/// Validation metrics of one fold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldOutcome {
    pub fold: usize,
    pub metrics: BTreeMap<String, f64>,
}

/// Aggregated k-fold results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidation {
    pub outcomes: Vec<FoldOutcome>,
}

impl CrossValidation {
    /// Mean of a metric across folds.
    pub fn mean(&self, name: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .outcomes
            .iter()
            .filter_map(|o| o.metrics.get(name).copied())
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Population standard deviation of a metric across folds.
    pub fn std(&self, name: &str) -> Option<f64> {
        let mean = self.mean(name)?;
        let values: Vec<f64> = self
            .outcomes
            .iter()
            .filter_map(|o| o.metrics.get(name).copied())
            .collect();
        let variance =
            values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
        Some(variance.sqrt())
    }

    /// `(mean, std)` for every metric present in all folds.
    pub fn aggregate(&self) -> BTreeMap<String, (f64, f64)> {
        let mut result = BTreeMap::new();
        if let Some(first) = self.outcomes.first() {
            for name in first.metrics.keys() {
                if let (Some(mean), Some(std)) = (self.mean(name), self.std(name)) {
                    result.insert(name.clone(), (mean, std));
                }
            }
        }
        result
    }
}

/// Clone the samples at `indices` into a standalone dataset.
fn subset<D: Dataset<GridSample>>(
    dataset: &D,
    indices: &[usize],
) -> Result<InMemDataset<GridSample>, NcaError> {
    let samples = indices
        .iter()
        .map(|&index| {
            dataset
                .get(index)
                .ok_or_else(|| NcaError::dataset(format!("index {index} out of range")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(InMemDataset::new(samples))
}

/// Train and validate across every fold rotation.
pub fn run_kfold<B, M, D, F>(
    trainer: &NcaTrainer,
    kfold: &KFold,
    dataset: &D,
    device: &B::Device,
    cascade: Option<&Cascade>,
    factory: F,
) -> Result<CrossValidation, NcaError>
where
    B: AutodiffBackend,
    M: NcaModel<B> + AutodiffModule<B>,
    M::InnerModule: NcaModel<B::InnerBackend>,
    D: Dataset<GridSample>,
    F: Fn(usize, &B::Device) -> Result<M, NcaError>,
{
    let splits = kfold.splits(dataset.len())?;
    let mut outcomes = Vec::with_capacity(splits.len());

    for split in splits {
        let train_set = subset(dataset, &split.train)?;
        let val_set = subset(dataset, &split.val)?;
        let model = factory(split.fold, device)?;

        tracing::info!(fold = split.fold, samples = train_set.len(), "training fold");
        let hooks = TrainHooks {
            pool: None,
            early_stopping: None,
            cascade,
            run_log: None,
        };
        let outcome = trainer.train(model, device, &train_set, Some(&val_set), None, hooks)?;

        let snapshot = outcome.model.valid();
        let metrics = evaluate::<B::InnerBackend, _, _>(
            &snapshot,
            device,
            &val_set,
            trainer.config().steps_validation,
            cascade,
            trainer.config().batch_size,
        )?;
        outcomes.push(FoldOutcome {
            fold: split.fold,
            metrics,
        });
    }

    Ok(CrossValidation { outcomes })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(fold: usize, dice: f64) -> FoldOutcome {
        FoldOutcome {
            fold,
            metrics: BTreeMap::from([("dice".to_string(), dice)]),
        }
    }

    #[test]
    fn test_aggregation() {
        let cv = CrossValidation {
            outcomes: vec![outcome(0, 0.6), outcome(1, 0.8), outcome(2, 0.7)],
        };
        let mean = cv.mean("dice").unwrap();
        assert!((mean - 0.7).abs() < 1e-12);
        let std = cv.std("dice").unwrap();
        assert!((std - (2.0 / 300.0_f64).sqrt()).abs() < 1e-9);

        let aggregate = cv.aggregate();
        assert!(aggregate.contains_key("dice"));
        assert!(cv.mean("iou").is_none());
    }
}
