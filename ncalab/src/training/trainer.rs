//! The NCA training loop.
//!
//! One trainer drives every model flavor: batches are padded to the full
//! channel layout, rolled out for a randomized number of steps (or through
//! a cascade schedule), and optimized against the flavor's loss. Validation
//! tracks the flavor's monitored metric and keeps the best weights.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{
    AdaGradConfig, AdamConfig, AdamWConfig, GradientsParams, Optimizer, RmsPropConfig, SgdConfig,
};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::earlystopping::EarlyStopping;
use super::metrics::TrainingMetrics;
use super::pool::Pool;
use super::runlog::RunLogger;
use super::summary::TrainingSummary;
use crate::config::{OptimizerKind, TrainerConfig};
use crate::data::{pad_input, BatchStacker, GridSample, Minibatches};
use crate::error::NcaError;
use crate::model::{save_weights, Cascade, NcaModel};

/// Optional pieces a training run can plug in.
pub struct TrainHooks<'a, B: AutodiffBackend> {
    /// Persistent sample pool (growing tasks).
    pub pool: Option<&'a mut Pool<B>>,
    /// Early stopping on the monitored validation metric.
    pub early_stopping: Option<EarlyStopping>,
    /// Multi-scale rollout schedule replacing the randomized step count.
    pub cascade: Option<&'a Cascade>,
    /// Scalar/run logging.
    pub run_log: Option<&'a mut RunLogger>,
}

impl<B: AutodiffBackend> TrainHooks<'_, B> {
    pub fn none() -> Self {
        Self {
            pool: None,
            early_stopping: None,
            cascade: None,
            run_log: None,
        }
    }
}

/// A finished run: the best model plus its summary.
pub struct TrainOutcome<M> {
    pub model: M,
    pub summary: TrainingSummary,
}

/// Trainer for any model implementing [`NcaModel`].
pub struct NcaTrainer {
    config: TrainerConfig,
    weights_path: Option<PathBuf>,
}

impl NcaTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            config,
            weights_path: None,
        }
    }

    /// Save model weights under this path (a `.bin` extension is applied).
    pub fn with_weights_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.weights_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Markdown-formatted info string with training parameters, useful for
    /// keeping track of parameter changes in run logs.
    pub fn info(&self) -> String {
        let c = &self.config;
        let mut out = String::from("NcaTrainer Info\n---------------\n");
        out.push_str(&format!("**Optimizer:** {:?}\n", c.optimizer));
        out.push_str(&format!("**Lr:** {}\n", c.resolved_lr()));
        out.push_str(&format!("**Lr gamma:** {}\n", c.lr_gamma));
        out.push_str(&format!("**Adam betas:** {:?}\n", c.adam_betas));
        out.push_str(&format!("**Gradient clipping:** {}\n", c.gradient_clipping));
        out.push_str(&format!("**Steps range:** {:?}\n", c.steps_range));
        out.push_str(&format!("**Batch size:** {}\n", c.batch_size));
        out.push_str(&format!("**Batch repeat:** {}\n", c.batch_repeat));
        out.push_str(&format!("**Max epochs:** {}\n", c.max_epochs));
        out.push_str(&format!("**Save every:** {}\n", c.save_every));
        out
    }

    /// Run the training loop, dispatching on the configured optimizer.
    pub fn train<B, M, D>(
        &self,
        model: M,
        device: &B::Device,
        train: &D,
        val: Option<&D>,
        test: Option<&D>,
        hooks: TrainHooks<'_, B>,
    ) -> Result<TrainOutcome<M>, NcaError>
    where
        B: AutodiffBackend,
        M: NcaModel<B> + AutodiffModule<B>,
        M::InnerModule: NcaModel<B::InnerBackend>,
        D: Dataset<GridSample>,
    {
        self.config.validate()?;
        let clip = if self.config.gradient_clipping {
            Some(GradientClippingConfig::Norm(1.0))
        } else {
            None
        };
        let (beta_1, beta_2) = self.config.adam_betas;

        match self.config.optimizer {
            OptimizerKind::AdamW => self.fit(
                model,
                device,
                train,
                val,
                test,
                hooks,
                AdamWConfig::new()
                    .with_beta_1(beta_1 as f32)
                    .with_beta_2(beta_2 as f32)
                    .with_grad_clipping(clip)
                    .init(),
            ),
            OptimizerKind::Adam => self.fit(
                model,
                device,
                train,
                val,
                test,
                hooks,
                AdamConfig::new()
                    .with_beta_1(beta_1 as f32)
                    .with_beta_2(beta_2 as f32)
                    .with_grad_clipping(clip)
                    .init(),
            ),
            OptimizerKind::Sgd => self.fit(
                model,
                device,
                train,
                val,
                test,
                hooks,
                SgdConfig::new()
                    .with_momentum(Some(MomentumConfig::new().with_nesterov(true)))
                    .with_gradient_clipping(clip)
                    .init(),
            ),
            OptimizerKind::RmsProp => self.fit(
                model,
                device,
                train,
                val,
                test,
                hooks,
                RmsPropConfig::new().with_grad_clipping(clip).init(),
            ),
            OptimizerKind::AdaGrad => self.fit(
                model,
                device,
                train,
                val,
                test,
                hooks,
                AdaGradConfig::new().with_grad_clipping(clip).init(),
            ),
        }
    }

    fn fit<B, M, D, O>(
        &self,
        mut model: M,
        device: &B::Device,
        train: &D,
        val: Option<&D>,
        test: Option<&D>,
        mut hooks: TrainHooks<'_, B>,
        mut optimizer: O,
    ) -> Result<TrainOutcome<M>, NcaError>
    where
        B: AutodiffBackend,
        M: NcaModel<B> + AutodiffModule<B>,
        M::InnerModule: NcaModel<B::InnerBackend>,
        D: Dataset<GridSample>,
        O: Optimizer<M, B>,
    {
        let cfg = &self.config;
        let started = std::time::Instant::now();
        let layout = model.layout();
        let monitored = model.validation_metric();
        let stacker = BatchStacker::<B>::new(device.clone());
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut lr = cfg.resolved_lr();

        if train.is_empty() {
            return Err(NcaError::dataset("training dataset is empty"));
        }
        if let (Some(cascade), Some(sample)) = (hooks.cascade, train.get(0)) {
            cascade.check_input(sample.height, sample.width)?;
        }
        if let Some(log) = hooks.run_log.as_mut() {
            log.text("training_info", &self.info())?;
        }

        let mut history = TrainingMetrics::default();
        let mut best_model = model.clone();
        let mut best_value: Option<f64> = None;
        let mut best_epoch: Option<usize> = None;
        let mut best_train_loss = f64::INFINITY;
        let mut weights_file: Option<PathBuf> = None;
        let mut best_weights_file: Option<PathBuf> = None;
        let mut iteration = 0usize;

        'epochs: for epoch in 0..cfg.max_epochs {
            if hooks
                .early_stopping
                .as_ref()
                .is_some_and(EarlyStopping::done)
            {
                tracing::info!(epoch, "early stopping triggered");
                break 'epochs;
            }

            let mut epoch_losses = Vec::new();
            for indices in Minibatches::shuffled(train.len(), cfg.batch_size, &mut rng) {
                let batch = stacker.stack(train, &indices)?;
                let mut state = pad_input(batch.image, &layout, model.pad_noise())?;

                let pool_sample = match hooks.pool.as_mut() {
                    Some(pool) => {
                        let (pooled, sample) = pool.sample(state);
                        state = pooled;
                        Some(sample)
                    }
                    None => None,
                };

                let mut target = batch.target;
                if cfg.batch_repeat > 1 {
                    state = Tensor::cat(vec![state; cfg.batch_repeat], 0);
                    target = Tensor::cat(vec![target; cfg.batch_repeat], 0);
                }

                let steps = rng.gen_range(cfg.steps_range.0..cfg.steps_range.1);
                let rolled = match hooks.cascade {
                    Some(cascade) => cascade.rollout(&model, state),
                    None => model.forward(state, steps),
                };

                let loss = model.loss(rolled.clone(), target);
                let loss_value = loss.total_value();
                if !loss_value.is_finite() {
                    return Err(NcaError::training(format!(
                        "non-finite training loss in epoch {epoch}"
                    )));
                }

                let grads = GradientsParams::from_grads(loss.total.backward(), &model);
                model = optimizer.step(lr, model, grads);
                lr *= cfg.lr_gamma;

                if let Some(log) = hooks.run_log.as_mut() {
                    for (name, value) in &loss.terms {
                        log.scalar(&format!("loss/train_{name}"), iteration, *value)?;
                    }
                }
                if let (Some(pool), Some(sample)) = (hooks.pool.as_mut(), pool_sample.as_ref()) {
                    let [b, c, h, w] = rolled.dims();
                    let rows = indices.len().min(b);
                    pool.update(sample, rolled.slice([0..rows, 0..c, 0..h, 0..w]));
                }

                epoch_losses.push(loss_value);
                iteration += 1;
            }

            let mean_loss = epoch_losses.iter().sum::<f64>() / epoch_losses.len().max(1) as f64;
            best_train_loss = best_train_loss.min(mean_loss);
            history.record_epoch(mean_loss);
            tracing::debug!(epoch, mean_loss, "epoch finished");

            if let Some(path) = &self.weights_path {
                if (epoch + 1) % cfg.save_every == 0 {
                    weights_file = Some(save_weights(&model, path)?);
                }
            }

            if let Some(val) = val {
                let snapshot = model.valid();
                let metrics = evaluate::<B::InnerBackend, M::InnerModule, D>(
                    &snapshot,
                    device,
                    val,
                    cfg.steps_validation,
                    hooks.cascade,
                    cfg.batch_size,
                )?;
                if let Some(log) = hooks.run_log.as_mut() {
                    for (name, value) in &metrics {
                        log.scalar(&format!("val/{name}"), epoch, *value)?;
                    }
                }
                if let Some(&value) = metrics.get(monitored.name) {
                    if monitored.direction.improved(best_value, value, 0.0) {
                        tracing::info!(
                            epoch,
                            metric = monitored.name,
                            value,
                            "validation improvement"
                        );
                        best_value = Some(value);
                        best_epoch = Some(epoch);
                        best_model = model.clone();
                        if let Some(path) = &self.weights_path {
                            best_weights_file =
                                Some(save_weights(&model, &best_variant(path))?);
                        }
                    }
                    history.record_validation(monitored.name, value, monitored.direction);
                    if let Some(es) = hooks.early_stopping.as_mut() {
                        es.step(value);
                    }
                }
            }
        }

        // Without validation the latest weights are the best we know of.
        if best_value.is_none() {
            best_model = model;
        }

        let mut test_metrics = BTreeMap::new();
        if let Some(test) = test {
            let snapshot = best_model.valid();
            test_metrics = evaluate::<B::InnerBackend, M::InnerModule, D>(
                &snapshot,
                device,
                test,
                cfg.steps_validation,
                hooks.cascade,
                cfg.batch_size,
            )?;
        }

        history.total_training_secs = started.elapsed().as_secs_f64();
        let summary = TrainingSummary {
            monitored: monitored.name.to_string(),
            best_metric: best_value,
            best_epoch,
            best_train_loss,
            weights: weights_file,
            best_weights: best_weights_file,
            test_metrics,
            history,
        };
        Ok(TrainOutcome {
            model: best_model,
            summary,
        })
    }
}

/// Evaluate a model's metrics over a dataset, averaged across batches.
pub fn evaluate<B, M, D>(
    model: &M,
    device: &B::Device,
    data: &D,
    steps: usize,
    cascade: Option<&Cascade>,
    batch_size: usize,
) -> Result<BTreeMap<String, f64>, NcaError>
where
    B: Backend,
    M: NcaModel<B>,
    D: Dataset<GridSample>,
{
    if data.is_empty() {
        return Err(NcaError::dataset("evaluation dataset is empty"));
    }
    let stacker = BatchStacker::<B>::new(device.clone());
    let layout = model.layout();
    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    let mut batches = 0usize;

    for indices in Minibatches::sequential(data.len(), batch_size) {
        let batch = stacker.stack(data, &indices)?;
        let state = pad_input(batch.image, &layout, model.pad_noise())?;
        let rolled = match cascade {
            Some(cascade) => cascade.rollout(model, state),
            None => model.forward(state, steps),
        };
        for (name, value) in model.metrics(rolled, batch.target) {
            *sums.entry(name).or_insert(0.0) += value;
        }
        batches += 1;
    }

    Ok(sums
        .into_iter()
        .map(|(name, total)| (name, total / batches as f64))
        .collect())
}

/// Sibling path for best-validation weights: `model` -> `model_best`.
fn best_variant(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model");
    let mut out = path.to_path_buf();
    out.set_file_name(format!("{stem}_best"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_variant_path() {
        assert_eq!(
            best_variant(Path::new("weights/growing")),
            Path::new("weights/growing_best")
        );
    }
}
