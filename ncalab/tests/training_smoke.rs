//! End-to-end training smoke tests on tiny synthetic grids.
//!
//! These mirror the library's task setups at miniature scale: the point is
//! that full training loops run through without errors, not that the tiny
//! models converge.

use ncalab::data::{synthetic, KFold};
use ncalab::device::CpuBackend;
use ncalab::model::{Cascade, DepthNcaConfig, GrowingNcaConfig, SegmentationNcaConfig};
use ncalab::training::{run_kfold, NcaTrainer, Pool, TrainHooks};
use ncalab::TrainerConfig;
use tempfile::TempDir;

type B = CpuBackend;

fn tiny_config(epochs: usize) -> TrainerConfig {
    let mut config = TrainerConfig::default();
    config.max_epochs = epochs;
    config.batch_size = 4;
    config.batch_repeat = 1;
    config.steps_range = (3, 6);
    config.steps_validation = 4;
    config.lr = Some(1e-3);
    config
}

#[test]
fn cascade_depth_training_with_validation() {
    let device = Default::default();
    let nca = DepthNcaConfig::new()
        .with_num_hidden_channels(5)
        .with_hidden_dim(32)
        .with_pad_noise(false)
        .init::<B>(&device)
        .unwrap();
    let cascade = Cascade::new(vec![2, 1], vec![2, 2]).unwrap();
    let dataset = synthetic::depth_dataset(8, 16, 16, 0).unwrap();

    let trainer = NcaTrainer::new(tiny_config(2));
    let hooks = TrainHooks {
        pool: None,
        early_stopping: None,
        cascade: Some(&cascade),
        run_log: None,
    };
    let outcome = trainer
        .train(nca, &device, &dataset, Some(&dataset), None, hooks)
        .unwrap();

    assert_eq!(outcome.summary.history.epochs_completed, 2);
    assert!(outcome.summary.best_train_loss.is_finite());
    let best = outcome.summary.best_metric.unwrap();
    assert!(best.is_finite());
    assert_eq!(outcome.summary.monitored, "rmse");
}

#[test]
fn growing_training_with_pool_and_weights() {
    let device = Default::default();
    let nca = GrowingNcaConfig::new()
        .with_num_hidden_channels(8)
        .with_hidden_dim(32)
        .init::<B>(&device)
        .unwrap();
    let dataset = synthetic::growing_dataset(16, 16, 4, None).unwrap();
    let mut pool = Pool::new(8, nca.seed(1, 16, 16, &device), true, 0).unwrap();

    let dir = TempDir::new().unwrap();
    let weights_path = dir.path().join("growing");

    let trainer = NcaTrainer::new(tiny_config(2)).with_weights_path(&weights_path);
    let hooks = TrainHooks {
        pool: Some(&mut pool),
        early_stopping: None,
        cascade: None,
        run_log: None,
    };
    let outcome = trainer
        .train(nca, &device, &dataset, None, None, hooks)
        .unwrap();

    assert!(outcome.summary.best_train_loss.is_finite());
    let weights = outcome.summary.weights.expect("weights were saved");
    assert!(weights.exists());
}

#[test]
fn kfold_segmentation_covers_all_folds() {
    let device = Default::default();
    let dataset = synthetic::segmentation_dataset(6, 16, 16, 1).unwrap();

    let trainer = NcaTrainer::new(tiny_config(1));
    let cv = run_kfold::<B, _, _, _>(
        &trainer,
        &KFold::new(3).with_seed(5),
        &dataset,
        &device,
        None,
        |_fold, device| {
            SegmentationNcaConfig::new()
                .with_num_hidden_channels(4)
                .with_hidden_dim(16)
                .init(device)
        },
    )
    .unwrap();

    assert_eq!(cv.outcomes.len(), 3);
    let (mean, std) = cv.aggregate()["dice"];
    assert!(mean.is_finite());
    assert!(std.is_finite());
}
