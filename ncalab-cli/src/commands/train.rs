//! Training tasks on synthetic (or user-supplied) data.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use serde_json::json;

use ncalab::data::{synthetic, train_val_split, Dataset, GridSample, InMemDataset, KFold};
use ncalab::device::{compute_device, fix_random_seed, DefaultBackend, DeviceRequest};
use ncalab::model::{
    Cascade, ClassificationNcaConfig, DepthNcaConfig, GrowingNcaConfig, SegmentationNcaConfig,
};
use ncalab::training::{run_kfold, Experiment, NcaTrainer, Pool, TrainHooks, TrainOutcome};
use ncalab::{persist, viz, NcaError};

use super::TaskContext;

type B = DefaultBackend;

/// Flags shared by every training task.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Number of training epochs
    #[arg(short, long, default_value_t = 200)]
    pub epochs: usize,

    /// Minibatch size
    #[arg(short = 'b', long, default_value_t = 8)]
    pub batch_size: usize,

    /// Hidden channels of the cell state
    #[arg(short = 'H', long, default_value_t = 12)]
    pub hidden_channels: usize,

    /// Width of the update network
    #[arg(long, default_value_t = 128)]
    pub hidden_dim: usize,

    /// Initial learning rate (per-optimizer default when omitted)
    #[arg(long)]
    pub lr: Option<f64>,

    /// Try using the GPU if available
    #[arg(long)]
    pub gpu: bool,

    /// Index of the GPU to use with --gpu
    #[arg(long, default_value_t = 0)]
    pub gpu_index: usize,
}

impl CommonArgs {
    fn device_request(&self) -> DeviceRequest {
        if self.gpu {
            DeviceRequest::Gpu {
                index: self.gpu_index,
            }
        } else {
            DeviceRequest::Cpu
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum TrainTask {
    /// Grow an RGBA image from a single seed cell
    Growing(GrowingArgs),
    /// Binary segmentation of synthetic blobs
    Segmentation(SegmentationArgs),
    /// Depth estimation with a cascade schedule
    Depth(DepthArgs),
    /// Self-classifying glyphs
    Classification(ClassificationArgs),
}

#[derive(Args, Debug)]
pub struct GrowingArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// RGBA image to grow (procedural emoji when omitted)
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Grid side length
    #[arg(long, default_value_t = 32)]
    pub size: usize,

    /// Pool capacity; 0 disables the sample pool
    #[arg(long, default_value_t = 64)]
    pub pool: usize,

    /// Disable damage on pool samples
    #[arg(long)]
    pub no_damage: bool,

    /// Steps in the exported rollout GIF
    #[arg(long, default_value_t = 200)]
    pub gif_steps: usize,
}

#[derive(Args, Debug)]
pub struct SegmentationArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Number of synthetic samples
    #[arg(long, default_value_t = 64)]
    pub samples: usize,

    /// Grid side length
    #[arg(long, default_value_t = 32)]
    pub size: usize,

    /// Run k-fold cross-validation instead of a single split
    #[arg(short = 'f', long)]
    pub folds: Option<usize>,

    /// Disable the multi-scale cascade
    #[arg(long)]
    pub no_cascade: bool,

    /// Validation fraction for the single-split mode
    #[arg(long, default_value_t = 0.2)]
    pub val_fraction: f64,
}

#[derive(Args, Debug)]
pub struct DepthArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Number of synthetic samples
    #[arg(long, default_value_t = 64)]
    pub samples: usize,

    /// Grid side length
    #[arg(long, default_value_t = 32)]
    pub size: usize,

    /// Disable the multi-scale cascade
    #[arg(long)]
    pub no_cascade: bool,

    /// Validation fraction
    #[arg(long, default_value_t = 0.2)]
    pub val_fraction: f64,
}

#[derive(Args, Debug)]
pub struct ClassificationArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Number of glyph classes (2-5)
    #[arg(long, default_value_t = 4)]
    pub classes: usize,

    /// Number of synthetic samples
    #[arg(long, default_value_t = 64)]
    pub samples: usize,

    /// Grid side length
    #[arg(long, default_value_t = 16)]
    pub size: usize,

    /// Validation fraction
    #[arg(long, default_value_t = 0.2)]
    pub val_fraction: f64,
}

pub fn run(context: &TaskContext, task: TrainTask) -> anyhow::Result<()> {
    match task {
        TrainTask::Growing(args) => run_growing(context, args),
        TrainTask::Segmentation(args) => run_segmentation(context, args),
        TrainTask::Depth(args) => run_depth(context, args),
        TrainTask::Classification(args) => run_classification(context, args),
    }
}

fn run_growing(context: &TaskContext, args: GrowingArgs) -> anyhow::Result<()> {
    let device = compute_device(args.common.device_request());
    fix_random_seed::<B>(context.seed);

    let target = match &args.image {
        Some(path) => load_rgba_target(path, args.size)?,
        None => synthetic::emoji_target(args.size, args.size),
    };
    let dataset =
        synthetic::growing_dataset(args.size, args.size, args.common.batch_size, Some(target))?;

    let nca = GrowingNcaConfig::new()
        .with_num_hidden_channels(args.common.hidden_channels)
        .with_hidden_dim(args.common.hidden_dim)
        .init::<B>(&device)?;

    let mut pool = if args.pool > 0 {
        Some(Pool::new(
            args.pool,
            nca.seed(1, args.size, args.size, &device),
            !args.no_damage,
            context.seed,
        )?)
    } else {
        None
    };

    let mut run_log = context.run_logger("growing")?;
    let mut config = context.trainer_config(args.common.epochs, args.common.batch_size);
    config.lr = args.common.lr.or(config.lr);
    let trainer = NcaTrainer::new(config).with_weights_path(context.weights_path("growing"));

    let hooks = TrainHooks {
        pool: pool.as_mut(),
        early_stopping: None,
        cascade: None,
        run_log: Some(&mut run_log),
    };
    let outcome = trainer.train(nca, &device, &dataset, None, None, hooks)?;

    persist::atomic_write_json(&run_log.dir().join("summary.json"), &outcome.summary)?;
    run_log.export_curve("loss/train_mse")?;
    let seed_state = outcome.model.seed(1, args.size, args.size, &device);
    let gif = viz::export_rollout_gif(
        &outcome.model,
        seed_state,
        args.gif_steps,
        4,
        &run_log.dir().join("rollout.gif"),
    )?;
    tracing::info!(gif = %gif.display(), "rollout exported");

    let experiment = Experiment::new("growing-emoji", "growing", context.seed).with_hyperparams(
        &json!({
            "epochs": args.common.epochs,
            "batch_size": args.common.batch_size,
            "hidden_channels": args.common.hidden_channels,
            "hidden_dim": args.common.hidden_dim,
            "size": args.size,
            "pool": args.pool,
            "damage": !args.no_damage,
        }),
    )?;
    context.record_experiment(experiment, &outcome.summary)?;

    println!("{}", outcome.summary.to_markdown());
    Ok(())
}

fn run_segmentation(context: &TaskContext, args: SegmentationArgs) -> anyhow::Result<()> {
    let device = compute_device(args.common.device_request());
    fix_random_seed::<B>(context.seed);

    let dataset = synthetic::segmentation_dataset(args.samples, args.size, args.size, context.seed)?;
    let cascade = if args.no_cascade {
        None
    } else {
        Some(Cascade::new(vec![4, 2, 1], vec![20, 10, 10])?)
    };

    let mut config = context.trainer_config(args.common.epochs, args.common.batch_size);
    config.lr = args.common.lr.or(config.lr);

    if let Some(folds) = args.folds {
        let trainer = NcaTrainer::new(config);
        let cv = run_kfold::<B, _, _, _>(
            &trainer,
            &KFold::new(folds).with_seed(context.seed),
            &dataset,
            &device,
            cascade.as_ref(),
            |_fold, device| {
                SegmentationNcaConfig::new()
                    .with_num_hidden_channels(args.common.hidden_channels)
                    .with_hidden_dim(args.common.hidden_dim)
                    .init(device)
            },
        )?;

        let mut run_log = context.run_logger("segmentation-kfold")?;
        persist::atomic_write_json(&run_log.dir().join("cross_validation.json"), &cv)?;
        run_log.text("aggregate", &format_aggregate(&cv))?;
        println!("{}", format_aggregate(&cv));
        return Ok(());
    }

    let nca = SegmentationNcaConfig::new()
        .with_num_hidden_channels(args.common.hidden_channels)
        .with_hidden_dim(args.common.hidden_dim)
        .init::<B>(&device)?;

    let (train_idx, val_idx) = train_val_split(args.samples, args.val_fraction, context.seed)?;
    let train_set = subset(&dataset, &train_idx)?;
    let val_set = subset(&dataset, &val_idx)?;

    let mut run_log = context.run_logger("segmentation")?;
    let trainer = NcaTrainer::new(config).with_weights_path(context.weights_path("segmentation"));
    let hooks = TrainHooks {
        pool: None,
        early_stopping: None,
        cascade: cascade.as_ref(),
        run_log: Some(&mut run_log),
    };
    let outcome = trainer.train(nca, &device, &train_set, Some(&val_set), None, hooks)?;
    finish_run(context, &mut run_log, "loss/train_bce", "segmentation", &outcome, &json!({
        "epochs": args.common.epochs,
        "hidden_channels": args.common.hidden_channels,
        "samples": args.samples,
        "size": args.size,
        "cascade": !args.no_cascade,
    }))
}

fn run_depth(context: &TaskContext, args: DepthArgs) -> anyhow::Result<()> {
    let device = compute_device(args.common.device_request());
    fix_random_seed::<B>(context.seed);

    let dataset = synthetic::depth_dataset(args.samples, args.size, args.size, context.seed)?;
    let cascade = if args.no_cascade {
        None
    } else {
        Some(Cascade::new(vec![2, 1], vec![30, 20])?)
    };

    let nca = DepthNcaConfig::new()
        .with_num_hidden_channels(args.common.hidden_channels)
        .with_hidden_dim(args.common.hidden_dim)
        .init::<B>(&device)?;

    let (train_idx, val_idx) = train_val_split(args.samples, args.val_fraction, context.seed)?;
    let train_set = subset(&dataset, &train_idx)?;
    let val_set = subset(&dataset, &val_idx)?;

    let mut config = context.trainer_config(args.common.epochs, args.common.batch_size);
    config.lr = args.common.lr.or(config.lr);

    let mut run_log = context.run_logger("depth")?;
    let trainer = NcaTrainer::new(config).with_weights_path(context.weights_path("depth"));
    let hooks = TrainHooks {
        pool: None,
        early_stopping: None,
        cascade: cascade.as_ref(),
        run_log: Some(&mut run_log),
    };
    let outcome = trainer.train(nca, &device, &train_set, Some(&val_set), None, hooks)?;
    finish_run(context, &mut run_log, "loss/train_mse", "depth", &outcome, &json!({
        "epochs": args.common.epochs,
        "hidden_channels": args.common.hidden_channels,
        "samples": args.samples,
        "size": args.size,
        "cascade": !args.no_cascade,
    }))
}

fn run_classification(context: &TaskContext, args: ClassificationArgs) -> anyhow::Result<()> {
    let device = compute_device(args.common.device_request());
    fix_random_seed::<B>(context.seed);

    let dataset = synthetic::classification_dataset(
        args.samples,
        args.size,
        args.size,
        args.classes,
        context.seed,
    )?;

    let nca = ClassificationNcaConfig::new(args.classes)
        .with_num_hidden_channels(args.common.hidden_channels)
        .with_hidden_dim(args.common.hidden_dim)
        .init::<B>(&device)?;

    let (train_idx, val_idx) = train_val_split(args.samples, args.val_fraction, context.seed)?;
    let train_set = subset(&dataset, &train_idx)?;
    let val_set = subset(&dataset, &val_idx)?;

    let mut config = context.trainer_config(args.common.epochs, args.common.batch_size);
    config.lr = args.common.lr.or(config.lr);

    let mut run_log = context.run_logger("classification")?;
    let trainer =
        NcaTrainer::new(config).with_weights_path(context.weights_path("classification"));
    let hooks = TrainHooks {
        pool: None,
        early_stopping: None,
        cascade: None,
        run_log: Some(&mut run_log),
    };
    let outcome = trainer.train(nca, &device, &train_set, Some(&val_set), None, hooks)?;
    finish_run(
        context,
        &mut run_log,
        "loss/train_cross_entropy",
        "classification",
        &outcome,
        &json!({
            "epochs": args.common.epochs,
            "hidden_channels": args.common.hidden_channels,
            "classes": args.classes,
            "samples": args.samples,
            "size": args.size,
        }),
    )
}

/// Shared run epilogue: summary artifact, loss curve, experiment record.
fn finish_run<M>(
    context: &TaskContext,
    run_log: &mut ncalab::RunLogger,
    loss_tag: &str,
    task: &str,
    outcome: &TrainOutcome<M>,
    hyperparams: &serde_json::Value,
) -> anyhow::Result<()> {
    persist::atomic_write_json(&run_log.dir().join("summary.json"), &outcome.summary)?;
    run_log.export_curve(loss_tag)?;

    let experiment =
        Experiment::new(task, task, context.seed).with_hyperparams(hyperparams)?;
    context.record_experiment(experiment, &outcome.summary)?;

    println!("{}", outcome.summary.to_markdown());
    Ok(())
}

/// Clone the samples at `indices` into a standalone dataset.
fn subset(
    dataset: &InMemDataset<GridSample>,
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

fn format_aggregate(cv: &ncalab::training::CrossValidation) -> String {
    let mut out = String::from("K-Fold Results\n--------------\n");
    for (name, (mean, std)) in cv.aggregate() {
        out.push_str(&format!("**{name}:** {mean:.5} +/- {std:.5}\n"));
    }
    out
}

fn load_rgba_target(path: &Path, size: usize) -> anyhow::Result<Vec<f32>> {
    let img = image::open(path)?
        .resize_exact(size as u32, size as u32, image::imageops::FilterType::CatmullRom)
        .to_rgba8();
    let plane = size * size;
    let mut buffer = vec![0.0f32; 4 * plane];
    for (x, y, pixel) in img.enumerate_pixels() {
        let index = y as usize * size + x as usize;
        for (channel, value) in pixel.0.iter().enumerate() {
            buffer[channel * plane + index] = f32::from(*value) / 255.0;
        }
    }
    Ok(buffer)
}
