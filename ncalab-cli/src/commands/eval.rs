//! Evaluate saved weights on a synthetic holdout.

use std::path::PathBuf;

use clap::{Args, ValueEnum};

use ncalab::data::synthetic;
use ncalab::device::{compute_device, fix_random_seed, DefaultBackend, DeviceRequest};
use ncalab::model::{
    load_weights, ClassificationNcaConfig, DepthNcaConfig, GrowingNcaConfig, SegmentationNcaConfig,
};
use ncalab::training::evaluate;
use ncalab::Cascade;

use super::TaskContext;

type B = DefaultBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaskKind {
    Growing,
    Segmentation,
    Depth,
    Classification,
}

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Task flavor the weights belong to
    #[arg(value_enum)]
    pub task: TaskKind,

    /// Weights file produced by a training run
    #[arg(long)]
    pub weights: PathBuf,

    /// Hidden channels used at training time
    #[arg(short = 'H', long, default_value_t = 12)]
    pub hidden_channels: usize,

    /// Width of the update network used at training time
    #[arg(long, default_value_t = 128)]
    pub hidden_dim: usize,

    /// Glyph classes (classification only)
    #[arg(long, default_value_t = 4)]
    pub classes: usize,

    /// Grid side length
    #[arg(long, default_value_t = 32)]
    pub size: usize,

    /// Holdout samples
    #[arg(long, default_value_t = 32)]
    pub samples: usize,

    /// CA steps during evaluation
    #[arg(long, default_value_t = 100)]
    pub steps: usize,

    /// Evaluate through the task's cascade schedule
    #[arg(long)]
    pub cascade: bool,

    /// Try using the GPU if available
    #[arg(long)]
    pub gpu: bool,
}

pub fn run(context: &TaskContext, args: EvalArgs) -> anyhow::Result<()> {
    let request = if args.gpu {
        DeviceRequest::Gpu { index: 0 }
    } else {
        DeviceRequest::Cpu
    };
    let device = compute_device(request);
    fix_random_seed::<B>(context.seed);

    // A different generator seed than training keeps the holdout unseen.
    let holdout_seed = context.seed.wrapping_add(1);

    let metrics = match args.task {
        TaskKind::Growing => {
            let nca = GrowingNcaConfig::new()
                .with_num_hidden_channels(args.hidden_channels)
                .with_hidden_dim(args.hidden_dim)
                .init::<B>(&device)?;
            let nca = load_weights(nca, &args.weights, &device)?;
            let dataset = synthetic::growing_dataset(args.size, args.size, 8, None)?;
            evaluate::<B, _, _>(&nca, &device, &dataset, args.steps, None, 8)?
        }
        TaskKind::Segmentation => {
            let nca = SegmentationNcaConfig::new()
                .with_num_hidden_channels(args.hidden_channels)
                .with_hidden_dim(args.hidden_dim)
                .init::<B>(&device)?;
            let nca = load_weights(nca, &args.weights, &device)?;
            let dataset =
                synthetic::segmentation_dataset(args.samples, args.size, args.size, holdout_seed)?;
            let cascade = args
                .cascade
                .then(|| Cascade::new(vec![4, 2, 1], vec![20, 10, 10]))
                .transpose()?;
            evaluate::<B, _, _>(&nca, &device, &dataset, args.steps, cascade.as_ref(), 8)?
        }
        TaskKind::Depth => {
            let nca = DepthNcaConfig::new()
                .with_num_hidden_channels(args.hidden_channels)
                .with_hidden_dim(args.hidden_dim)
                .init::<B>(&device)?;
            let nca = load_weights(nca, &args.weights, &device)?;
            let dataset =
                synthetic::depth_dataset(args.samples, args.size, args.size, holdout_seed)?;
            let cascade = args
                .cascade
                .then(|| Cascade::new(vec![2, 1], vec![30, 20]))
                .transpose()?;
            evaluate::<B, _, _>(&nca, &device, &dataset, args.steps, cascade.as_ref(), 8)?
        }
        TaskKind::Classification => {
            let nca = ClassificationNcaConfig::new(args.classes)
                .with_num_hidden_channels(args.hidden_channels)
                .with_hidden_dim(args.hidden_dim)
                .init::<B>(&device)?;
            let nca = load_weights(nca, &args.weights, &device)?;
            let dataset = synthetic::classification_dataset(
                args.samples,
                args.size,
                args.size,
                args.classes,
                holdout_seed,
            )?;
            evaluate::<B, _, _>(&nca, &device, &dataset, args.steps, None, 8)?
        }
    };

    println!("Evaluation ({:?})", args.task);
    println!("----------------");
    for (name, value) in &metrics {
        println!("{name}: {value:.5}");
    }
    Ok(())
}
