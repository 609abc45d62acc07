//! Export a rollout GIF from saved growing weights.

use std::path::PathBuf;

use clap::Args;

use ncalab::device::{compute_device, fix_random_seed, DefaultBackend, DeviceRequest};
use ncalab::model::{load_weights, GrowingNcaConfig};
use ncalab::viz;

use super::TaskContext;

type B = DefaultBackend;

#[derive(Args, Debug)]
pub struct GifArgs {
    /// Growing-NCA weights file
    #[arg(long)]
    pub weights: PathBuf,

    /// Output GIF path
    #[arg(short, long, default_value = "rollout.gif")]
    pub out: PathBuf,

    /// Hidden channels used at training time
    #[arg(short = 'H', long, default_value_t = 12)]
    pub hidden_channels: usize,

    /// Width of the update network used at training time
    #[arg(long, default_value_t = 128)]
    pub hidden_dim: usize,

    /// Grid side length
    #[arg(long, default_value_t = 32)]
    pub size: usize,

    /// Rollout steps
    #[arg(long, default_value_t = 200)]
    pub steps: usize,

    /// Capture a frame every N steps
    #[arg(long, default_value_t = 4)]
    pub every: usize,
}

pub fn run(context: &TaskContext, args: GifArgs) -> anyhow::Result<()> {
    let device = compute_device(DeviceRequest::Cpu);
    fix_random_seed::<B>(context.seed);

    let nca = GrowingNcaConfig::new()
        .with_num_hidden_channels(args.hidden_channels)
        .with_hidden_dim(args.hidden_dim)
        .init::<B>(&device)?;
    let nca = load_weights(nca, &args.weights, &device)?;

    let seed = nca.seed(1, args.size, args.size, &device);
    let written = viz::export_rollout_gif(&nca, seed, args.steps, args.every, &args.out)?;
    tracing::info!(gif = %written.display(), steps = args.steps, "rollout exported");
    println!("wrote {}", written.display());
    Ok(())
}
