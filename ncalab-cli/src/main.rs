//! ncalab CLI — task runner for Neural Cellular Automata experiments.
//!
//! Provides self-contained training tasks on synthetic data, evaluation of
//! saved weights and rollout GIF export.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// ncalab: train, evaluate and visualize Neural Cellular Automata
#[derive(Parser, Debug)]
#[command(name = "ncalab", version, about, long_about = None)]
struct Cli {
    /// Directory for run logs
    #[arg(long, default_value = "runs")]
    runs_dir: PathBuf,

    /// Directory for trained weights
    #[arg(long, default_value = "weights")]
    weights_dir: PathBuf,

    /// Directory for checkpoint manifests
    #[arg(long, default_value = "checkpoints")]
    checkpoints_dir: PathBuf,

    /// Random seed for reproducible runs
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Train an NCA task
    Train {
        #[command(subcommand)]
        task: commands::train::TrainTask,
    },
    /// Evaluate saved weights on a synthetic holdout
    Eval(commands::eval::EvalArgs),
    /// Export a rollout GIF from saved weights
    Gif(commands::gif::GifArgs),
}

const BANNER: &str = r"
             _       _
  _ __   ___| | __ _| |__
 | '_ \ / __| |/ _` | '_ \
 | | | | (__| | (_| | |_) |
 |_| |_|\___|_|\__,_|_.__/   neural cellular automata
";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::new(filter)))
        .init();

    println!("{BANNER}");

    let context = commands::TaskContext::new(
        cli.runs_dir,
        cli.weights_dir,
        cli.checkpoints_dir,
        cli.seed,
    );

    match cli.command {
        Commands::Train { task } => commands::train::run(&context, task),
        Commands::Eval(args) => commands::eval::run(&context, args),
        Commands::Gif(args) => commands::gif::run(&context, args),
    }
}
