//! liveplot CLI - batch/epoch metric aggregation with throttled live redraws

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use liveplot_core::Config;
use std::path::PathBuf;

mod canvas;
mod commands;
mod logging;

use commands::{SimulateOptions, cmd_config_init, cmd_config_show, cmd_show, cmd_simulate};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "liveplot")]
#[command(about = "Aggregate training metrics per batch and epoch, with throttled live redraws")]
#[command(after_help = "\
QUICK START:
  liveplot config init                       # Write .liveplot.toml
  liveplot simulate --output run.safetensors # Synthetic training run
  liveplot show run.safetensors              # Summarize a saved archive")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `liveplot config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show effective configuration
  Show,
  /// Create .liveplot.toml in the current directory
  Init {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
}

#[derive(Subcommand)]
enum Commands {
  /// Run a synthetic training loop against a live plot and save its metrics
  Simulate {
    #[arg(long, default_value = "5")]
    epochs: usize,
    #[arg(long, default_value = "50")]
    batches_per_epoch: usize,
    /// Test batches evaluated after each training epoch
    #[arg(long, default_value = "5")]
    test_batches: usize,
    #[arg(long, default_value = "32")]
    batch_size: f64,
    /// Comma-separated metric names
    #[arg(long, value_delimiter = ',', default_value = "loss,accuracy")]
    metrics: Vec<String>,
    /// Override plot.max_fraction_spent_plotting
    #[arg(long)]
    max_fraction: Option<f64>,
    /// Archive to write
    #[arg(short, long, default_value = "metrics.safetensors")]
    output: PathBuf,
    /// Do not print redraws
    #[arg(short, long)]
    quiet: bool,
  },
  /// Summarize a saved metrics archive
  Show {
    /// Archive to read
    file: PathBuf,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Manage configuration
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let cwd = std::env::current_dir().context("Failed to read current directory")?;
  let config = Config::load_for_dir(&cwd);
  init_logging(&config.logging.level);

  match cli.command {
    Commands::Simulate {
      epochs,
      batches_per_epoch,
      test_batches,
      batch_size,
      metrics,
      max_fraction,
      output,
      quiet,
    } => {
      let mut plot_config = config.plot;
      if let Some(max_fraction) = max_fraction {
        plot_config.max_fraction_spent_plotting = max_fraction;
      }
      let options = SimulateOptions {
        epochs,
        batches_per_epoch,
        test_batches,
        batch_size,
        metrics,
        output,
        quiet,
      };
      cmd_simulate(options, plot_config)
    }
    Commands::Show { file, json } => cmd_show(&file, json),
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show(&cwd),
      ConfigCommand::Init { force } => cmd_config_init(&cwd, force),
    },
  }
}
