//! Synthetic training loop that exercises a live plot end to end

use anyhow::{Context, Result, bail};
use liveplot_core::{Canvas, HeadlessCanvas, LivePlot, PlotConfig, save_metrics};
use std::path::PathBuf;
use tracing::info;

use crate::canvas::TextCanvas;

pub struct SimulateOptions {
  pub epochs: usize,
  pub batches_per_epoch: usize,
  pub test_batches: usize,
  pub batch_size: f64,
  pub metrics: Vec<String>,
  pub output: PathBuf,
  pub quiet: bool,
}

/// Deterministic value of `metric` after `step` of `total_steps` batches.
///
/// Names mentioning accuracy rise towards 1, everything else decays towards a
/// small floor. A bounded oscillation keeps batch curves from being perfectly
/// smooth.
pub(crate) fn synthetic_value(metric: &str, step: usize, total_steps: usize) -> f64 {
  let progress = step as f64 / total_steps.max(1) as f64;
  let decay = (-3.0 * progress).exp();
  let noise = 0.02 * (step as f64 * 1.7).sin();
  if metric.contains("acc") {
    (1.0 - 0.9 * decay + noise).clamp(0.0, 1.0)
  } else {
    0.05 + decay + noise
  }
}

pub fn cmd_simulate(options: SimulateOptions, plot_config: PlotConfig) -> Result<()> {
  if options.metrics.is_empty() {
    bail!("At least one metric name is required");
  }

  let canvas: Box<dyn Canvas> = if options.quiet {
    Box::new(HeadlessCanvas::new())
  } else {
    Box::new(TextCanvas::new(std::io::stdout()))
  };
  let mut plot = LivePlot::new(options.metrics.iter().cloned(), plot_config, canvas)
    .context("Failed to create live plot")?;

  let total_steps = options.epochs * options.batches_per_epoch;
  let mut step = 0;
  for epoch in 0..options.epochs {
    for _ in 0..options.batches_per_epoch {
      let values = options
        .metrics
        .iter()
        .map(|name| (name.as_str(), synthetic_value(name, step, total_steps)));
      plot.set_train_batch(values, options.batch_size, true)?;
      step += 1;
    }
    plot.plot_train_epoch()?;

    if options.test_batches > 0 {
      for i in 0..options.test_batches {
        // Test metrics trail the training curve slightly.
        let values = options
          .metrics
          .iter()
          .map(|name| (name.as_str(), synthetic_value(name, step.saturating_sub(i + 1), total_steps) * 1.05));
        plot.set_test_batch(values, options.batch_size)?;
      }
      plot.plot_test_epoch()?;
    }
    info!(epoch = epoch + 1, "Epoch finished");
  }

  save_metrics(&options.output, &plot)
    .with_context(|| format!("Failed to save metrics to {:?}", options.output))?;

  let scheduler = plot.scheduler();
  println!(
    "Saved {} to {:?}: {} redraws, {:.2}% of time spent plotting",
    options.metrics.join(", "),
    options.output,
    scheduler.redraw_count(),
    scheduler.fraction_spent_plotting() * 100.0
  );
  Ok(())
}
