//! Shared helpers for liveplot-core integration tests

#![allow(dead_code)]

use liveplot_core::{HeadlessCanvas, LivePlot, PlotConfig};

/// Deterministic loss for batch `step`: decays towards zero
pub fn loss_at(step: usize) -> f64 {
  1.0 / (1.0 + step as f64 * 0.1)
}

/// Deterministic accuracy for batch `step`: rises towards one
pub fn accuracy_at(step: usize) -> f64 {
  1.0 - 0.5 * loss_at(step)
}

/// Drive a plot through `epochs` epochs of `batches` train batches and one test batch each.
pub fn run_session(epochs: usize, batches: usize, batch_size: f64) -> LivePlot<HeadlessCanvas> {
  let mut plot = LivePlot::new(["loss", "accuracy"], PlotConfig::default(), HeadlessCanvas::new())
    .expect("default config is valid");

  let mut step = 0;
  for _ in 0..epochs {
    for _ in 0..batches {
      plot
        .set_train_batch([("loss", loss_at(step)), ("accuracy", accuracy_at(step))], batch_size, true)
        .expect("train batch");
      step += 1;
    }
    plot.plot_train_epoch().expect("train epoch");

    plot
      .set_test_batch([("loss", loss_at(step) * 1.1), ("accuracy", accuracy_at(step) * 0.9)], batch_size)
      .expect("test batch");
    plot.plot_test_epoch().expect("test epoch");
  }
  plot
}
