//! Adaptive redraw throttling.
//!
//! Keeps the share of wall-clock time spent repainting under a ceiling by
//! projecting the cost of the next repaint from the last measured one.

use std::time::Duration;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct RedrawScheduler {
  max_fraction_spent_plotting: f64,
  /// Compute time accumulated since the last repaint
  compute_since_redraw: Duration,
  compute_total: Duration,
  redraw_total: Duration,
  /// Duration of the previous repaint, used as the estimate for the next one
  last_redraw: Option<Duration>,
  redraw_count: u64,
}

impl RedrawScheduler {
  pub fn new(max_fraction_spent_plotting: f64) -> Self {
    Self {
      max_fraction_spent_plotting,
      compute_since_redraw: Duration::ZERO,
      compute_total: Duration::ZERO,
      redraw_total: Duration::ZERO,
      last_redraw: None,
      redraw_count: 0,
    }
  }

  /// Account for `compute_duration` of work and decide whether to repaint now.
  pub fn should_redraw(&mut self, compute_duration: Duration) -> bool {
    self.record_compute(compute_duration);

    let Some(estimate) = self.last_redraw else {
      // No cost measured yet: the first repaint establishes the baseline.
      return true;
    };

    let max = self.max_fraction_spent_plotting;
    if max >= 1.0 {
      return true;
    }
    if max.is_nan() || max <= 0.0 {
      return false;
    }

    let redraw = (self.redraw_total + estimate).as_secs_f64();
    let overall = redraw + self.compute_total.as_secs_f64();
    let projected = if overall > 0.0 { redraw / overall } else { 0.0 };
    let decision = projected <= max;
    trace!(
      projected,
      max,
      compute_since_redraw_ms = self.compute_since_redraw.as_secs_f64() * 1e3,
      decision,
      "Redraw decision"
    );
    decision
  }

  /// Account for work that did not ask for a repaint.
  pub fn record_compute(&mut self, compute_duration: Duration) {
    self.compute_since_redraw += compute_duration;
    self.compute_total += compute_duration;
  }

  /// Report the measured duration of a repaint that was just performed.
  pub fn record_redraw(&mut self, duration: Duration) {
    self.redraw_total += duration;
    self.last_redraw = Some(duration);
    self.redraw_count += 1;
    self.compute_since_redraw = Duration::ZERO;
  }

  /// Historical share of time spent repainting (0 before anything is measured)
  pub fn fraction_spent_plotting(&self) -> f64 {
    let redraw = self.redraw_total.as_secs_f64();
    let overall = redraw + self.compute_total.as_secs_f64();
    if overall > 0.0 { redraw / overall } else { 0.0 }
  }

  pub fn max_fraction_spent_plotting(&self) -> f64 {
    self.max_fraction_spent_plotting
  }

  pub fn redraw_count(&self) -> u64 {
    self.redraw_count
  }

  pub fn compute_since_redraw(&self) -> Duration {
    self.compute_since_redraw
  }

  pub fn total_redraw_time(&self) -> Duration {
    self.redraw_total
  }

  pub fn total_compute_time(&self) -> Duration {
    self.compute_total
  }
}

impl Default for RedrawScheduler {
  fn default() -> Self {
    Self::new(crate::config::DEFAULT_MAX_FRACTION_SPENT_PLOTTING)
  }
}
