//! Live plot driver: routes batches into an [`Aggregator`] and repaints a
//! [`Canvas`] whenever the [`RedrawScheduler`] allows it.

use std::time::{Duration, Instant};
use tracing::debug;

use crate::aggregator::Aggregator;
use crate::config::PlotConfig;
use crate::error::{LivePlotError, Result};
use crate::scheduler::RedrawScheduler;
use crate::snapshot::{MetricSource, MetricsSnapshot, Split};

/// Inches per grid column when no figure size is configured
const INCHES_PER_COLUMN: f64 = 6.0;
/// Inches per grid row when no figure size is configured
const INCHES_PER_ROW: f64 = 4.0;

/// Grid of subplots, one cell per declared metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotLayout {
  pub nrows: usize,
  pub ncols: usize,
  /// (width, height) in inches
  pub figsize: (f64, f64),
}

impl PlotLayout {
  /// Fill in whatever the caller left unset.
  ///
  /// `ncols` defaults to 1 and `nrows` to as many rows as the metrics need.
  /// A grid with fewer cells than metrics is rejected.
  pub fn resolve(
    num_metrics: usize,
    nrows: Option<usize>,
    ncols: Option<usize>,
    figsize: Option<(f64, f64)>,
  ) -> Result<Self> {
    let ncols = ncols.unwrap_or(1);
    if ncols == 0 {
      return Err(LivePlotError::InvalidLayout("ncols must be at least 1".to_string()));
    }
    let nrows = nrows.unwrap_or_else(|| num_metrics.div_ceil(ncols).max(1));
    if nrows == 0 {
      return Err(LivePlotError::InvalidLayout("nrows must be at least 1".to_string()));
    }
    let cells = nrows
      .checked_mul(ncols)
      .ok_or_else(|| LivePlotError::InvalidLayout(format!("{nrows}x{ncols} grid is too large")))?;
    if cells < num_metrics {
      return Err(LivePlotError::InvalidLayout(format!(
        "{nrows}x{ncols} grid cannot hold {num_metrics} metrics"
      )));
    }

    let figsize =
      figsize.unwrap_or((ncols as f64 * INCHES_PER_COLUMN, nrows as f64 * INCHES_PER_ROW));
    Ok(Self { nrows, ncols, figsize })
  }

  pub fn from_config(num_metrics: usize, config: &PlotConfig) -> Result<Self> {
    Self::resolve(num_metrics, config.nrows, Some(config.ncols), config.figsize)
  }

  /// (row, column) of the `index`-th metric, filled row by row
  pub fn cell(&self, index: usize) -> (usize, usize) {
    (index / self.ncols, index % self.ncols)
  }
}

/// Rendering backend for a live plot.
///
/// `draw` is handed the full aggregator on every repaint; how each metric's
/// batch and epoch series are presented is up to the implementation.
pub trait Canvas {
  fn draw(&mut self, metrics: &Aggregator, layout: &PlotLayout) -> Result<()>;
}

impl<C: Canvas + ?Sized> Canvas for Box<C> {
  fn draw(&mut self, metrics: &Aggregator, layout: &PlotLayout) -> Result<()> {
    (**self).draw(metrics, layout)
  }
}

impl<C: Canvas + ?Sized> Canvas for &mut C {
  fn draw(&mut self, metrics: &Aggregator, layout: &PlotLayout) -> Result<()> {
    (**self).draw(metrics, layout)
  }
}

/// Canvas that renders nothing and only counts repaints
#[derive(Debug, Clone, Default)]
pub struct HeadlessCanvas {
  draws: u64,
  last_layout: Option<PlotLayout>,
}

impl HeadlessCanvas {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn draw_count(&self) -> u64 {
    self.draws
  }

  pub fn last_layout(&self) -> Option<&PlotLayout> {
    self.last_layout.as_ref()
  }
}

impl Canvas for HeadlessCanvas {
  fn draw(&mut self, _metrics: &Aggregator, layout: &PlotLayout) -> Result<()> {
    self.draws += 1;
    self.last_layout = Some(*layout);
    Ok(())
  }
}

pub struct LivePlot<C: Canvas> {
  aggregator: Aggregator,
  scheduler: RedrawScheduler,
  layout: PlotLayout,
  canvas: C,
  /// When control last went back to the training loop
  last_returned: Instant,
}

impl<C: Canvas> LivePlot<C> {
  pub fn new<I, S>(metric_names: I, config: PlotConfig, canvas: C) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::with_aggregator(Aggregator::new(metric_names), &config, canvas)
  }

  /// Continue plotting from previously saved metrics.
  pub fn restore(snapshot: MetricsSnapshot, config: PlotConfig, canvas: C) -> Result<Self> {
    Self::with_aggregator(Aggregator::from_snapshot(snapshot)?, &config, canvas)
  }

  fn with_aggregator(aggregator: Aggregator, config: &PlotConfig, canvas: C) -> Result<Self> {
    let max = config.max_fraction_spent_plotting;
    if max.is_nan() || max < 0.0 {
      return Err(LivePlotError::Config(format!(
        "max_fraction_spent_plotting must be a non-negative number, got {max}"
      )));
    }
    let layout = PlotLayout::from_config(aggregator.metric_names().len(), config)?;
    debug!(
      metrics = aggregator.metric_names().len(),
      nrows = layout.nrows,
      ncols = layout.ncols,
      max_fraction_spent_plotting = max,
      "Live plot created"
    );

    Ok(Self {
      aggregator,
      scheduler: RedrawScheduler::new(max),
      layout,
      canvas,
      last_returned: Instant::now(),
    })
  }

  /// Record a training batch and, if `plot` is set, repaint when the time
  /// budget allows. Returns whether a repaint happened.
  pub fn set_train_batch<I, K>(&mut self, values: I, batch_size: f64, plot: bool) -> Result<bool>
  where
    I: IntoIterator<Item = (K, f64)>,
    K: AsRef<str>,
  {
    let compute = self.last_returned.elapsed();
    let result = self.record_and_maybe_redraw(Split::Train, values, batch_size, plot, compute);
    self.last_returned = Instant::now();
    result
  }

  /// Record a test batch. Test batches never trigger a repaint on their own.
  pub fn set_test_batch<I, K>(&mut self, values: I, batch_size: f64) -> Result<()>
  where
    I: IntoIterator<Item = (K, f64)>,
    K: AsRef<str>,
  {
    let compute = self.last_returned.elapsed();
    let result = self
      .record_and_maybe_redraw(Split::Test, values, batch_size, false, compute)
      .map(|_| ());
    self.last_returned = Instant::now();
    result
  }

  /// Close the training epoch and repaint.
  pub fn plot_train_epoch(&mut self) -> Result<()> {
    self.commit_and_redraw(Split::Train)
  }

  /// Close the test epoch and repaint.
  pub fn plot_test_epoch(&mut self) -> Result<()> {
    self.commit_and_redraw(Split::Test)
  }

  /// Repaint unconditionally.
  pub fn plot(&mut self) -> Result<()> {
    self.scheduler.record_compute(self.last_returned.elapsed());
    let result = self.redraw();
    self.last_returned = Instant::now();
    result
  }

  fn record_and_maybe_redraw<I, K>(
    &mut self,
    split: Split,
    values: I,
    batch_size: f64,
    plot: bool,
    compute: Duration,
  ) -> Result<bool>
  where
    I: IntoIterator<Item = (K, f64)>,
    K: AsRef<str>,
  {
    if let Err(e) = self.aggregator.set_batch(split, values, batch_size, None) {
      self.scheduler.record_compute(compute);
      return Err(e);
    }
    if !plot {
      self.scheduler.record_compute(compute);
      return Ok(false);
    }
    if !self.scheduler.should_redraw(compute) {
      return Ok(false);
    }
    self.redraw()?;
    Ok(true)
  }

  fn commit_and_redraw(&mut self, split: Split) -> Result<()> {
    self.scheduler.record_compute(self.last_returned.elapsed());
    let result = self.aggregator.commit_epoch(split).and_then(|_| self.redraw());
    self.last_returned = Instant::now();
    result
  }

  fn redraw(&mut self) -> Result<()> {
    let started = Instant::now();
    self.canvas.draw(&self.aggregator, &self.layout)?;
    self.scheduler.record_redraw(started.elapsed());
    Ok(())
  }

  pub fn aggregator(&self) -> &Aggregator {
    &self.aggregator
  }

  pub fn scheduler(&self) -> &RedrawScheduler {
    &self.scheduler
  }

  pub fn layout(&self) -> &PlotLayout {
    &self.layout
  }

  pub fn canvas(&self) -> &C {
    &self.canvas
  }

  pub fn canvas_mut(&mut self) -> &mut C {
    &mut self.canvas
  }

  pub fn into_parts(self) -> (Aggregator, C) {
    (self.aggregator, self.canvas)
  }
}

impl<C: Canvas> MetricSource for LivePlot<C> {
  fn metrics_snapshot(&self) -> MetricsSnapshot {
    self.aggregator.snapshot()
  }
}

/// Build a [`LivePlot`] from a config section.
pub fn create_plot<I, S, C>(metric_names: I, config: &PlotConfig, canvas: C) -> Result<LivePlot<C>>
where
  I: IntoIterator<Item = S>,
  S: Into<String>,
  C: Canvas,
{
  LivePlot::new(metric_names, config.clone(), canvas)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn config(max_fraction_spent_plotting: f64) -> PlotConfig {
    PlotConfig {
      max_fraction_spent_plotting,
      ..Default::default()
    }
  }

  struct FailingCanvas;

  impl Canvas for FailingCanvas {
    fn draw(&mut self, _metrics: &Aggregator, _layout: &PlotLayout) -> Result<()> {
      Err(LivePlotError::Render("display closed".to_string()))
    }
  }

  #[test]
  fn test_layout_defaults() {
    let layout = PlotLayout::resolve(3, None, None, None).unwrap();
    assert_eq!(layout, PlotLayout {
      nrows: 3,
      ncols: 1,
      figsize: (6.0, 12.0),
    });

    let layout = PlotLayout::resolve(5, None, Some(2), None).unwrap();
    assert_eq!((layout.nrows, layout.ncols), (3, 2));
    assert_eq!(layout.figsize, (12.0, 12.0));
    assert_eq!(layout.cell(3), (1, 1));
    assert_eq!(layout.cell(4), (2, 0));
  }

  #[test]
  fn test_layout_explicit_values() {
    let layout = PlotLayout::resolve(2, Some(1), Some(2), Some((8.0, 3.0))).unwrap();
    assert_eq!(layout, PlotLayout {
      nrows: 1,
      ncols: 2,
      figsize: (8.0, 3.0),
    });
  }

  #[test]
  fn test_layout_without_metrics_has_one_cell() {
    let layout = PlotLayout::resolve(0, None, None, None).unwrap();
    assert_eq!((layout.nrows, layout.ncols), (1, 1));
  }

  #[test]
  fn test_layout_rejects_small_grid() {
    assert!(matches!(
      PlotLayout::resolve(5, Some(2), Some(2), None),
      Err(LivePlotError::InvalidLayout(_))
    ));
    assert!(matches!(
      PlotLayout::resolve(1, None, Some(0), None),
      Err(LivePlotError::InvalidLayout(_))
    ));
  }

  #[test]
  fn test_layout_rejects_overflowing_grid() {
    assert!(matches!(
      PlotLayout::resolve(1, Some(usize::MAX), Some(2), None),
      Err(LivePlotError::InvalidLayout(_))
    ));
  }

  #[test]
  fn test_failed_batch_still_counts_compute_time() {
    let mut plot = LivePlot::new(["loss"], config(0.05), HeadlessCanvas::new()).unwrap();
    std::thread::sleep(Duration::from_millis(5));
    assert!(plot.set_train_batch([("loss", 1.0)], -1.0, true).is_err());
    assert!(plot.scheduler().total_compute_time() >= Duration::from_millis(5));
    assert_eq!(plot.scheduler().redraw_count(), 0);
  }

  #[test]
  fn test_full_budget_redraws_every_plotted_batch() {
    let mut plot = LivePlot::new(["loss"], config(1.0), HeadlessCanvas::new()).unwrap();
    for i in 0..10 {
      assert!(plot.set_train_batch([("loss", i as f64)], 1.0, true).unwrap());
    }
    assert_eq!(plot.canvas().draw_count(), 10);
    assert_eq!(plot.scheduler().redraw_count(), 10);
  }

  #[test]
  fn test_zero_budget_only_draws_baseline_and_epochs() {
    let mut plot = LivePlot::new(["loss"], config(0.0), HeadlessCanvas::new()).unwrap();
    let drawn: Vec<bool> = (0..5)
      .map(|i| plot.set_train_batch([("loss", i as f64)], 1.0, true).unwrap())
      .collect();
    assert_eq!(drawn, vec![true, false, false, false, false]);

    plot.plot_train_epoch().unwrap();
    plot.set_test_batch([("loss", 0.5)], 1.0).unwrap();
    plot.plot_test_epoch().unwrap();
    plot.plot().unwrap();
    assert_eq!(plot.canvas().draw_count(), 4);
  }

  #[test]
  fn test_unplotted_batches_never_draw() {
    let mut plot = LivePlot::new(["loss"], config(1.0), HeadlessCanvas::new()).unwrap();
    for _ in 0..5 {
      assert!(!plot.set_train_batch([("loss", 1.0)], 1.0, false).unwrap());
    }
    assert_eq!(plot.canvas().draw_count(), 0);
    assert_eq!(plot.aggregator().metric(Split::Train, "loss").unwrap().len(), 5);
  }

  #[test]
  fn test_epochs_are_committed_before_drawing() {
    let mut plot = LivePlot::new(["loss", "accuracy"], config(0.05), HeadlessCanvas::new()).unwrap();
    plot.set_train_batch([("loss", 4.0), ("accuracy", 0.5)], 2.0, false).unwrap();
    plot.set_train_batch([("loss", 2.0), ("accuracy", 1.0)], 2.0, false).unwrap();
    plot.plot_train_epoch().unwrap();

    let loss = plot.aggregator().metric(Split::Train, "loss").unwrap();
    assert_eq!(loss.epoch_data(), &[3.0]);
    assert_eq!(loss.epoch_domain(), &[2]);
    assert_eq!(plot.canvas().draw_count(), 1);
    assert_eq!(plot.canvas().last_layout().map(|l| l.nrows), Some(2));
  }

  #[test]
  fn test_invalid_weight_does_not_draw() {
    let mut plot = LivePlot::new(["loss"], config(1.0), HeadlessCanvas::new()).unwrap();
    let err = plot.set_train_batch([("loss", 1.0)], 0.0, true).unwrap_err();
    assert!(matches!(err, LivePlotError::InvalidWeight { .. }));
    assert_eq!(plot.canvas().draw_count(), 0);
  }

  #[test]
  fn test_render_errors_propagate() {
    let mut plot = LivePlot::new(["loss"], config(1.0), FailingCanvas).unwrap();
    plot.set_train_batch([("loss", 1.0)], 1.0, false).unwrap();
    assert!(matches!(plot.plot_train_epoch(), Err(LivePlotError::Render(_))));
    // The epoch is still committed.
    assert_eq!(plot.aggregator().metric(Split::Train, "loss").unwrap().epoch_data(), &[1.0]);
  }

  #[test]
  fn test_rejects_negative_budget() {
    assert!(matches!(
      LivePlot::new(["loss"], config(-0.1), HeadlessCanvas::new()),
      Err(LivePlotError::Config(_))
    ));
  }

  #[test]
  fn test_create_plot_uses_config_layout() {
    let config = PlotConfig {
      ncols: 2,
      ..Default::default()
    };
    let plot = create_plot(["a", "b", "c"], &config, HeadlessCanvas::new()).unwrap();
    assert_eq!((plot.layout().nrows, plot.layout().ncols), (2, 2));
    assert_eq!(plot.scheduler().max_fraction_spent_plotting(), 0.05);
  }

  #[test]
  fn test_restore_continues_from_snapshot() {
    let mut plot = LivePlot::new(["loss"], config(0.05), HeadlessCanvas::new()).unwrap();
    plot.set_train_batch([("loss", 1.0)], 1.0, false).unwrap();
    plot.plot_train_epoch().unwrap();
    plot.set_train_batch([("loss", 5.0)], 1.0, false).unwrap();

    let mut resumed = LivePlot::restore(plot.metrics_snapshot(), config(0.05), HeadlessCanvas::new()).unwrap();
    resumed.set_train_batch([("loss", 7.0)], 1.0, false).unwrap();
    resumed.plot_train_epoch().unwrap();

    let loss = resumed.aggregator().metric(Split::Train, "loss").unwrap();
    assert_eq!(loss.epoch_data(), &[1.0, 6.0]);
    assert_eq!(loss.epoch_domain(), &[1, 3]);
  }

  #[test]
  fn test_boxed_canvas() {
    let canvas: Box<dyn Canvas> = Box::new(HeadlessCanvas::new());
    let mut plot = LivePlot::new(["loss"], config(1.0), canvas).unwrap();
    plot.plot().unwrap();
    assert_eq!(plot.scheduler().redraw_count(), 1);
  }
}
