//! Batch/epoch metric aggregation for live training plots.
//!
//! Values arrive per batch, are weighted by batch size and collapsed into one
//! point per epoch. Redraws are throttled to a share of wall-clock time, and
//! the full state can be saved to and restored from a flat archive.

mod aggregator;
pub mod archive;
pub mod config;
mod error;
mod metric;
mod plot;
mod scheduler;
mod snapshot;

pub use aggregator::{Aggregator, MetricBuffers};
pub use archive::{choose_separator, load_metrics, save_metrics};
pub use config::{Config, LoggingConfig, PlotConfig};
pub use error::{LivePlotError, Result};
pub use metric::MetricBuffer;
pub use plot::{Canvas, HeadlessCanvas, LivePlot, PlotLayout, create_plot};
pub use scheduler::RedrawScheduler;
pub use snapshot::{MetricMap, MetricRecord, MetricSource, MetricsSnapshot, Split};
