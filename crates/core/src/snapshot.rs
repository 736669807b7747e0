//! Plain-data views of metric buffers, shared by the aggregator and the archive codec.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LivePlotError;

/// Logical partition of observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
  Train,
  Test,
}

impl Split {
  pub const ALL: [Split; 2] = [Split::Train, Split::Test];

  pub fn as_str(&self) -> &'static str {
    match self {
      Split::Train => "train",
      Split::Test => "test",
    }
  }
}

impl fmt::Display for Split {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Split {
  type Err = LivePlotError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "train" => Ok(Split::Train),
      "test" => Ok(Split::Test),
      other => Err(LivePlotError::Config(format!("unknown split '{other}' (expected 'train' or 'test')"))),
    }
  }
}

/// Persisted state of a single metric buffer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
  pub batch_data: Vec<f64>,
  pub epoch_data: Vec<f64>,
  /// 1-based batch index at which each epoch boundary fell
  pub epoch_domain: Vec<u64>,
  pub cnt_since_epoch: u64,
  pub total_weighting: f64,
  pub running_weighted_sum: f64,
}

/// Metric name -> record, in insertion order
pub type MetricMap = IndexMap<String, MetricRecord>;

/// Full state of both splits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
  pub train: MetricMap,
  pub test: MetricMap,
}

impl MetricsSnapshot {
  pub fn new(train: MetricMap, test: MetricMap) -> Self {
    Self { train, test }
  }

  pub fn split(&self, split: Split) -> &MetricMap {
    match split {
      Split::Train => &self.train,
      Split::Test => &self.test,
    }
  }

  pub fn split_mut(&mut self, split: Split) -> &mut MetricMap {
    match split {
      Split::Train => &mut self.train,
      Split::Test => &mut self.test,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.train.is_empty() && self.test.is_empty()
  }

  /// Metric names across both splits, train first, without duplicates
  pub fn metric_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.train.keys().cloned().collect();
    for name in self.test.keys() {
      if !self.train.contains_key(name) {
        names.push(name.clone());
      }
    }
    names
  }
}

/// Anything whose metrics can be persisted to an archive
pub trait MetricSource {
  fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl MetricSource for MetricsSnapshot {
  fn metrics_snapshot(&self) -> MetricsSnapshot {
    self.clone()
  }
}
