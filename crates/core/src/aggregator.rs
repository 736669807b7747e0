//! Train/test collections of metric buffers.
//!
//! The aggregator owns one [`MetricBuffer`] per (split, metric) pair. Batches are
//! routed to the buffers by name; an epoch commit on a split collapses every
//! buffer's pending window independently, so metrics added mid-run keep their
//! own batch indexing.

use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::Result;
use crate::metric::{MetricBuffer, validate_weight};
use crate::snapshot::{MetricSource, MetricsSnapshot, Split};

pub type MetricBuffers = IndexMap<String, MetricBuffer>;

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
  metric_names: Vec<String>,
  train: MetricBuffers,
  test: MetricBuffers,
  warned: HashSet<(Split, String)>,
}

impl Aggregator {
  /// Create an aggregator for a declared set of metric names.
  ///
  /// Buffers are created on first observation, so a metric that only ever shows
  /// up in one split never gets an empty buffer in the other.
  pub fn new<I, S>(metric_names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut names: Vec<String> = Vec::new();
    for name in metric_names {
      let name = name.into();
      if !names.contains(&name) {
        names.push(name);
      }
    }
    Self {
      metric_names: names,
      ..Default::default()
    }
  }

  /// Record one batch of values for `split`.
  ///
  /// Every value is weighted by `weight`, which defaults to `batch_size`. Pass an
  /// explicit weight of `1.0` for metrics that should be averaged unweighted.
  /// The weight is validated before any buffer is touched.
  pub fn set_batch<I, K>(&mut self, split: Split, values: I, batch_size: f64, weight: Option<f64>) -> Result<()>
  where
    I: IntoIterator<Item = (K, f64)>,
    K: AsRef<str>,
  {
    let weight = weight.unwrap_or(batch_size);
    validate_weight(weight)?;

    for (name, value) in values {
      let name = name.as_ref();
      if !self.metric_names.iter().any(|declared| declared == name) && self.warned.insert((split, name.to_string())) {
        warn!(split = %split, metric = name, "Recording metric that was not declared up front");
      }

      self
        .buffers_mut(split)
        .entry(name.to_string())
        .or_insert_with(|| MetricBuffer::new(name))
        .record_batch(value, weight)?;
    }
    Ok(())
  }

  pub fn set_train_batch<I, K>(&mut self, values: I, batch_size: f64) -> Result<()>
  where
    I: IntoIterator<Item = (K, f64)>,
    K: AsRef<str>,
  {
    self.set_batch(Split::Train, values, batch_size, None)
  }

  pub fn set_test_batch<I, K>(&mut self, values: I, batch_size: f64) -> Result<()>
  where
    I: IntoIterator<Item = (K, f64)>,
    K: AsRef<str>,
  {
    self.set_batch(Split::Test, values, batch_size, None)
  }

  /// Close the current epoch for every metric in `split`.
  ///
  /// Returns the names of the metrics that produced a new epoch value; metrics
  /// without pending batches are left alone.
  pub fn commit_epoch(&mut self, split: Split) -> Result<Vec<String>> {
    let mut committed = Vec::new();
    for (name, buffer) in self.buffers_mut(split).iter_mut() {
      let batch_index = buffer.len() as u64;
      if buffer.commit_epoch(batch_index)?.is_some() {
        committed.push(name.clone());
      }
    }
    debug!(split = %split, metrics = committed.len(), "Epoch committed");
    Ok(committed)
  }

  pub fn snapshot(&self) -> MetricsSnapshot {
    MetricsSnapshot {
      train: self.train.iter().map(|(name, buffer)| (name.clone(), buffer.to_record())).collect(),
      test: self.test.iter().map(|(name, buffer)| (name.clone(), buffer.to_record())).collect(),
    }
  }

  /// Build a fresh aggregator holding the state captured in `snapshot`.
  pub fn from_snapshot(mut snapshot: MetricsSnapshot) -> Result<Self> {
    let mut aggregator = Self::new(snapshot.metric_names());
    for split in Split::ALL {
      let records = std::mem::take(snapshot.split_mut(split));
      let buffers = aggregator.buffers_mut(split);
      for (name, record) in records {
        let buffer = MetricBuffer::from_record(name.clone(), record)?;
        buffers.insert(name, buffer);
      }
    }
    Ok(aggregator)
  }

  /// Metric names declared at construction
  pub fn metric_names(&self) -> &[String] {
    &self.metric_names
  }

  pub fn metrics(&self, split: Split) -> &MetricBuffers {
    match split {
      Split::Train => &self.train,
      Split::Test => &self.test,
    }
  }

  pub fn metric(&self, split: Split, name: &str) -> Option<&MetricBuffer> {
    self.metrics(split).get(name)
  }

  pub fn train_metrics(&self) -> &MetricBuffers {
    &self.train
  }

  pub fn test_metrics(&self) -> &MetricBuffers {
    &self.test
  }

  fn buffers_mut(&mut self, split: Split) -> &mut MetricBuffers {
    match split {
      Split::Train => &mut self.train,
      Split::Test => &mut self.test,
    }
  }
}

impl MetricSource for Aggregator {
  fn metrics_snapshot(&self) -> MetricsSnapshot {
    self.snapshot()
  }
}
