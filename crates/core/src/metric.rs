//! Per-metric rolling state: batch values, epoch means and the running
//! weighted accumulator between epoch boundaries.

use tracing::trace;

use crate::error::{LivePlotError, Result};
use crate::snapshot::MetricRecord;

/// Batch and epoch series for one metric within one split
#[derive(Debug, Clone, PartialEq)]
pub struct MetricBuffer {
  name: String,
  batch_data: Vec<f64>,
  epoch_data: Vec<f64>,
  epoch_domain: Vec<u64>,
  cnt_since_epoch: u64,
  total_weighting: f64,
  running_weighted_sum: f64,
}

impl MetricBuffer {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      batch_data: Vec::new(),
      epoch_data: Vec::new(),
      epoch_domain: Vec::new(),
      cnt_since_epoch: 0,
      total_weighting: 0.0,
      running_weighted_sum: 0.0,
    }
  }

  /// Append one batch observation, weighted by `weight` in the current epoch mean.
  pub fn record_batch(&mut self, value: f64, weight: f64) -> Result<()> {
    validate_weight(weight)?;

    self.batch_data.push(value);
    self.running_weighted_sum += value * weight;
    self.total_weighting += weight;
    self.cnt_since_epoch += 1;
    Ok(())
  }

  /// Collapse the batches recorded since the previous boundary into one epoch value.
  ///
  /// `batch_index` must be the number of batches recorded so far. Returns the new
  /// epoch mean, or `None` when no batches arrived since the last boundary.
  pub fn commit_epoch(&mut self, batch_index: u64) -> Result<Option<f64>> {
    if self.cnt_since_epoch == 0 {
      return Ok(None);
    }

    let batch_count = self.batch_data.len() as u64;
    if batch_index != batch_count {
      return Err(LivePlotError::DomainMismatch {
        metric: self.name.clone(),
        batch_index,
        batch_count,
      });
    }

    let mean = self.running_weighted_sum / self.total_weighting;
    self.epoch_data.push(mean);
    self.epoch_domain.push(batch_index);
    trace!(
      metric = %self.name,
      batches = self.cnt_since_epoch,
      batch_index,
      mean,
      "Committed epoch"
    );

    self.cnt_since_epoch = 0;
    self.total_weighting = 0.0;
    self.running_weighted_sum = 0.0;
    Ok(Some(mean))
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn batch_data(&self) -> &[f64] {
    &self.batch_data
  }

  pub fn epoch_data(&self) -> &[f64] {
    &self.epoch_data
  }

  pub fn epoch_domain(&self) -> &[u64] {
    &self.epoch_domain
  }

  /// X-axis positions of the batch values (1-based)
  pub fn batch_domain(&self) -> impl Iterator<Item = u64> + '_ {
    1..=self.batch_data.len() as u64
  }

  pub fn cnt_since_epoch(&self) -> u64 {
    self.cnt_since_epoch
  }

  pub fn total_weighting(&self) -> f64 {
    self.total_weighting
  }

  pub fn running_weighted_sum(&self) -> f64 {
    self.running_weighted_sum
  }

  /// Number of batches recorded so far
  pub fn len(&self) -> usize {
    self.batch_data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.batch_data.is_empty()
  }

  /// Weighted mean of the batches since the last boundary, if any
  pub fn pending_mean(&self) -> Option<f64> {
    (self.cnt_since_epoch > 0).then(|| self.running_weighted_sum / self.total_weighting)
  }

  pub fn to_record(&self) -> MetricRecord {
    MetricRecord {
      batch_data: self.batch_data.clone(),
      epoch_data: self.epoch_data.clone(),
      epoch_domain: self.epoch_domain.clone(),
      cnt_since_epoch: self.cnt_since_epoch,
      total_weighting: self.total_weighting,
      running_weighted_sum: self.running_weighted_sum,
    }
  }

  /// Rebuild a buffer from a persisted record, rejecting records no buffer could have produced.
  pub fn from_record(name: impl Into<String>, record: MetricRecord) -> Result<Self> {
    let name = name.into();
    let invalid = |reason: String| LivePlotError::InvalidRecord {
      metric: name.clone(),
      reason,
    };

    let batch_count = record.batch_data.len() as u64;
    if record.epoch_data.len() != record.epoch_domain.len() {
      return Err(invalid(format!(
        "{} epoch values but {} epoch positions",
        record.epoch_data.len(),
        record.epoch_domain.len()
      )));
    }
    let mut previous = 0;
    for &index in &record.epoch_domain {
      if index <= previous || index > batch_count {
        return Err(invalid(format!(
          "epoch domain {:?} must be strictly increasing within 1..={batch_count}",
          record.epoch_domain
        )));
      }
      previous = index;
    }
    // Pending batches can only follow the last epoch boundary.
    let after_boundary = batch_count - record.epoch_domain.last().copied().unwrap_or(0);
    if record.cnt_since_epoch > after_boundary {
      return Err(invalid(format!(
        "{} batches since last epoch but only {after_boundary} recorded after it",
        record.cnt_since_epoch
      )));
    }
    if record.cnt_since_epoch == 0 && (record.total_weighting != 0.0 || record.running_weighted_sum != 0.0) {
      return Err(invalid("accumulators must be zero when no batches are pending".to_string()));
    }
    if record.cnt_since_epoch > 0
      && !(record.total_weighting.is_finite() && record.total_weighting > 0.0)
    {
      return Err(invalid(format!(
        "total weighting {} of pending batches must be finite and positive",
        record.total_weighting
      )));
    }

    Ok(Self {
      name,
      batch_data: record.batch_data,
      epoch_data: record.epoch_data,
      epoch_domain: record.epoch_domain,
      cnt_since_epoch: record.cnt_since_epoch,
      total_weighting: record.total_weighting,
      running_weighted_sum: record.running_weighted_sum,
    })
  }
}

pub(crate) fn validate_weight(weight: f64) -> Result<()> {
  if weight.is_finite() && weight > 0.0 {
    Ok(())
  } else {
    Err(LivePlotError::InvalidWeight { weight })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  #[test]
  fn test_trivial_case() {
    let mut metric = MetricBuffer::new("a");
    metric.record_batch(1.0, 1.0).unwrap();
    metric.record_batch(3.0, 1.0).unwrap();
    assert_eq!(metric.commit_epoch(2).unwrap(), Some(2.0));

    assert_eq!(metric.batch_domain().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(metric.batch_data(), &[1.0, 3.0]);
    assert_eq!(metric.epoch_domain(), &[2]);
    assert_eq!(metric.epoch_data(), &[2.0]);

    let record = metric.to_record();
    assert_eq!(record.batch_data, metric.batch_data());
    assert_eq!(record.epoch_data, metric.epoch_data());
    assert_eq!(record.epoch_domain, metric.epoch_domain());
  }

  #[test]
  fn test_weighted_mean() {
    let mut metric = MetricBuffer::new("loss");
    metric.record_batch(4.0, 3.0).unwrap();
    metric.record_batch(1.0, 1.0).unwrap();
    let mean = metric.commit_epoch(2).unwrap().unwrap();
    assert!((mean - 13.0 / 4.0).abs() < 1e-12);
  }

  #[test]
  fn test_empty_commit_is_noop() {
    let mut metric = MetricBuffer::new("loss");
    assert_eq!(metric.commit_epoch(0).unwrap(), None);

    metric.record_batch(1.0, 1.0).unwrap();
    metric.commit_epoch(1).unwrap();
    assert_eq!(metric.commit_epoch(1).unwrap(), None);
    assert_eq!(metric.epoch_data(), &[1.0]);
    assert_eq!(metric.epoch_domain(), &[1]);
  }

  #[test]
  fn test_invalid_weight_leaves_buffer_untouched() {
    let mut metric = MetricBuffer::new("loss");
    metric.record_batch(2.0, 1.0).unwrap();
    let before = metric.clone();

    for weight in [0.0, -1.0, f64::NAN, f64::INFINITY] {
      let err = metric.record_batch(5.0, weight).unwrap_err();
      assert!(matches!(err, LivePlotError::InvalidWeight { .. }));
    }
    assert_eq!(metric, before);
  }

  #[test]
  fn test_domain_mismatch_does_not_mutate() {
    let mut metric = MetricBuffer::new("loss");
    metric.record_batch(2.0, 1.0).unwrap();
    metric.record_batch(4.0, 1.0).unwrap();
    let before = metric.clone();

    let err = metric.commit_epoch(1).unwrap_err();
    assert!(matches!(
      err,
      LivePlotError::DomainMismatch {
        batch_index: 1,
        batch_count: 2,
        ..
      }
    ));
    assert_eq!(metric, before);
  }

  #[test]
  fn test_pending_mean() {
    let mut metric = MetricBuffer::new("loss");
    assert_eq!(metric.pending_mean(), None);
    metric.record_batch(2.0, 1.0).unwrap();
    metric.record_batch(5.0, 2.0).unwrap();
    assert_eq!(metric.pending_mean(), Some(4.0));
  }

  #[test]
  fn test_from_record_rejects_inconsistent_state() {
    let unsorted = MetricRecord {
      batch_data: vec![1.0, 2.0, 3.0],
      epoch_data: vec![1.0, 2.0],
      epoch_domain: vec![3, 1],
      ..Default::default()
    };
    assert!(matches!(
      MetricBuffer::from_record("a", unsorted),
      Err(LivePlotError::InvalidRecord { .. })
    ));

    let past_end = MetricRecord {
      batch_data: vec![1.0],
      epoch_data: vec![1.0],
      epoch_domain: vec![2],
      ..Default::default()
    };
    assert!(MetricBuffer::from_record("a", past_end).is_err());

    let stray_accumulator = MetricRecord {
      batch_data: vec![1.0],
      total_weighting: 1.0,
      ..Default::default()
    };
    assert!(MetricBuffer::from_record("a", stray_accumulator).is_err());

    let too_many_pending = MetricRecord {
      batch_data: vec![1.0],
      cnt_since_epoch: 2,
      total_weighting: 2.0,
      running_weighted_sum: 2.0,
      ..Default::default()
    };
    assert!(MetricBuffer::from_record("a", too_many_pending).is_err());

    for total_weighting in [0.0, -1.0, f64::NAN, f64::INFINITY] {
      let unweighted_pending = MetricRecord {
        batch_data: vec![1.0],
        cnt_since_epoch: 1,
        total_weighting,
        ..Default::default()
      };
      assert!(
        MetricBuffer::from_record("a", unweighted_pending).is_err(),
        "accepted total_weighting {total_weighting}"
      );
    }

    let pending_before_boundary = MetricRecord {
      batch_data: vec![1.0, 2.0],
      epoch_data: vec![1.5],
      epoch_domain: vec![2],
      cnt_since_epoch: 1,
      total_weighting: 1.0,
      running_weighted_sum: 2.0,
    };
    assert!(matches!(
      MetricBuffer::from_record("a", pending_before_boundary),
      Err(LivePlotError::InvalidRecord { .. })
    ));

    let pending_after_boundary = MetricRecord {
      batch_data: vec![1.0, 2.0, 3.0],
      epoch_data: vec![1.5],
      epoch_domain: vec![2],
      cnt_since_epoch: 1,
      total_weighting: 1.0,
      running_weighted_sum: 3.0,
    };
    let mut restored = MetricBuffer::from_record("a", pending_after_boundary).unwrap();
    assert_eq!(restored.commit_epoch(3).unwrap(), Some(3.0));
  }

  #[test]
  fn test_record_roundtrip_mid_epoch() {
    let mut metric = MetricBuffer::new("acc");
    metric.record_batch(0.5, 2.0).unwrap();
    metric.commit_epoch(1).unwrap();
    metric.record_batch(0.75, 4.0).unwrap();

    let restored = MetricBuffer::from_record("acc", metric.to_record()).unwrap();
    assert_eq!(restored, metric);
    assert_eq!(restored.cnt_since_epoch(), 1);
    assert_eq!(restored.total_weighting(), 4.0);
    assert_eq!(restored.running_weighted_sum(), 3.0);
  }

  #[derive(Debug, Clone)]
  enum Op {
    Batch { value: f64, weight: Option<f64> },
    Epoch,
  }

  fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
      3 => (-1e6f64..1e6, proptest::option::of(0.01f64..2.0))
        .prop_map(|(value, weight)| Op::Batch { value, weight }),
      1 => Just(Op::Epoch),
    ]
  }

  proptest! {
    /// Drives a buffer and a naive reference model through the same operations.
    #[test]
    fn prop_matches_reference_model(ops in proptest::collection::vec(op_strategy(), 0..60)) {
      let mut metric = MetricBuffer::new("a");
      let mut batch_data = Vec::new();
      let mut pending: Vec<(f64, f64)> = Vec::new();
      let mut epoch_data: Vec<f64> = Vec::new();
      let mut epoch_domain = Vec::new();

      for op in ops {
        match op {
          Op::Batch { value, weight } => {
            let weight = weight.unwrap_or(1.0);
            metric.record_batch(value, weight).unwrap();
            batch_data.push(value);
            pending.push((value, weight));
          }
          Op::Epoch => {
            metric.commit_epoch(metric.len() as u64).unwrap();
            if !pending.is_empty() {
              let total: f64 = pending.iter().map(|(_, w)| w).sum();
              let mean = pending.iter().map(|(v, w)| v * w / total).sum::<f64>();
              epoch_data.push(mean);
              epoch_domain.push(batch_data.len() as u64);
              pending.clear();
            }
          }
        }

        prop_assert_eq!(metric.batch_data(), batch_data.as_slice());
        prop_assert_eq!(metric.epoch_domain(), epoch_domain.as_slice());
        prop_assert_eq!(metric.cnt_since_epoch(), pending.len() as u64);
        prop_assert_eq!(metric.epoch_data().len(), epoch_data.len());
        for (actual, expected) in metric.epoch_data().iter().zip(&epoch_data) {
          let tolerance = 1e-6 + 1e-9 * expected.abs();
          prop_assert!((actual - expected).abs() <= tolerance, "{} != {}", actual, expected);
        }
        prop_assert!(metric.epoch_domain().windows(2).all(|w| w[0] < w[1]));
        prop_assert!(metric.epoch_domain().iter().all(|&i| i <= metric.len() as u64));

        let restored = MetricBuffer::from_record("a", metric.to_record()).unwrap();
        prop_assert_eq!(&restored, &metric);
      }
    }
  }
}
