//! Flat key/value archives of metric snapshots.
//!
//! Each buffer field becomes one entry keyed `split <sep> metric <sep> field`.
//! The separator is the shortest run of `;` that occurs in no metric name, and
//! is stored next to the per-split metric order so that names survive the
//! round trip exactly. On disk an archive is a safetensors file: one
//! little-endian tensor per entry, with `sep`, `train_order` and `test_order`
//! in the header metadata.

use safetensors::tensor::{Dtype, SafeTensors, TensorView};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{LivePlotError, Result};
use crate::snapshot::{MetricMap, MetricRecord, MetricSource, MetricsSnapshot, Split};

const SEP_KEY: &str = "sep";
const TRAIN_ORDER_KEY: &str = "train_order";
const TEST_ORDER_KEY: &str = "test_order";

/// Persisted fields of a metric buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
  BatchData,
  EpochData,
  EpochDomain,
  CntSinceEpoch,
  TotalWeighting,
  RunningWeightedSum,
}

impl Field {
  pub const ALL: [Field; 6] = [
    Field::BatchData,
    Field::EpochData,
    Field::EpochDomain,
    Field::CntSinceEpoch,
    Field::TotalWeighting,
    Field::RunningWeightedSum,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Field::BatchData => "batch_data",
      Field::EpochData => "epoch_data",
      Field::EpochDomain => "epoch_domain",
      Field::CntSinceEpoch => "cnt_since_epoch",
      Field::TotalWeighting => "total_weighting",
      Field::RunningWeightedSum => "running_weighted_sum",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|field| field.as_str() == s)
  }

  fn read(&self, record: &MetricRecord) -> ArchiveArray {
    match self {
      Field::BatchData => ArchiveArray::F64(record.batch_data.clone()),
      Field::EpochData => ArchiveArray::F64(record.epoch_data.clone()),
      Field::EpochDomain => ArchiveArray::U64(record.epoch_domain.clone()),
      Field::CntSinceEpoch => ArchiveArray::ScalarU64(record.cnt_since_epoch),
      Field::TotalWeighting => ArchiveArray::ScalarF64(record.total_weighting),
      Field::RunningWeightedSum => ArchiveArray::ScalarF64(record.running_weighted_sum),
    }
  }

  fn write(&self, record: &mut MetricRecord, array: ArchiveArray, key: &str) -> Result<()> {
    match (self, array) {
      (Field::BatchData, ArchiveArray::F64(values)) => record.batch_data = values,
      (Field::EpochData, ArchiveArray::F64(values)) => record.epoch_data = values,
      (Field::EpochDomain, ArchiveArray::U64(values)) => record.epoch_domain = values,
      (Field::CntSinceEpoch, ArchiveArray::ScalarU64(value)) => record.cnt_since_epoch = value,
      (Field::TotalWeighting, ArchiveArray::ScalarF64(value)) => record.total_weighting = value,
      (Field::RunningWeightedSum, ArchiveArray::ScalarF64(value)) => record.running_weighted_sum = value,
      (field, array) => {
        return Err(LivePlotError::InvalidField {
          key: key.to_string(),
          reason: format!("'{}' cannot hold a {}", field.as_str(), array.describe()),
        });
      }
    }
    Ok(())
  }
}

/// One numeric entry of an archive
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveArray {
  F64(Vec<f64>),
  U64(Vec<u64>),
  ScalarF64(f64),
  ScalarU64(u64),
}

impl ArchiveArray {
  fn dtype(&self) -> Dtype {
    match self {
      ArchiveArray::F64(_) | ArchiveArray::ScalarF64(_) => Dtype::F64,
      ArchiveArray::U64(_) | ArchiveArray::ScalarU64(_) => Dtype::U64,
    }
  }

  fn shape(&self) -> Vec<usize> {
    match self {
      ArchiveArray::F64(values) => vec![values.len()],
      ArchiveArray::U64(values) => vec![values.len()],
      ArchiveArray::ScalarF64(_) | ArchiveArray::ScalarU64(_) => Vec::new(),
    }
  }

  fn to_le_bytes(&self) -> Vec<u8> {
    match self {
      ArchiveArray::F64(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
      ArchiveArray::U64(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
      ArchiveArray::ScalarF64(value) => value.to_le_bytes().to_vec(),
      ArchiveArray::ScalarU64(value) => value.to_le_bytes().to_vec(),
    }
  }

  fn from_tensor(key: &str, tensor: &TensorView<'_>) -> Result<Self> {
    let words = || tensor.data().chunks_exact(8).map(le_word);
    let array = match (tensor.dtype(), tensor.shape().len()) {
      (Dtype::F64, 0) => ArchiveArray::ScalarF64(words().map(f64::from_le_bytes).next().unwrap_or_default()),
      (Dtype::F64, 1) => ArchiveArray::F64(words().map(f64::from_le_bytes).collect()),
      (Dtype::U64, 0) => ArchiveArray::ScalarU64(words().map(u64::from_le_bytes).next().unwrap_or_default()),
      (Dtype::U64, 1) => ArchiveArray::U64(words().map(u64::from_le_bytes).collect()),
      (dtype, rank) => {
        return Err(LivePlotError::InvalidField {
          key: key.to_string(),
          reason: format!("unsupported {dtype:?} tensor of rank {rank}"),
        });
      }
    };
    Ok(array)
  }

  fn describe(&self) -> &'static str {
    match self {
      ArchiveArray::F64(_) => "float64 vector",
      ArchiveArray::U64(_) => "uint64 vector",
      ArchiveArray::ScalarF64(_) => "float64 scalar",
      ArchiveArray::ScalarU64(_) => "uint64 scalar",
    }
  }
}

fn le_word(chunk: &[u8]) -> [u8; 8] {
  let mut word = [0u8; 8];
  word.copy_from_slice(chunk);
  word
}

/// Flattened form of a [`MetricsSnapshot`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Archive {
  pub sep: String,
  pub train_order: Vec<String>,
  pub test_order: Vec<String>,
  pub entries: BTreeMap<String, ArchiveArray>,
}

impl Archive {
  fn order(&self, split: Split) -> &[String] {
    match split {
      Split::Train => &self.train_order,
      Split::Test => &self.test_order,
    }
  }

  /// Serialize to safetensors bytes.
  pub fn to_safetensors(&self) -> Result<Vec<u8>> {
    let buffers: Vec<(&str, Dtype, Vec<usize>, Vec<u8>)> = self
      .entries
      .iter()
      .map(|(key, array)| (key.as_str(), array.dtype(), array.shape(), array.to_le_bytes()))
      .collect();

    let views = buffers
      .iter()
      .map(|(key, dtype, shape, bytes)| TensorView::new(*dtype, shape.clone(), bytes).map(|view| (*key, view)))
      .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut metadata = HashMap::new();
    metadata.insert(SEP_KEY.to_string(), self.sep.clone());
    metadata.insert(TRAIN_ORDER_KEY.to_string(), serde_json::to_string(&self.train_order)?);
    metadata.insert(TEST_ORDER_KEY.to_string(), serde_json::to_string(&self.test_order)?);

    Ok(safetensors::serialize(views, Some(metadata))?)
  }

  /// Parse safetensors bytes written by [`Archive::to_safetensors`].
  pub fn from_safetensors(bytes: &[u8]) -> Result<Self> {
    let (_, header) = SafeTensors::read_metadata(bytes)?;
    let metadata = header.metadata().as_ref();
    let lookup = |key: &'static str| {
      metadata
        .and_then(|m| m.get(key))
        .cloned()
        .ok_or(LivePlotError::SchemaMissing(key))
    };

    let sep = lookup(SEP_KEY)?;
    let train_order: Vec<String> = serde_json::from_str(&lookup(TRAIN_ORDER_KEY)?)?;
    let test_order: Vec<String> = serde_json::from_str(&lookup(TEST_ORDER_KEY)?)?;

    let tensors = SafeTensors::deserialize(bytes)?;
    let mut entries = BTreeMap::new();
    for (key, tensor) in tensors.tensors() {
      let array = ArchiveArray::from_tensor(&key, &tensor)?;
      entries.insert(key, array);
    }

    Ok(Self {
      sep,
      train_order,
      test_order,
      entries,
    })
  }
}

/// Shortest run of `;` that does not occur in any of `names`.
pub fn choose_separator<'a, I>(names: I) -> String
where
  I: IntoIterator<Item = &'a str>,
{
  let longest_run = names
    .into_iter()
    .flat_map(|name| name.split(|c| c != ';').map(str::len))
    .max()
    .unwrap_or(0);
  ";".repeat(longest_run + 1)
}

/// Split `key` into `(split, metric, field)`.
///
/// Split labels and field names never contain `;`, so the split label ends at the
/// first separator and the field starts after the last one. Whatever lies
/// between is the metric name, which must not contain the separator itself.
fn split_key<'k>(key: &'k str, sep: &str) -> Result<(&'k str, &'k str, &'k str)> {
  let malformed = || LivePlotError::MalformedKey { key: key.to_string() };
  let (split, rest) = key.split_once(sep).ok_or_else(malformed)?;
  let (name, field) = rest.rsplit_once(sep).ok_or_else(malformed)?;
  if name.contains(sep) {
    return Err(malformed());
  }
  Ok((split, name, field))
}

fn join_key(split: Split, name: &str, field: Field, sep: &str) -> String {
  format!("{}{sep}{name}{sep}{}", split.as_str(), field.as_str())
}

/// Flatten a snapshot into an archive.
pub fn encode(snapshot: &MetricsSnapshot) -> Archive {
  let sep = choose_separator(snapshot.train.keys().chain(snapshot.test.keys()).map(String::as_str));

  let mut entries = BTreeMap::new();
  for split in Split::ALL {
    for (name, record) in snapshot.split(split) {
      for field in Field::ALL {
        entries.insert(join_key(split, name, field, &sep), field.read(record));
      }
    }
  }

  Archive {
    train_order: snapshot.train.keys().cloned().collect(),
    test_order: snapshot.test.keys().cloned().collect(),
    sep,
    entries,
  }
}

/// Rebuild a snapshot from an archive.
///
/// Fails without returning partial data if any key is malformed or any field
/// holds the wrong kind of array. Metrics that are not listed in the split's
/// order are dropped; fields absent from the archive keep their defaults.
pub fn decode(archive: Archive) -> Result<MetricsSnapshot> {
  if archive.sep.is_empty() {
    return Err(LivePlotError::InvalidField {
      key: SEP_KEY.to_string(),
      reason: "separator is empty".to_string(),
    });
  }

  let mut found: HashMap<Split, HashMap<String, MetricRecord>> = HashMap::new();
  for (key, array) in &archive.entries {
    let (split_label, name, field_label) = split_key(key, &archive.sep)?;
    let Ok(split) = split_label.parse::<Split>() else {
      debug!(key = %key, "Skipping archive entry for unknown split");
      continue;
    };
    let field = Field::parse(field_label).ok_or_else(|| LivePlotError::InvalidField {
      key: key.clone(),
      reason: format!("unknown field '{field_label}'"),
    })?;

    let record = found.entry(split).or_default().entry(name.to_string()).or_default();
    field.write(record, array.clone(), key)?;
  }

  let mut snapshot = MetricsSnapshot::default();
  for split in Split::ALL {
    let mut records = found.remove(&split).unwrap_or_default();
    let metrics: &mut MetricMap = snapshot.split_mut(split);
    for name in archive.order(split) {
      if metrics.contains_key(name) {
        continue;
      }
      let record = records.remove(name).unwrap_or_default();
      metrics.insert(name.clone(), record);
    }
    if !records.is_empty() {
      debug!(split = %split, count = records.len(), "Ignoring archived metrics missing from the split order");
    }
  }
  Ok(snapshot)
}

/// Save the metrics of `source` to a safetensors archive at `path`.
pub fn save_metrics(path: impl AsRef<Path>, source: &impl MetricSource) -> Result<()> {
  let path = path.as_ref();
  let archive = encode(&source.metrics_snapshot());
  let bytes = archive.to_safetensors()?;
  std::fs::write(path, &bytes)?;
  info!(
    path = %path.display(),
    train = archive.train_order.len(),
    test = archive.test_order.len(),
    bytes = bytes.len(),
    "Saved metrics archive"
  );
  Ok(())
}

/// Load train and test metrics from an archive written by [`save_metrics`].
pub fn load_metrics(path: impl AsRef<Path>) -> Result<MetricsSnapshot> {
  let path = path.as_ref();
  let bytes = std::fs::read(path)?;
  let snapshot = decode(Archive::from_safetensors(&bytes)?)?;
  info!(
    path = %path.display(),
    train = snapshot.train.len(),
    test = snapshot.test.len(),
    "Loaded metrics archive"
  );
  Ok(snapshot)
}
