use thiserror::Error;

/// Errors raised by metric aggregation, archives and configuration
#[derive(Debug, Error)]
pub enum LivePlotError {
  #[error("Invalid weight {weight}: batch weights must be finite and positive")]
  InvalidWeight { weight: f64 },

  #[error("Epoch boundary for '{metric}' at batch {batch_index}, but {batch_count} batches are recorded")]
  DomainMismatch {
    metric: String,
    batch_index: u64,
    batch_count: u64,
  },

  #[error("Malformed archive key '{key}': expected <split><sep><metric><sep><field>")]
  MalformedKey { key: String },

  #[error("Archive is missing '{0}'")]
  SchemaMissing(&'static str),

  #[error("Invalid archive field '{key}': {reason}")]
  InvalidField { key: String, reason: String },

  #[error("Invalid record for metric '{metric}': {reason}")]
  InvalidRecord { metric: String, reason: String },

  #[error("Invalid plot layout: {0}")]
  InvalidLayout(String),

  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Render error: {0}")]
  Render(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("Archive error: {0}")]
  Archive(#[from] safetensors::SafeTensorError),

  #[error("TOML parse error: {0}")]
  Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, LivePlotError>;
