//! Archive inspection

use anyhow::{Context, Result};
use liveplot_core::{MetricRecord, MetricsSnapshot, Split, load_metrics};
use std::path::Path;

/// Print a summary (or the full contents as JSON) of a saved archive
pub fn cmd_show(path: &Path, json: bool) -> Result<()> {
  let snapshot = load_metrics(path).with_context(|| format!("Failed to load metrics from {:?}", path))?;

  if json {
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    return Ok(());
  }

  print!("{}", format_summary(&snapshot));
  Ok(())
}

fn format_value(value: Option<&f64>) -> String {
  value.map(|v| format!("{v:.6}")).unwrap_or_else(|| "-".to_string())
}

fn format_record(name: &str, record: &MetricRecord) -> String {
  format!(
    "  {:<20} {:>8} {:>7} {:>14} {:>8}\n",
    name,
    record.batch_data.len(),
    record.epoch_data.len(),
    format_value(record.epoch_data.last()),
    record.cnt_since_epoch,
  )
}

pub(crate) fn format_summary(snapshot: &MetricsSnapshot) -> String {
  let mut output = String::new();
  for split in Split::ALL {
    let metrics = snapshot.split(split);
    output.push_str(&format!("{} ({} metrics)\n", split, metrics.len()));
    if metrics.is_empty() {
      continue;
    }
    output.push_str(&format!(
      "  {:<20} {:>8} {:>7} {:>14} {:>8}\n",
      "metric", "batches", "epochs", "last epoch", "pending"
    ));
    for (name, record) in metrics {
      output.push_str(&format_record(name, record));
    }
  }
  output
}
