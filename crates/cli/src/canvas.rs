//! Terminal canvas: one summary line per repaint

use liveplot_core::{Aggregator, Canvas, MetricBuffer, PlotLayout, Result, Split};
use std::io::Write;

pub struct TextCanvas<W: Write> {
  out: W,
  draws: u64,
}

impl<W: Write> TextCanvas<W> {
  pub fn new(out: W) -> Self {
    Self { out, draws: 0 }
  }

  #[cfg(test)]
  pub fn into_inner(self) -> W {
    self.out
  }
}

/// Latest epoch value if there is one, else the most recent batch value
fn latest(buffer: &MetricBuffer) -> Option<(char, f64)> {
  buffer
    .epoch_data()
    .last()
    .map(|v| ('e', *v))
    .or_else(|| buffer.batch_data().last().map(|v| ('b', *v)))
}

fn format_split(metrics: &Aggregator, split: Split) -> Option<String> {
  let buffers = metrics.metrics(split);
  if buffers.is_empty() {
    return None;
  }
  let cells: Vec<String> = buffers
    .iter()
    .map(|(name, buffer)| match latest(buffer) {
      Some((kind, value)) => format!("{name}={value:.4}{kind}"),
      None => format!("{name}=-"),
    })
    .collect();
  Some(format!("{split} {}", cells.join(" ")))
}

impl<W: Write> Canvas for TextCanvas<W> {
  fn draw(&mut self, metrics: &Aggregator, _layout: &PlotLayout) -> Result<()> {
    self.draws += 1;

    let batches = metrics
      .train_metrics()
      .values()
      .map(MetricBuffer::len)
      .max()
      .unwrap_or(0);
    let epochs = metrics
      .train_metrics()
      .values()
      .map(|b| b.epoch_data().len())
      .max()
      .unwrap_or(0);

    let mut line = format!("[redraw {:>4}] batch {batches:>5} epoch {epochs:>3}", self.draws);
    for split in Split::ALL {
      if let Some(summary) = format_split(metrics, split) {
        line.push_str(" | ");
        line.push_str(&summary);
      }
    }
    writeln!(self.out, "{line}")?;
    self.out.flush()?;
    Ok(())
  }
}
