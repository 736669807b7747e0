//! Configuration for live plots with per-directory overrides.
//!
//! Config priority: directory-relative (.liveplot.toml) > user (~/.config/liveplot/config.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{LivePlotError, Result};

/// Share of wall-clock time that may be spent repainting
pub const DEFAULT_MAX_FRACTION_SPENT_PLOTTING: f64 = 0.05;

/// File name looked up in the working directory
pub const PROJECT_CONFIG_FILE: &str = ".liveplot.toml";

// ============================================================================
// Plot Configuration
// ============================================================================

/// Redraw throttling and grid layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
  /// Upper bound on the fraction of time spent redrawing (default: 0.05)
  /// 0 disables redraws after the first, 1 redraws on every request
  pub max_fraction_spent_plotting: f64,

  /// Grid rows; derived from the metric count and `ncols` if not set
  #[serde(skip_serializing_if = "Option::is_none")]
  pub nrows: Option<usize>,

  /// Grid columns (default: 1)
  pub ncols: usize,

  /// Figure size in inches as [width, height]
  /// Defaults to 6 inches per column by 4 inches per row
  #[serde(skip_serializing_if = "Option::is_none")]
  pub figsize: Option<(f64, f64)>,
}

fn default_ncols() -> usize {
  1
}

impl Default for PlotConfig {
  fn default() -> Self {
    Self {
      max_fraction_spent_plotting: DEFAULT_MAX_FRACTION_SPENT_PLOTTING,
      nrows: None,
      ncols: default_ncols(),
      figsize: None,
    }
  }
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
  /// Default log level: "off", "error", "warn", "info", "debug", "trace"
  /// RUST_LOG overrides this
  #[serde(default = "default_log_level")]
  pub level: String,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
    }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub plot: PlotConfig,

  #[serde(default)]
  pub logging: LoggingConfig,
}

impl Config {
  /// Load config for a directory, with fallback to user config
  pub fn load_for_dir(dir: &Path) -> Self {
    let candidates = std::iter::once(Self::project_config_path(dir)).chain(Self::user_config_path());
    for path in candidates {
      if !path.exists() {
        continue;
      }
      match Self::load_file(&path) {
        Ok(config) => return config,
        Err(e) => warn!(path = %path.display(), err = %e, "Ignoring unusable config file"),
      }
    }

    Self::default()
  }

  /// Parse and validate a single config file
  pub fn load_file(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path)?;
    let config: Self = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("LIVEPLOT_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("liveplot").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("liveplot").join("config.toml"))
  }

  /// Get the directory-relative config path
  pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(PROJECT_CONFIG_FILE)
  }

  pub fn validate(&self) -> Result<()> {
    let max = self.plot.max_fraction_spent_plotting;
    if max.is_nan() || max < 0.0 {
      return Err(LivePlotError::Config(format!(
        "plot.max_fraction_spent_plotting must be a non-negative number, got {max}"
      )));
    }
    if self.plot.ncols == 0 {
      return Err(LivePlotError::Config("plot.ncols must be at least 1".to_string()));
    }
    if self.plot.nrows == Some(0) {
      return Err(LivePlotError::Config("plot.nrows must be at least 1".to_string()));
    }
    if let Some((width, height)) = self.plot.figsize
      && !(width > 0.0 && height > 0.0)
    {
      return Err(LivePlotError::Config(format!(
        "plot.figsize must be positive, got [{width}, {height}]"
      )));
    }
    Ok(())
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    format!(
      r#"# liveplot configuration
# Place in {PROJECT_CONFIG_FILE} (per directory) or ~/.config/liveplot/config.toml (user)

# ============================================================================
# Plotting
# ============================================================================

[plot]
# Maximum share of wall-clock time spent redrawing (0.0 - 1.0)
#   0.0 = draw once, then only on epoch boundaries
#   1.0 = redraw on every batch
max_fraction_spent_plotting = {DEFAULT_MAX_FRACTION_SPENT_PLOTTING}

# Grid columns; rows default to ceil(metrics / ncols)
ncols = 1
# nrows = 2

# Figure size in inches, [width, height]
# Default: [6 * ncols, 4 * nrows]
# figsize = [12.0, 8.0]

# ============================================================================
# Logging
# ============================================================================

[logging]
# Log level: off, error, warn, info, debug, trace (RUST_LOG takes precedence)
level = "info"
"#
    )
  }
}
