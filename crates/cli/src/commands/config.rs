//! Config inspection and scaffolding

use anyhow::{Context, Result, bail};
use liveplot_core::Config;
use std::path::Path;

/// Show the effective configuration for `dir`
pub fn cmd_config_show(dir: &Path) -> Result<()> {
  let config = Config::load_for_dir(dir);

  let project_config = Config::project_config_path(dir);
  let user_config = Config::user_config_path();

  println!("Effective configuration for: {:?}", dir);
  println!();

  if project_config.exists() {
    println!("Using project config: {:?}", project_config);
  } else if let Some(ref user_path) = user_config
    && user_path.exists()
  {
    println!("Using user config: {:?}", user_path);
  } else {
    println!("Using default configuration (no config file found)");
  }
  println!();

  let toml_str = toml::to_string_pretty(&config).context("Failed to render config")?;
  println!("{}", toml_str);

  Ok(())
}

/// Write a commented config template into `dir`
pub fn cmd_config_init(dir: &Path, force: bool) -> Result<()> {
  let config_path = Config::project_config_path(dir);

  if config_path.exists() && !force {
    bail!(
      "Config file already exists: {:?} (use --force to overwrite)",
      config_path
    );
  }

  std::fs::write(&config_path, Config::generate_template())
    .with_context(|| format!("Failed to write {:?}", config_path))?;

  println!("Created config: {:?}", config_path);
  println!("Edit the file to customize settings.");

  Ok(())
}
