//! CLI command implementations

mod config;
mod show;
mod simulate;

pub use config::{cmd_config_init, cmd_config_show};
pub use show::cmd_show;
pub use simulate::{SimulateOptions, cmd_simulate};
