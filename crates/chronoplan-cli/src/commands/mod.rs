pub mod config;
pub mod plan;
pub mod schedule;

use chrono::NaiveDate;
use chronoplan_core::{Config, Declaration, Engine};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config at `path`, or the default location with defaults as fallback.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) if path.exists() => Ok(Config::load(path)?),
        Some(_) => Ok(Config::default()),
        None => Ok(Config::load_or_default()),
    }
}

pub fn config_path(path: Option<&Path>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(Config::default_path()?),
    }
}

/// Engine over the declaration at `path`, starting today unless `start` is given.
pub fn engine(
    path: &Path,
    start: Option<NaiveDate>,
    config_path: Option<&Path>,
) -> Result<Engine, Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let declaration = Declaration::load(path)?;
    declaration.validate(&config)?;
    let start = start.unwrap_or_else(|| chrono::Local::now().date_naive());
    debug!(declaration = %path.display(), %start, "declaration loaded");
    Ok(Engine::new(declaration, config, start))
}

/// Write pretty JSON to `output`, or print it.
pub fn emit<T: serde::Serialize>(
    value: &T,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            eprintln!("written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
