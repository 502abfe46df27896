//! CLI command implementations.

pub mod check;
pub mod demo;

pub use check::check_rules;
pub use demo::run_demo;

use anyhow::{Context, Result};
use concerto_engine::EngineConfig;
use std::path::Path;
use tracing::debug;

/// Read the engine configuration, falling back to defaults when the file is absent
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no configuration file; using defaults");
        return Ok(EngineConfig::default());
    }
    EngineConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}
