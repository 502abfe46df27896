//! Engine configuration parsing.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Engine settings, matching the concerto.yml schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Longest causal chain a rule may extend
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    /// Keep at most this many invocations; `None` keeps everything
    #[serde(default)]
    pub log_retention: Option<usize>,

    /// How long `Engine::request` waits for a respond
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Reject cyclic rule graphs instead of warning about them
    #[serde(default)]
    pub strict_acyclic: bool,
}

fn default_max_chain_depth() -> usize {
    32
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: default_max_chain_depth(),
            log_retention: None,
            request_timeout_ms: default_request_timeout_ms(),
            strict_acyclic: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject limits no engine can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chain_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "max_chain_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.log_retention == Some(0) {
            return Err(ConfigError::Invalid {
                field: "log_retention",
                reason: "must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_chain_depth, 32);
        assert_eq!(config.log_retention, None);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(!config.strict_acyclic);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_retention: 500\nstrict_acyclic: true").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.log_retention, Some(500));
        assert!(config.strict_acyclic);
        assert_eq!(config.max_chain_depth, 32);
    }

    #[test]
    fn test_rejects_zero_depth() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_chain_depth: 0").unwrap();
        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(ConfigError::Invalid { field: "max_chain_depth", .. })
        ));
    }
}
