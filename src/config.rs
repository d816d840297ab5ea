use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::raft::{RaftConfig, RaftError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub raft: RaftConfig,
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Config {
    /// Reads a JSON config file. Fields left out keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RaftError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RaftError> {
        self.raft.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raft: RaftConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_default_values_are_sensible() {
        let cfg = Config::default();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.raft.election_timeout_min, 150);
        assert_eq!(cfg.raft.election_timeout_max, 300);
        assert_eq!(cfg.raft.poll_interval, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_merges_partial_file_with_defaults() {
        let mut file = NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{ "raft": {{ "node_id": "n3", "election_timeout_max": 400 }}, "log_level": "debug" }}"#
        )
        .expect("write config");

        let cfg = Config::load(file.path()).expect("load config");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.raft.node_id, "n3");
        assert_eq!(cfg.raft.election_timeout_min, 150);
        assert_eq!(cfg.raft.election_timeout_max, 400);
        assert_eq!(cfg.raft.seed, None);
    }

    #[test]
    fn load_reports_missing_file_and_bad_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.json");
        assert!(matches!(Config::load(&missing), Err(RaftError::IoError(_))));

        let mut file = NamedTempFile::new().expect("tempfile");
        write!(file, "{{ not json").expect("write config");
        assert!(matches!(
            Config::load(file.path()),
            Err(RaftError::SerializationError(_))
        ));
    }

    #[test]
    fn load_does_not_clamp_invalid_values() {
        let mut file = NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{ "raft": {{ "election_timeout_min": 300, "election_timeout_max": 300 }} }}"#
        )
        .expect("write config");

        let cfg = Config::load(file.path()).expect("load config");
        assert_eq!(cfg.raft.election_timeout_min, 300);
        assert!(matches!(
            cfg.validate(),
            Err(RaftError::InvalidTimeoutRange { min: 300, max: 300 })
        ));
    }
}
