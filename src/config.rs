//! Server configuration: TOML file with environment variable overrides.

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutovpnConfig {
    /// Address the task API listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Path of the playbook database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Seconds between auto-update reconciliation passes.
    #[serde(default = "default_autoupdate_tick_secs")]
    pub autoupdate_tick_secs: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:15328".to_string()
}

fn default_db_path() -> String {
    "autovpn_playbooks.db".to_string()
}

fn default_autoupdate_tick_secs() -> u64 {
    3600
}

impl Default for AutovpnConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            db_path: default_db_path(),
            autoupdate_tick_secs: default_autoupdate_tick_secs(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AutovpnConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Load configuration: defaults, then the file if given, then the
    /// `AUTOVPN_LISTEN` / `AUTOVPN_DB` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        if let Ok(listen) = std::env::var("AUTOVPN_LISTEN") {
            config.listen_addr = listen;
        }
        if let Ok(db) = std::env::var("AUTOVPN_DB") {
            config.db_path = db;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = AutovpnConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:15328");
        assert_eq!(config.db_path, "autovpn_playbooks.db");
        assert_eq!(config.autoupdate_tick_secs, 3600);
    }

    #[test]
    fn parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autovpn.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "listen_addr = \"127.0.0.1:9000\"\n\n[logging]\nlevel = \"debug\""
        )
        .unwrap();

        let config = AutovpnConfig::load_from_file(&path).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.db_path, "autovpn_playbooks.db");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autovpn.toml");
        std::fs::write(&path, "listen_addr = [").unwrap();
        assert!(matches!(
            AutovpnConfig::load_from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
