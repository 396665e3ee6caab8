//! Configuration module for duel-server.
//!
//! Handles loading configuration from the TOML file and CLI overrides, and
//! validating it into the runtime types the core runs with.

pub mod file;
pub mod runtime;

use crate::config::file::{
    FileConfig, LedgerConfig as FileLedgerConfig, MatchmakingConfig as FileMatchmakingConfig,
};
use crate::config::runtime::{LedgerConfig, MatchmakingConfig, ServerConfig, SharedConfig};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Loaded configuration result containing all parts.
#[derive(Debug)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub matchmaking: MatchmakingConfig,
    pub ledger: LedgerConfig,
}

impl LoadedConfig {
    /// Convert into a SharedConfig with one lock per section.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig::new(self.server, self.matchmaking, self.ledger)
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides and validate.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        Ok(LoadedConfig {
            server: ServerConfig {
                listen: file_config.server.listen,
            },
            matchmaking: convert_matchmaking(&file_config.matchmaking)?,
            ledger: convert_ledger(file_config.ledger)?,
        })
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

/// Whole seconds as a strictly positive duration.
fn positive_secs(field: &str, secs: u64) -> Result<time::Duration, ConfigError> {
    match i64::try_from(secs) {
        Ok(secs) if secs > 0 => Ok(time::Duration::seconds(secs)),
        _ => Err(ConfigError::ValidationError(format!(
            "{field} must be a positive number of seconds, got {secs}"
        ))),
    }
}

fn convert_matchmaking(m: &FileMatchmakingConfig) -> Result<MatchmakingConfig, ConfigError> {
    if m.outbound_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "matchmaking.outbound_buffer must be positive".into(),
        ));
    }
    Ok(MatchmakingConfig {
        pre_commitment_ttl: positive_secs(
            "matchmaking.pre_commitment_ttl_secs",
            m.pre_commitment_ttl_secs,
        )?,
        sweep_interval: positive_secs("matchmaking.sweep_interval_secs", m.sweep_interval_secs)?,
        completed_retention: positive_secs(
            "matchmaking.completed_retention_secs",
            m.completed_retention_secs,
        )?,
        outbound_buffer: m.outbound_buffer,
    })
}

fn convert_ledger(l: FileLedgerConfig) -> Result<LedgerConfig, ConfigError> {
    if l.secret.is_empty() {
        return Err(ConfigError::ValidationError(
            "ledger.secret must not be empty".into(),
        ));
    }
    if l.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "ledger.request_timeout_secs must be positive".into(),
        ));
    }
    Ok(LedgerConfig::new(
        l.endpoint,
        l.secret.into_bytes().into_boxed_slice(),
        std::time::Duration::from_secs(l.request_timeout_secs),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("duel-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    const VALID: &str = r#"
[server]
listen = "127.0.0.1:3000"

[matchmaking]
pre_commitment_ttl_secs = 120
sweep_interval_secs = 5

[ledger]
secret = "shared-secret"
"#;

    #[test]
    fn test_load_applies_listen_override() {
        let path = write_config(VALID);
        let override_addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let loaded = ConfigLoader::new(&path, Some(override_addr)).load().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.server.listen, override_addr);
        assert_eq!(loaded.matchmaking.pre_commitment_ttl, time::Duration::seconds(120));
        assert_eq!(loaded.matchmaking.completed_retention, time::Duration::seconds(60));
        assert_eq!(loaded.ledger.secret_bytes(), b"shared-secret");
        assert!(loaded.ledger.endpoint.is_none());
    }

    #[test]
    fn test_zero_durations_rejected() {
        let file = FileMatchmakingConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            convert_matchmaking(&file),
            Err(ConfigError::ValidationError(_))
        ));

        let file = FileMatchmakingConfig {
            outbound_buffer: 0,
            ..Default::default()
        };
        assert!(convert_matchmaking(&file).is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let ledger = FileLedgerConfig {
            endpoint: None,
            secret: String::new(),
            request_timeout_secs: 10,
        };
        assert!(matches!(
            convert_ledger(ledger),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("duel-config-does-not-exist.toml");
        assert!(matches!(
            ConfigLoader::new(path, None).load(),
            Err(ConfigError::IoError(_))
        ));
    }
}
