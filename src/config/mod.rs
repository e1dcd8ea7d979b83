//! # Configuration Management Module
//!
//! Process configuration is loaded once at startup and is read-only afterwards.
//!
//! ## Configuration Structure
//!
//! - [`RelayConfig`] - admin identity, fallback channel, message length cap
//! - [`AccessConfig`] - the two access codes (one per role)
//! - [`StorageConfig`] - location of the state document
//! - [`LoggingConfig`] - log level and log files
//! - [`TelegramConfig`] - bot token for the Telegram transport
//!
//! ## Configuration File Format
//!
//! ```toml
//! [relay]
//! admin_id = "123456789"
//! default_channel_id = "-1001234567890"
//! max_message_len = 2000
//!
//! [access]
//! code_it = "ITALIA2024"
//! code_cn = "ZHONGGUO2024"
//!
//! [storage]
//! data_dir = "./data"
//! db_file = "db.json"
//!
//! [logging]
//! level = "info"
//! file = "anonrelay.log"
//! security_file = "anonrelay-security.log"
//! ```
//!
//! ## Environment Integration
//!
//! After the file is parsed, [Config::apply_env_overrides] applies `BOT_TOKEN`,
//! `ADMIN_ID`, `ACCESS_CODE_IT`, `ACCESS_CODE_CN`, `CHANNEL_ID` and
//! `ANONRELAY_DATA_DIR`. Precedence: Environment > Config file > Defaults.
//! [Config::validate] runs last.

use anyhow::{anyhow, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::fs;

use crate::validation::{validate_access_codes, ConfigError};

/// Default cap on relayed message length, in UTF-16 code units.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub relay: RelayConfig,
    pub access: AccessConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Transport identity allowed to run admin commands.
    pub admin_id: String,
    /// Destination used while no channel has been bound at runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_channel_id: Option<String>,
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

fn default_max_message_len() -> usize {
    DEFAULT_MAX_MESSAGE_LEN
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    pub code_it: String,
    pub code_cn: String,
}

impl fmt::Debug for AccessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessConfig")
            .field("code_it", &"<redacted>")
            .field("code_cn", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    #[serde(default = "default_db_file")]
    pub db_file: String,
}

fn default_db_file() -> String {
    "db.json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Never written back to disk; prefer `BOT_TOKEN`.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Load the file and overlay the environment through `lookup`.
    pub async fn load_with_env<F>(path: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::load(path).await?;
        config.apply_env_overrides(lookup);
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production; empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("BOT_TOKEN") {
            self.telegram.token = Some(v);
        }
        if let Some(v) = get("ADMIN_ID") {
            debug!("ADMIN_ID taken from environment");
            self.relay.admin_id = v;
        }
        if let Some(v) = get("ACCESS_CODE_IT") {
            self.access.code_it = v;
        }
        if let Some(v) = get("ACCESS_CODE_CN") {
            self.access.code_cn = v;
        }
        if let Some(v) = get("CHANNEL_ID") {
            self.relay.default_channel_id = Some(v);
        }
        if let Some(v) = get("ANONRELAY_DATA_DIR") {
            self.storage.data_dir = v;
        }
    }

    /// Check the values the relay core depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.admin_id.trim().is_empty() {
            return Err(ConfigError::MissingAdmin);
        }
        if self.relay.max_message_len == 0 {
            return Err(ConfigError::ZeroMessageLimit);
        }
        validate_access_codes(&self.access.code_it, &self.access.code_cn)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            relay: RelayConfig {
                admin_id: "".to_string(),
                default_channel_id: None,
                max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            },
            access: AccessConfig {
                code_it: "".to_string(),
                code_cn: "".to_string(),
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                db_file: default_db_file(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("anonrelay.log".to_string()),
                security_file: Some("anonrelay-security.log".to_string()),
            },
            telegram: TelegramConfig::default(),
        }
    }
}
