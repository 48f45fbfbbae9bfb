//! # ib-config
//!
//! Layered settings: built-in defaults, an optional `idea-board.toml`, then
//! `IDEA_BOARD__SECTION__KEY` environment variables (after `.env` is read).

use std::time::Duration;

use config::{Config, Environment, File, Map};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "IDEA_BOARD";
pub const ENV_SEPARATOR: &str = "__";
pub const CONFIG_FILE: &str = "idea-board";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub sync: SyncSettings,
    pub log: LogSettings,
}

/// Hosted document store. Without a project id the in-memory store is used.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub project_id: Option<String>,
    pub dataset: String,
    pub api_version: String,
    #[serde(deserialize_with = "optional_secret")]
    pub token: Option<SecretString>,
    pub use_cdn: bool,
    pub timeout_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            project_id: None,
            dataset: "production".into(),
            api_version: "2025-06-17".into(),
            token: None,
            use_cdn: false,
            timeout_secs: 10,
        }
    }
}

impl StoreSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn remote_project(&self) -> Option<&str> {
        self.project_id.as_deref().filter(|p| !p.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Max distance between an optimistic comment and the stored copy that absorbs it
    pub comment_dedup_window_secs: u64,
    pub page_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            comment_dedup_window_secs: 60,
            page_size: 12,
        }
    }
}

impl SyncSettings {
    pub fn comment_dedup_window(&self) -> Duration {
        Duration::from_secs(self.comment_dedup_window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive; `RUST_LOG` wins when set
    pub filter: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}

fn optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|token| !token.trim().is_empty())
        .map(SecretString::from))
}

impl Settings {
    /// Reads `.env`, the optional config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_map(None)
    }

    /// Same layering with an explicit environment in place of the process one.
    pub fn from_env_map(env: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        debug!(
            remote = settings.store.remote_project().is_some(),
            dataset = %settings.store.dataset,
            page_size = settings.sync.page_size,
            "settings loaded"
        );
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.page_size == 0 {
            return Err(ConfigError::Invalid {
                key: "sync.page_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.store.remote_project().is_some() && self.store.dataset.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "store.dataset",
                reason: "required when store.project_id is set".into(),
            });
        }
        Ok(())
    }
}
