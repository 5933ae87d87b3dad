//! Configuration for tasconf.
//!
//! Two documents: the desired-state YAML describing devices, and the tool
//! settings (broker, credentials, timeouts) layered from defaults, an
//! optional TOML file and `TASCONF_*` environment variables. The CLI puts
//! its flags on top of the latter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml, Yaml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use tasconf_api::BrokerConfig;
use tasconf_core::DesiredConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("desired-state file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Tool settings ───────────────────────────────────────────────────

/// Environment variable prefix for every settings key.
pub const ENV_PREFIX: &str = "TASCONF_";

/// Broker connection and run defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Broker URL (`tcp://`, `mqtt://`, `ssl://`, `tls://` or `mqtts://`).
    #[serde(default = "default_broker")]
    pub broker: String,

    pub username: Option<String>,

    /// Plaintext in the file; prefer `TASCONF_PASSWORD`.
    pub password: Option<String>,

    /// MQTT client id; a random one is generated when unset.
    pub client_id: Option<String>,

    /// How long to wait for acknowledgements and device replies.
    #[serde(default = "default_command_timeout")]
    pub command_timeout: String,

    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,

    /// Path of the desired-state document.
    #[serde(default = "default_desired_state")]
    pub desired_state: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            username: None,
            password: None,
            client_id: None,
            command_timeout: default_command_timeout(),
            keep_alive: default_keep_alive(),
            desired_state: default_desired_state(),
        }
    }
}

fn default_broker() -> String {
    "tcp://localhost:1883".into()
}
fn default_command_timeout() -> String {
    "2s".into()
}
fn default_keep_alive() -> String {
    "30s".into()
}
fn default_desired_state() -> PathBuf {
    PathBuf::from("config.yaml")
}

impl Settings {
    pub fn command_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration("command_timeout", &self.command_timeout)
    }

    pub fn keep_alive(&self) -> Result<Duration, ConfigError> {
        parse_duration("keep_alive", &self.keep_alive)
    }

    /// Validate the broker fields and build the transport configuration.
    pub fn broker_config(&self) -> Result<BrokerConfig, ConfigError> {
        let url = Url::parse(&self.broker).map_err(|e| ConfigError::Validation {
            field: "broker".into(),
            reason: format!("'{}': {e}", self.broker),
        })?;

        let mut config = BrokerConfig::new(url);
        config.endpoint().map_err(|e| ConfigError::Validation {
            field: "broker".into(),
            reason: e.to_string(),
        })?;

        if let Some(ref id) = self.client_id {
            config.client_id.clone_from(id);
        }
        config.username.clone_from(&self.username);
        config.password = self.password.clone().map(SecretString::from);
        config.command_timeout = self.command_timeout()?;
        config.keep_alive = self.keep_alive()?;
        Ok(config)
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    let duration = humantime::parse_duration(value).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("'{value}': {e}"),
    })?;
    if duration.is_zero() {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(duration)
}

// ── Settings file path ──────────────────────────────────────────────

/// Platform config file location, e.g. `~/.config/tasconf/config.toml`.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "tasconf", "tasconf").map_or_else(
        || PathBuf::from(".tasconf.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load settings from the platform config file and the environment.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(&config_path())
}

/// Load settings from `path` (ignored when missing) and the environment.
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    tracing::debug!(path = %path.display(), "loading settings");
    let settings = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()?;
    Ok(settings)
}

/// Load and validate a desired-state document.
pub fn load_desired_state(path: &Path) -> Result<DesiredConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let desired: DesiredConfig = Figment::new()
        .merge(Serialized::defaults(DesiredConfig::default()))
        .merge(Yaml::file(path))
        .extract()?;

    validate_desired(&desired)?;
    tracing::debug!(
        path = %path.display(),
        devices = desired.devices.len(),
        settings = desired.settings.len(),
        "loaded desired state"
    );
    Ok(desired)
}

fn validate_desired(desired: &DesiredConfig) -> Result<(), ConfigError> {
    for (field, prefix) in [
        ("command_prefix", &desired.command_prefix),
        ("stat_prefix", &desired.stat_prefix),
    ] {
        if prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::Validation {
                field: field.into(),
                reason: "must not be empty".into(),
            });
        }
    }

    for (name, device) in &desired.devices {
        if device.topic.trim_matches('/').is_empty() {
            return Err(ConfigError::Validation {
                field: format!("devices.{name}.topic"),
                reason: "must not be empty".into(),
            });
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────
