//! CLI error types with miette diagnostics.
//!
//! Maps config and transport errors into user-facing errors with actionable
//! help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use tasconf_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    #[allow(dead_code)]
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const DEVICES_FAILED: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to MQTT broker at {broker}")]
    #[diagnostic(
        code(tasconf::connection_failed),
        help(
            "{reason}\n\
             Check that the broker is running and reachable, and that the\n\
             credentials are right. Set it with --mqtt-broker or TASCONF_BROKER."
        )
    )]
    ConnectionFailed { broker: String, reason: String },

    #[error("{operation} timed out after {millis}ms")]
    #[diagnostic(
        code(tasconf::timeout),
        help("Increase the wait with --mqtt-command-timeout or check broker load.")
    )]
    Timeout { operation: String, millis: u128 },

    #[error(transparent)]
    #[diagnostic(code(tasconf::transport))]
    Transport(tasconf_api::Error),

    // ── Configuration ────────────────────────────────────────────────
    #[error("Desired-state document not found: {path}")]
    #[diagnostic(
        code(tasconf::no_desired_state),
        help(
            "Pass it with --config <FILE>, or set desired_state in {settings_path}\n\
             or TASCONF_DESIRED_STATE."
        )
    )]
    DesiredStateNotFound { path: String, settings_path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tasconf::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(tasconf::config))]
    Config(Box<figment::Error>),

    // ── Run results ──────────────────────────────────────────────────
    #[error("{failed} of {total} device(s) failed")]
    #[diagnostic(
        code(tasconf::devices_failed),
        help("Run with -v for per-setting logs, or drop --strict to ignore device failures.")
    )]
    DevicesFailed { failed: usize, total: usize },

    #[error("Interrupted")]
    #[diagnostic(code(tasconf::interrupted))]
    Interrupted,

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(tasconf::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(tasconf::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Transport(e) if e.is_connection() => exit_code::CONNECTION,
            Self::DesiredStateNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            Self::DevicesFailed { .. } => exit_code::DEVICES_FAILED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => Self::DesiredStateNotFound {
                path: path.display().to_string(),
                settings_path: tasconf_config::config_path().display().to_string(),
            },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Figment(err) => Self::Config(err),
        }
    }
}

impl From<tasconf_api::Error> for CliError {
    fn from(err: tasconf_api::Error) -> Self {
        use tasconf_api::Error;

        match err {
            Error::Connection { broker, reason } => Self::ConnectionFailed { broker, reason },
            Error::Timeout {
                operation,
                topic,
                timeout,
            } => Self::Timeout {
                operation: format!("{operation} on '{topic}'"),
                millis: timeout.as_millis(),
            },
            Error::InvalidBrokerUrl { url, reason } => Self::Validation {
                field: "broker".into(),
                reason: format!("'{url}': {reason}"),
            },
            other => Self::Transport(other),
        }
    }
}
