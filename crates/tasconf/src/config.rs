//! Flag overrides on top of the layered settings.
//!
//! Precedence, lowest first: built-in defaults, the settings file,
//! `TASCONF_*` environment variables, command-line flags.

use std::path::PathBuf;

use tasconf_config::Settings;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Load settings from file and environment, then apply the global flags.
pub fn resolve_settings(global: &GlobalOpts) -> Result<Settings, CliError> {
    let settings = tasconf_config::load_settings()?;
    Ok(apply_flags(settings, global))
}

fn apply_flags(mut settings: Settings, global: &GlobalOpts) -> Settings {
    if let Some(ref broker) = global.mqtt_broker {
        settings.broker.clone_from(broker);
    }
    if global.mqtt_username.is_some() {
        settings.username.clone_from(&global.mqtt_username);
    }
    if global.mqtt_password.is_some() {
        settings.password.clone_from(&global.mqtt_password);
    }
    if global.mqtt_client_id.is_some() {
        settings.client_id.clone_from(&global.mqtt_client_id);
    }
    if let Some(ref timeout) = global.mqtt_command_timeout {
        settings.command_timeout.clone_from(timeout);
    }
    if let Some(ref path) = global.config {
        settings.desired_state.clone_from(path);
    }
    settings
}

/// Path of the desired-state document after all overrides.
pub fn desired_state_path(settings: &Settings) -> PathBuf {
    settings.desired_state.clone()
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["tasconf"];
        argv.extend_from_slice(args);
        argv.push("show");
        Cli::parse_from(argv).global
    }

    #[test]
    fn flags_override_settings() {
        let opts = global(&[
            "--mqtt-broker",
            "mqtts://broker.lan",
            "--mqtt-username",
            "ops",
            "--mqtt-command-timeout",
            "750ms",
            "-c",
            "devices.yaml",
        ]);

        let settings = apply_flags(Settings::default(), &opts);
        assert_eq!(settings.broker, "mqtts://broker.lan");
        assert_eq!(settings.username.as_deref(), Some("ops"));
        assert_eq!(settings.command_timeout, "750ms");
        assert_eq!(desired_state_path(&settings), PathBuf::from("devices.yaml"));
    }

    #[test]
    fn absent_flags_keep_settings() {
        let base = Settings {
            username: Some("from-file".into()),
            ..Settings::default()
        };
        let settings = apply_flags(base, &global(&[]));
        assert_eq!(settings.username.as_deref(), Some("from-file"));
        assert_eq!(settings.broker, "tcp://localhost:1883");
        assert_eq!(desired_state_path(&settings), PathBuf::from("config.yaml"));
    }
}
