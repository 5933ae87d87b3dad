//! Clap derive structures for the `tasconf` CLI.
//!
//! Also compiled by `build.rs` for man page generation, so this module may
//! only depend on clap, clap_complete and std.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tasconf -- keep Tasmota device settings in sync over MQTT
#[derive(Debug, Parser)]
#[command(
    name = "tasconf",
    version,
    about = "Keep Tasmota device settings in sync with a desired state",
    long_about = "Reads a YAML document describing Tasmota devices and their settings,\n\
        queries every device over MQTT and sends a single BackLog command with\n\
        whatever differs.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Desired-state YAML document [default: config.yaml]
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// MQTT broker URL (tcp://, mqtt://, ssl://, tls://, mqtts://)
    #[arg(long, global = true, value_name = "URL")]
    pub mqtt_broker: Option<String>,

    /// MQTT username
    #[arg(long, global = true)]
    pub mqtt_username: Option<String>,

    /// MQTT password
    #[arg(long, global = true)]
    pub mqtt_password: Option<String>,

    /// MQTT client id [default: tasconf-<random>]
    #[arg(long, global = true)]
    pub mqtt_client_id: Option<String>,

    /// How long to wait for acknowledgements and device replies (e.g. 2s, 500ms)
    #[arg(long, global = true, value_name = "DURATION")]
    pub mqtt_command_timeout: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Query devices and apply the settings that differ
    Sync(SyncArgs),

    /// Print effective settings and channels without connecting
    Show(ShowArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Only process this device
    #[arg(long, short = 'd', value_name = "NAME")]
    pub device: Option<String>,

    /// Report needed changes without applying them
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Exit with status 9 if any device failed
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Only show this device
    #[arg(long, short = 'd', value_name = "NAME")]
    pub device: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
