//! Output formatting: table, JSON, YAML.
//!
//! Table output uses `tabled`, structured formats serialize the same data
//! via serde.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use tasconf_core::{DeviceReport, Outcome, RunSummary};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

fn status_label(report: &DeviceReport, color: bool) -> String {
    let label = match report.outcome {
        Outcome::InSync => "in sync",
        Outcome::Applied { .. } => "applied",
        Outcome::Suppressed { .. } => "dry run",
        Outcome::Failed { .. } => "failed",
    };
    if !color {
        return label.to_owned();
    }
    match report.outcome {
        Outcome::InSync => label.green().to_string(),
        Outcome::Applied { .. } => label.cyan().to_string(),
        Outcome::Suppressed { .. } => label.yellow().to_string(),
        Outcome::Failed { .. } => label.red().bold().to_string(),
    }
}

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "DEVICE")]
    device: String,
    #[tabled(rename = "TOPIC")]
    topic: String,
    #[tabled(rename = "CHECKED")]
    checked: usize,
    #[tabled(rename = "MISMATCHES")]
    mismatches: usize,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "STARTED")]
    started: String,
    #[tabled(rename = "ELAPSED")]
    elapsed: String,
}

#[derive(Tabled)]
struct MismatchRow {
    #[tabled(rename = "DEVICE")]
    device: String,
    #[tabled(rename = "SETTING")]
    setting: String,
    #[tabled(rename = "EXPECTED")]
    expected: String,
    #[tabled(rename = "ACTUAL")]
    actual: String,
}

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "DEVICE")]
    device: String,
    #[tabled(rename = "SETTING")]
    setting: String,
    #[tabled(rename = "VALUE")]
    value: String,
    #[tabled(rename = "QUERY TOPIC")]
    query: String,
}

#[derive(Tabled)]
struct ChannelRow {
    #[tabled(rename = "DEVICE")]
    device: String,
    #[tabled(rename = "RESULT")]
    result: String,
    #[tabled(rename = "BACKLOG")]
    backlog: String,
}

// ── Device view for `show` ───────────────────────────────────────────

/// Effective configuration of one device, as printed by `show`.
#[derive(Debug, Serialize)]
pub struct DeviceView {
    pub device: String,
    pub topic: String,
    pub result_topic: String,
    pub backlog_topic: String,
    /// Effective settings in name order.
    pub settings: Vec<SettingView>,
}

#[derive(Debug, Serialize)]
pub struct SettingView {
    pub name: String,
    pub value: tasconf_core::SettingValue,
    pub query_topic: String,
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render the reports of a `sync` run.
pub fn render_summary(
    format: OutputFormat,
    summary: &RunSummary,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(summary)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(summary)?),
        OutputFormat::Table => Ok(summary_table(summary, color)),
    }
}

/// Render the device views of `show`.
pub fn render_devices(format: OutputFormat, devices: &[DeviceView]) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(devices)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(devices)?),
        OutputFormat::Table => Ok(devices_table(devices)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Tables ───────────────────────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn summary_table(summary: &RunSummary, color: bool) -> String {
    if summary.reports.is_empty() {
        return "No devices processed.".into();
    }

    let rows: Vec<ReportRow> = summary
        .reports
        .iter()
        .map(|r| ReportRow {
            device: r.device.clone(),
            topic: r.topic.clone(),
            checked: r.checks.len(),
            mismatches: r.mismatches().count(),
            status: status_label(r, color),
            started: r.started_at.format("%H:%M:%S").to_string(),
            elapsed: format!("{}ms", r.elapsed_ms),
        })
        .collect();

    let mismatches: Vec<MismatchRow> = summary
        .reports
        .iter()
        .flat_map(|r| {
            r.mismatches().map(|c| MismatchRow {
                device: r.device.clone(),
                setting: c.setting.clone(),
                expected: c.expected.to_string(),
                actual: c.actual.to_string(),
            })
        })
        .collect();

    let mut out = render_table(&rows);
    if !mismatches.is_empty() {
        out.push_str("\n\n");
        out.push_str(&render_table(&mismatches));
    }

    for report in &summary.reports {
        out.push_str(&format!("\n{}: {}", report.device, report.summary()));
    }
    out
}

fn devices_table(devices: &[DeviceView]) -> String {
    if devices.is_empty() {
        return "No devices configured.".into();
    }

    let channels: Vec<ChannelRow> = devices
        .iter()
        .map(|d| ChannelRow {
            device: d.device.clone(),
            result: d.result_topic.clone(),
            backlog: d.backlog_topic.clone(),
        })
        .collect();

    let settings: Vec<SettingRow> = devices
        .iter()
        .flat_map(|d| {
            d.settings.iter().map(|s| SettingRow {
                device: d.device.clone(),
                setting: s.name.clone(),
                value: s.value.to_string(),
                query: s.query_topic.clone(),
            })
        })
        .collect();

    let mut out = render_table(&channels);
    if !settings.is_empty() {
        out.push_str("\n\n");
        out.push_str(&render_table(&settings));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use tasconf_core::{SettingCheck, SettingValue};

    use super::*;

    fn summary() -> RunSummary {
        RunSummary {
            reports: vec![DeviceReport {
                device: "plug".into(),
                topic: "tasmota_plug".into(),
                started_at: Utc::now(),
                elapsed_ms: 12,
                checks: vec![SettingCheck {
                    setting: "teleperiod".into(),
                    expected: SettingValue::Int(300),
                    actual: SettingValue::Int(60),
                    in_sync: false,
                }],
                outcome: Outcome::Applied {
                    command: "teleperiod 300".into(),
                    changes: 1,
                },
            }],
            cancelled: false,
        }
    }

    #[test]
    fn table_lists_devices_and_mismatches() {
        let out = render_summary(OutputFormat::Table, &summary(), false).unwrap();
        assert!(out.contains("plug"));
        assert!(out.contains("applied"));
        assert!(out.contains("teleperiod"));
        assert!(out.contains("plug: applied 1 change(s)"));
    }

    #[test]
    fn json_carries_outcome() {
        let out = render_summary(OutputFormat::Json, &summary(), false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["reports"][0]["outcome"]["status"], "applied");
        assert_eq!(value["reports"][0]["checks"][0]["actual"], 60);
    }

    #[test]
    fn empty_run() {
        let out = render_summary(OutputFormat::Table, &RunSummary::default(), false).unwrap();
        assert_eq!(out, "No devices processed.");
    }

    #[test]
    fn colored_status_only_when_enabled() {
        let summary = summary();
        let report = &summary.reports[0];
        assert_eq!(status_label(report, false), "applied");
        assert!(status_label(report, true).contains("\u{1b}["));
    }
}
