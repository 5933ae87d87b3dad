// ── Device reports ──
//
// The observable result of reconciling one device. Serializable so the CLI
// can emit it as JSON or YAML as well as a table.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CoreError, FailureKind};
use crate::value::SettingValue;

/// One setting as it was checked against the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingCheck {
    pub setting: String,
    pub expected: SettingValue,
    pub actual: SettingValue,
    pub in_sync: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Every checked setting matched.
    InSync,
    /// The batch command was published.
    Applied { command: String, changes: usize },
    /// Changes were needed but the run was a dry run.
    Suppressed { command: String, changes: usize },
    /// The pass stopped early.
    Failed { kind: FailureKind, reason: String },
}

impl Outcome {
    pub fn failed(err: &CoreError) -> Self {
        Self::Failed {
            kind: err.kind(),
            reason: err.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Whether the device was out of sync, applied or not.
    pub fn has_changes(&self) -> bool {
        matches!(self, Self::Applied { .. } | Self::Suppressed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub device: String,
    pub topic: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Settings checked before the pass finished or stopped.
    pub checks: Vec<SettingCheck>,
    pub outcome: Outcome,
}

impl DeviceReport {
    /// One-line status as shown to the user.
    pub fn summary(&self) -> String {
        match &self.outcome {
            Outcome::InSync => "no changes needed".into(),
            Outcome::Applied { changes, .. } => format!("applied {changes} change(s)"),
            Outcome::Suppressed { .. } => "changes needed but suppressed by dry-run".into(),
            Outcome::Failed { reason, .. } => format!("processing aborted: {reason}"),
        }
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &SettingCheck> {
        self.checks.iter().filter(|c| !c.in_sync)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn report(outcome: Outcome) -> DeviceReport {
        DeviceReport {
            device: "plug".into(),
            topic: "tasmota_plug".into(),
            started_at: Utc::now(),
            elapsed_ms: 0,
            checks: Vec::new(),
            outcome,
        }
    }

    #[test]
    fn summaries() {
        assert_eq!(report(Outcome::InSync).summary(), "no changes needed");
        assert_eq!(
            report(Outcome::Applied {
                command: "teleperiod 300".into(),
                changes: 1
            })
            .summary(),
            "applied 1 change(s)"
        );
        assert_eq!(
            report(Outcome::Suppressed {
                command: "teleperiod 300".into(),
                changes: 1
            })
            .summary(),
            "changes needed but suppressed by dry-run"
        );
        assert_eq!(
            report(Outcome::failed(&CoreError::Cancelled)).summary(),
            "processing aborted: cancelled"
        );
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_value(report(Outcome::Suppressed {
            command: "ledstate 1".into(),
            changes: 1,
        }))
        .unwrap();
        assert_eq!(json["outcome"]["status"], "suppressed");
        assert_eq!(json["outcome"]["command"], "ledstate 1");

        let json = serde_json::to_value(report(Outcome::failed(&CoreError::Cancelled))).unwrap();
        assert_eq!(json["outcome"]["kind"], "cancelled");
    }
}
