// ── Device reconciler ──
//
// One pass over one device: subscribe to its result channel, query every
// effective setting in name order, compare, then send all changes in a
// single BackLog command. The subscription is released on every exit path
// once it was established.

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tasconf_api::{DeviceChannels, Transport};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::correlator::{ResponseCorrelator, reply_queue};
use crate::desired::SettingMap;
use crate::error::CoreError;
use crate::report::{DeviceReport, Outcome, SettingCheck};
use crate::value::SettingValue;

/// Separator between items of a BackLog command.
pub const BACKLOG_SEPARATOR: &str = "; ";

/// A setting whose device value differs from the desired one.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub setting: String,
    pub desired: SettingValue,
    pub actual: SettingValue,
}

/// Render mismatches as one BackLog payload, in the order given.
pub fn backlog_command(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(|m| format!("{} {}", m.setting, m.desired))
        .collect::<Vec<_>>()
        .join(BACKLOG_SEPARATOR)
}

/// Options shared by every device in a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Report changes without publishing them.
    pub dry_run: bool,
    /// How long to wait for each device reply.
    pub command_timeout: Duration,
    /// Only reconcile the device with this name.
    pub device_filter: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            command_timeout: Duration::from_secs(2),
            device_filter: None,
        }
    }
}

// ── DeviceReconciler ─────────────────────────────────────────────────

pub struct DeviceReconciler<'a, T> {
    transport: &'a T,
    options: &'a RunOptions,
    cancel: &'a CancellationToken,
}

impl<'a, T: Transport> DeviceReconciler<'a, T> {
    pub fn new(transport: &'a T, options: &'a RunOptions, cancel: &'a CancellationToken) -> Self {
        Self {
            transport,
            options,
            cancel,
        }
    }

    /// Reconcile one device. Failures end up in the report's outcome.
    pub async fn reconcile(
        &self,
        device: &str,
        channels: &DeviceChannels,
        settings: &SettingMap,
    ) -> DeviceReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut checks = Vec::with_capacity(settings.len());

        tracing::info!(device, topic = channels.segment(), settings = settings.len(), "reconciling");

        let outcome = match self.run(device, channels, settings, &mut checks).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(device, error = %err, "processing aborted");
                Outcome::failed(&err)
            }
        };

        let elapsed_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = DeviceReport {
            device: device.to_owned(),
            topic: channels.segment().to_owned(),
            started_at,
            elapsed_ms,
            checks,
            outcome,
        };
        tracing::info!(device, elapsed_ms, status = %report.summary(), "device done");
        report
    }

    async fn run(
        &self,
        device: &str,
        channels: &DeviceChannels,
        settings: &SettingMap,
        checks: &mut Vec<SettingCheck>,
    ) -> Result<Outcome, CoreError> {
        let result_topic = channels.result();
        let (sink, replies) = reply_queue();

        self.transport
            .subscribe(result_topic, sink)
            .await
            .map_err(|source| CoreError::Subscription {
                topic: result_topic.to_owned(),
                source,
            })?;

        let mut correlator = ResponseCorrelator::new(replies, self.options.command_timeout);
        let outcome = self
            .check_and_apply(device, channels, settings, &mut correlator, checks)
            .await;

        if let Err(err) = self.transport.unsubscribe(result_topic).await {
            tracing::warn!(device, topic = result_topic, error = %err, "unsubscribe failed");
        }
        outcome
    }

    async fn check_and_apply(
        &self,
        device: &str,
        channels: &DeviceChannels,
        settings: &SettingMap,
        correlator: &mut ResponseCorrelator,
        checks: &mut Vec<SettingCheck>,
    ) -> Result<Outcome, CoreError> {
        let mut mismatches = Vec::new();

        for (setting, expected) in settings {
            if self.cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            let actual = self.query(channels, setting, correlator).await?;
            let in_sync = actual == *expected;
            if in_sync {
                tracing::debug!(device, setting = setting.as_str(), value = %actual, "in sync");
            } else {
                tracing::warn!(
                    device,
                    setting = setting.as_str(),
                    expected = %expected,
                    expected_kind = expected.kind(),
                    actual = %actual,
                    actual_kind = actual.kind(),
                    "mismatch"
                );
                mismatches.push(Mismatch {
                    setting: setting.clone(),
                    desired: expected.clone(),
                    actual: actual.clone(),
                });
            }
            checks.push(SettingCheck {
                setting: setting.clone(),
                expected: expected.clone(),
                actual,
                in_sync,
            });
        }

        if mismatches.is_empty() {
            return Ok(Outcome::InSync);
        }

        let command = backlog_command(&mismatches);
        let changes = mismatches.len();
        if self.options.dry_run {
            tracing::info!(device, changes, "dry run, not applying");
            return Ok(Outcome::Suppressed { command, changes });
        }

        let topic = channels.backlog();
        tracing::trace!(device, topic = %topic, payload = %command, "applying");
        self.transport
            .publish(&topic, Bytes::from(command.clone()))
            .await
            .map_err(|source| CoreError::Apply { source })?;

        Ok(Outcome::Applied { command, changes })
    }

    async fn query(
        &self,
        channels: &DeviceChannels,
        setting: &str,
        correlator: &mut ResponseCorrelator,
    ) -> Result<SettingValue, CoreError> {
        self.transport
            .publish(&channels.query(setting), Bytes::new())
            .await
            .map_err(|source| CoreError::Query {
                setting: setting.to_owned(),
                source,
            })?;

        correlator
            .await_response(setting)
            .await
            .map_err(|source| CoreError::Extraction {
                setting: setting.to_owned(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mismatch(setting: &str, desired: impl Into<SettingValue>) -> Mismatch {
        Mismatch {
            setting: setting.into(),
            desired: desired.into(),
            actual: SettingValue::Int(0),
        }
    }

    #[test]
    fn backlog_joins_in_order() {
        let cmd = backlog_command(&[
            mismatch("ledstate", 1_i64),
            mismatch("otaurl", "http://ota/fw.bin"),
            mismatch("teleperiod", 300_i64),
        ]);
        assert_eq!(cmd, "ledstate 1; otaurl http://ota/fw.bin; teleperiod 300");
    }

    #[test]
    fn backlog_single_item_has_no_separator() {
        assert_eq!(backlog_command(&[mismatch("teleperiod", 300_i64)]), "teleperiod 300");
    }
}
