// ── Reconciliation driver ──
//
// Walks the devices of a desired-state document one after another. A
// failing device only affects its own report.

use serde::Serialize;
use tasconf_api::Transport;
use tokio_util::sync::CancellationToken;

use crate::desired::DesiredConfig;
use crate::error::FailureKind;
use crate::reconciler::{DeviceReconciler, RunOptions};
use crate::report::{DeviceReport, Outcome};

/// Result of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub reports: Vec<DeviceReport>,
    /// A shutdown request stopped the run before every device was visited.
    pub cancelled: bool,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn changed(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.has_changes()).count()
    }
}

pub struct Driver<'a, T> {
    transport: &'a T,
    options: RunOptions,
    cancel: CancellationToken,
}

impl<'a, T: Transport> Driver<'a, T> {
    pub fn new(transport: &'a T, options: RunOptions) -> Self {
        Self {
            transport,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between devices and settings once `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self, desired: &DesiredConfig) -> RunSummary {
        let filter = self.options.device_filter.as_deref();
        if let Some(name) = filter {
            if !desired.devices.contains_key(name) {
                tracing::warn!(device = name, "device not found in desired state");
            }
        }

        let reconciler = DeviceReconciler::new(self.transport, &self.options, &self.cancel);
        let mut summary = RunSummary::default();

        for (name, device) in desired.select(filter) {
            if self.cancel.is_cancelled() {
                tracing::info!("shutdown requested, skipping remaining devices");
                summary.cancelled = true;
                break;
            }

            let settings = desired.effective_settings(device);
            let channels = desired.channels(device);
            let report = reconciler.reconcile(name, &channels, &settings).await;
            summary.cancelled |= matches!(
                report.outcome,
                Outcome::Failed {
                    kind: FailureKind::Cancelled,
                    ..
                }
            );
            summary.reports.push(report);
        }

        tracing::info!(
            devices = summary.reports.len(),
            changed = summary.changed(),
            failed = summary.failed(),
            "run complete"
        );
        summary
    }
}
