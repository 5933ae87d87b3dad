//! `sync`: connect, reconcile every selected device, report.

use tokio_util::sync::CancellationToken;

use tasconf_api::MqttTransport;
use tasconf_core::{Driver, RunOptions, RunSummary};

use crate::cli::{GlobalOpts, SyncArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(
    args: SyncArgs,
    global: &GlobalOpts,
    cancel: &CancellationToken,
) -> Result<(), CliError> {
    let settings = config::resolve_settings(global)?;
    let desired = super::load_desired(&config::desired_state_path(&settings))?;
    let broker = settings.broker_config()?;

    let options = RunOptions {
        dry_run: args.dry_run,
        command_timeout: broker.command_timeout,
        device_filter: args.device,
    };

    let transport = MqttTransport::connect(&broker, cancel).await?;
    let summary = Driver::new(&transport, options)
        .with_cancellation(cancel.clone())
        .run(&desired)
        .await;
    transport.disconnect().await;

    let color = output::should_color(global.color);
    let rendered = output::render_summary(global.output, &summary, color)?;
    output::print_output(&rendered, global.quiet);

    finish(&summary, args.strict)
}

/// Turn the run outcome into the process result.
fn finish(summary: &RunSummary, strict: bool) -> Result<(), CliError> {
    if summary.cancelled {
        return Err(CliError::Interrupted);
    }

    let failed = summary.failed();
    if strict && failed > 0 {
        return Err(CliError::DevicesFailed {
            failed,
            total: summary.reports.len(),
        });
    }
    Ok(())
}
