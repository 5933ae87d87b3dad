//! `show`: print what a sync would check, without touching the broker.

use tasconf_core::DesiredConfig;

use crate::cli::{GlobalOpts, ShowArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, DeviceView, SettingView};

pub fn handle(args: &ShowArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = config::resolve_settings(global)?;
    let desired = super::load_desired(&config::desired_state_path(&settings))?;

    let devices = device_views(&desired, args.device.as_deref());
    if let Some(ref name) = args.device {
        if devices.is_empty() {
            tracing::warn!(device = %name, "device not found in desired state");
        }
    }

    let rendered = output::render_devices(global.output, &devices)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn device_views(desired: &DesiredConfig, filter: Option<&str>) -> Vec<DeviceView> {
    desired
        .select(filter)
        .map(|(name, device)| {
            let channels = desired.channels(device);
            let settings = desired
                .effective_settings(device)
                .into_iter()
                .map(|(setting, value)| SettingView {
                    query_topic: channels.query(&setting),
                    name: setting,
                    value,
                })
                .collect();

            DeviceView {
                device: name.to_owned(),
                topic: device.topic.clone(),
                result_topic: channels.result().to_owned(),
                backlog_topic: channels.backlog(),
                settings,
            }
        })
        .collect()
}
