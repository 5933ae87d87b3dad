// ── Desired state ──
//
// What the devices should look like. Loaded by the config layer, consumed
// read-only by the driver. The effective settings of a device are computed
// fresh for every run and never stored.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use tasconf_api::DeviceChannels;

use crate::value::SettingValue;

/// Setting name to value, iterated in name order.
pub type SettingMap = BTreeMap<String, SettingValue>;

pub const DEFAULT_COMMAND_PREFIX: &str = "cmnd";
pub const DEFAULT_STAT_PREFIX: &str = "stat";

/// The complete desired-state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredConfig {
    /// Prefix of the channels commands are sent to.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Prefix of the channels devices answer on.
    #[serde(default = "default_stat_prefix")]
    pub stat_prefix: String,

    /// Settings applied to every device.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub settings: SettingMap,

    /// Devices by name.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub devices: BTreeMap<String, DeviceConfig>,
}

impl Default for DesiredConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            stat_prefix: default_stat_prefix(),
            settings: SettingMap::new(),
            devices: BTreeMap::new(),
        }
    }
}

fn default_command_prefix() -> String {
    DEFAULT_COMMAND_PREFIX.into()
}
fn default_stat_prefix() -> String {
    DEFAULT_STAT_PREFIX.into()
}

/// One device entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Topic segment the device is addressed by.
    pub topic: String,

    /// Overrides for the global settings.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub settings: SettingMap,
}

impl DeviceConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            settings: SettingMap::new(),
        }
    }

    pub fn with_setting(mut self, name: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.settings.insert(name.into(), value.into());
        self
    }
}

impl DesiredConfig {
    /// Global settings merged with the device overrides.
    pub fn effective_settings(&self, device: &DeviceConfig) -> SettingMap {
        merge_settings(&self.settings, &device.settings)
    }

    /// Channel names for a device under the configured prefixes.
    pub fn channels(&self, device: &DeviceConfig) -> DeviceChannels {
        DeviceChannels::new(&self.command_prefix, &self.stat_prefix, &device.topic)
    }

    /// Devices in name order, restricted to `filter` when given.
    pub fn select<'a>(
        &'a self,
        filter: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a str, &'a DeviceConfig)> + 'a {
        self.devices
            .iter()
            .filter(move |(name, _)| filter.is_none_or(|f| f == name.as_str()))
            .map(|(name, device)| (name.as_str(), device))
    }
}

/// Merge two setting maps; `local` wins on conflicting keys.
pub fn merge_settings(global: &SettingMap, local: &SettingMap) -> SettingMap {
    let mut merged = global.clone();
    merged.extend(local.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Treat an explicit `null` (an empty YAML key) like a missing map.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ── Tests ────────────────────────────────────────────────────────────
