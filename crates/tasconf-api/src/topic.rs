//! Topic layout for Tasmota devices.
//!
//! A device is addressed by its topic segment combined with the
//! command prefix (`cmnd`) or the status prefix (`stat`). Every setting
//! query goes to `cmnd/<device>/<Setting>`, every answer comes back on
//! `stat/<device>/RESULT`, and batched changes go to `cmnd/<device>/BackLog`.

/// Suffix of the channel a device publishes command results on.
pub const RESULT_SUFFIX: &str = "RESULT";

/// Suffix of the command that executes a `;`-separated list of commands.
pub const BACKLOG_SUFFIX: &str = "BackLog";

/// Join `prefix`, `segment` and `suffix` with `/`.
///
/// Leading and trailing slashes are stripped from `prefix` and `segment`
/// independently; `suffix` is used verbatim.
pub fn build_topic(prefix: &str, segment: &str, suffix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let segment = segment.trim_matches('/');

    let mut topic = String::with_capacity(prefix.len() + segment.len() + suffix.len() + 2);
    topic.push_str(prefix);
    topic.push('/');
    topic.push_str(segment);
    topic.push('/');
    topic.push_str(suffix);
    topic
}

// ── DeviceChannels ───────────────────────────────────────────────────

/// The three channel roles of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChannels {
    command_prefix: String,
    segment: String,
    result: String,
}

impl DeviceChannels {
    pub fn new(command_prefix: &str, stat_prefix: &str, segment: &str) -> Self {
        Self {
            command_prefix: command_prefix.to_owned(),
            segment: segment.to_owned(),
            result: build_topic(stat_prefix, segment, RESULT_SUFFIX),
        }
    }

    /// Device topic segment as configured.
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Channel the device answers queries on.
    pub fn result(&self) -> &str {
        &self.result
    }

    /// Channel a query for `setting` is published to.
    pub fn query(&self, setting: &str) -> String {
        build_topic(&self.command_prefix, &self.segment, setting)
    }

    /// Channel batched changes are published to.
    pub fn backlog(&self) -> String {
        build_topic(&self.command_prefix, &self.segment, BACKLOG_SUFFIX)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
