// tasconf-core: Settings reconciliation between a desired-state document and Tasmota devices.

pub mod correlator;
pub mod desired;
pub mod driver;
pub mod error;
pub mod extract;
pub mod reconciler;
pub mod report;
pub mod value;

// ── Primary re-exports ──────────────────────────────────────────────
pub use correlator::{ResponseCorrelator, ResponseError};
pub use desired::{DesiredConfig, DeviceConfig, SettingMap, merge_settings};
pub use driver::{Driver, RunSummary};
pub use error::{CoreError, FailureKind};
pub use extract::{ExtractError, Extractor};
pub use reconciler::{DeviceReconciler, Mismatch, RunOptions, backlog_command};
pub use report::{DeviceReport, Outcome, SettingCheck};
pub use value::SettingValue;
