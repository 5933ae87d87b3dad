//! Decoding of device replies into comparable values.
//!
//! Tasmota answers a query on `stat/<device>/RESULT` with a JSON object
//! whose shape depends on the command. The registry maps a (lowercased)
//! setting name to the [`Extractor`] that knows where the value lives in
//! that object. Settings without an entry are compared as raw text.
//!
//! ```
//! use tasconf_core::extract::{Extractor, extract};
//! use tasconf_core::SettingValue;
//!
//! assert_eq!(Extractor::for_setting("TelePeriod"), Extractor::NumericField("TelePeriod"));
//! let value = extract("teleperiod", br#"{"TelePeriod":300.0}"#).unwrap();
//! assert_eq!(value, SettingValue::Int(300));
//! ```

use serde::Deserialize;
use thiserror::Error;

use crate::value::SettingValue;

/// Highest `PulseTime<N>` slot the firmware exposes.
pub const MAX_PULSE_TIME_SLOT: u8 = 32;

/// Field holding the currently selected module.
const MODULE_FIELD: &str = "Module";

// ── Errors ───────────────────────────────────────────────────────────

/// Why a reply payload could not be turned into a value.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("reply is not a JSON object: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },

    #[error("field '{field}' not found in reply")]
    FieldNotFound { field: String },

    #[error("field '{field}' has unexpected type: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("field '{field}' should hold exactly one entry, found {entries}")]
    UnexpectedShape { field: String, entries: usize },
}

// ── Extractor ────────────────────────────────────────────────────────

/// How to pull one setting's value out of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// Scalar field returned as-is.
    GenericField(&'static str),
    /// Numeric field truncated to an integer.
    NumericField(&'static str),
    /// `{"Module":{"<id>":"<name>"}}`, yields the module id.
    ModuleSelection,
    /// `{"PulseTime<N>":{"Set":..,"Remaining":..}}`, yields `Set`.
    PulseTimeSlot(u8),
    /// Whole payload as text.
    RawText,
}

const REGISTRY: &[(&str, Extractor)] = &[
    ("currentcal", Extractor::NumericField("CurrentCal")),
    ("devicename", Extractor::GenericField("DeviceName")),
    ("ledstate", Extractor::NumericField("LedState")),
    ("module", Extractor::ModuleSelection),
    ("otaurl", Extractor::GenericField("OtaUrl")),
    ("powercal", Extractor::NumericField("PowerCal")),
    ("poweronstate", Extractor::NumericField("PowerOnState")),
    ("switchmode1", Extractor::NumericField("SwitchMode1")),
    ("switchmode2", Extractor::NumericField("SwitchMode2")),
    ("switchmode3", Extractor::NumericField("SwitchMode3")),
    ("switchmode4", Extractor::NumericField("SwitchMode4")),
    ("switchmode5", Extractor::NumericField("SwitchMode5")),
    ("switchmode6", Extractor::NumericField("SwitchMode6")),
    ("switchmode7", Extractor::NumericField("SwitchMode7")),
    ("switchmode8", Extractor::NumericField("SwitchMode8")),
    ("teleperiod", Extractor::NumericField("TelePeriod")),
    ("timezone", Extractor::GenericField("Timezone")),
    ("topic", Extractor::GenericField("Topic")),
    ("voltagecal", Extractor::NumericField("VoltageCal")),
];

impl Extractor {
    /// Look up the extractor for a setting name, ignoring case.
    pub fn for_setting(setting: &str) -> Self {
        let name = setting.to_ascii_lowercase();

        if let Some((_, extractor)) = REGISTRY.iter().find(|(key, _)| *key == name) {
            return *extractor;
        }

        name.strip_prefix("pulsetime")
            .and_then(parse_slot)
            .map_or(Self::RawText, Self::PulseTimeSlot)
    }

    /// Decode one reply payload.
    pub fn decode(&self, payload: &[u8]) -> Result<SettingValue, ExtractError> {
        match *self {
            Self::GenericField(field) => generic_field(field, payload),
            Self::NumericField(field) => numeric_field(field, payload),
            Self::ModuleSelection => module_selection(payload),
            Self::PulseTimeSlot(slot) => pulse_time(slot, payload),
            Self::RawText => Ok(SettingValue::String(
                String::from_utf8_lossy(payload).into_owned(),
            )),
        }
    }
}

/// Decode `payload` with the extractor registered for `setting`.
pub fn extract(setting: &str, payload: &[u8]) -> Result<SettingValue, ExtractError> {
    Extractor::for_setting(setting).decode(payload)
}

fn parse_slot(digits: &str) -> Option<u8> {
    if digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits
        .parse::<u8>()
        .ok()
        .filter(|slot| (1..=MAX_PULSE_TIME_SLOT).contains(slot))
}

// ── Decoders ─────────────────────────────────────────────────────────

type Object = serde_json::Map<String, serde_json::Value>;

fn decode_object(payload: &[u8]) -> Result<Object, ExtractError> {
    serde_json::from_slice(payload).map_err(|source| ExtractError::Malformed { source })
}

fn lookup<'a>(object: &'a Object, field: &str) -> Result<&'a serde_json::Value, ExtractError> {
    object.get(field).ok_or_else(|| ExtractError::FieldNotFound {
        field: field.to_owned(),
    })
}

fn json_kind(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
    .to_owned()
}

fn generic_field(field: &str, payload: &[u8]) -> Result<SettingValue, ExtractError> {
    let object = decode_object(payload)?;
    let value = lookup(&object, field)?;

    SettingValue::from_json(value).ok_or_else(|| ExtractError::TypeMismatch {
        field: field.to_owned(),
        expected: "scalar",
        found: json_kind(value),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn numeric_field(field: &str, payload: &[u8]) -> Result<SettingValue, ExtractError> {
    let object = decode_object(payload)?;
    let value = lookup(&object, field)?;

    let number = value.as_f64().ok_or_else(|| ExtractError::TypeMismatch {
        field: field.to_owned(),
        expected: "number",
        found: json_kind(value),
    })?;

    // Saturating cast, truncates toward zero
    Ok(SettingValue::Int(number as i64))
}

fn module_selection(payload: &[u8]) -> Result<SettingValue, ExtractError> {
    let object = decode_object(payload)?;
    let value = lookup(&object, MODULE_FIELD)?;

    let modules = value.as_object().ok_or_else(|| ExtractError::TypeMismatch {
        field: MODULE_FIELD.to_owned(),
        expected: "object",
        found: json_kind(value),
    })?;

    let mut ids = modules.keys();
    let (Some(id), None) = (ids.next(), ids.next()) else {
        return Err(ExtractError::UnexpectedShape {
            field: MODULE_FIELD.to_owned(),
            entries: modules.len(),
        });
    };

    id.parse::<i64>()
        .map(SettingValue::Int)
        .map_err(|_| ExtractError::TypeMismatch {
            field: MODULE_FIELD.to_owned(),
            expected: "numeric module id",
            found: format!("'{id}'"),
        })
}

/// Body of a `PulseTime<N>` reply.
#[derive(Debug, Deserialize)]
struct PulseTime {
    #[serde(rename = "Set")]
    set: i64,
    #[serde(rename = "Remaining", default)]
    remaining: i64,
}

fn pulse_time(slot: u8, payload: &[u8]) -> Result<SettingValue, ExtractError> {
    let field = format!("PulseTime{slot}");
    let object = decode_object(payload)?;
    let value = lookup(&object, &field)?;

    let pulse = PulseTime::deserialize(value).map_err(|_| ExtractError::TypeMismatch {
        found: json_kind(value),
        field: field.clone(),
        expected: "object with integer Set",
    })?;

    tracing::trace!(slot, set = pulse.set, remaining = pulse.remaining, "Decoded pulse time");
    Ok(SettingValue::Int(pulse.set))
}

// ── Tests ────────────────────────────────────────────────────────────
