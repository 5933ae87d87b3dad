// ── Setting values ──
//
// Desired values come from the desired-state document, actual values from
// device replies. Both are one of four scalar kinds; numbers compare
// numerically across the integer/float split, everything else compares
// only within its own kind.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar setting value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl SettingValue {
    /// Convert a JSON scalar. Objects, arrays and `null` yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    /// Human-readable kind name used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

/// Exact comparison of an integer with a float.
#[allow(
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::as_conversions
)]
fn int_eq_float(i: i64, f: f64) -> bool {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    f.is_finite()
        && f.fract() == 0.0
        && f >= i64::MIN as f64
        && f < i64::MAX as f64
        && f as i64 == i
}

impl PartialEq for SettingValue {
    #[allow(clippy::float_cmp)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(i), Self::Float(f)) | (Self::Float(f), Self::Int(i)) => int_eq_float(*i, *f),
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }
}

/// Renders the value the way it appears in a device command.
impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_across_kinds() {
        assert_eq!(SettingValue::Int(300), SettingValue::Float(300.0));
        assert_eq!(SettingValue::Float(300.0), SettingValue::Int(300));
        assert_ne!(SettingValue::Int(300), SettingValue::Float(300.5));
        assert_ne!(SettingValue::Int(i64::MAX), SettingValue::Float(f64::INFINITY));
        assert_ne!(SettingValue::Int(0), SettingValue::Float(f64::NAN));
    }

    #[test]
    fn kinds_do_not_mix_otherwise() {
        assert_ne!(SettingValue::from("1"), SettingValue::Int(1));
        assert_ne!(SettingValue::Bool(true), SettingValue::Int(1));
        assert_ne!(SettingValue::from("true"), SettingValue::Bool(true));
        assert_eq!(SettingValue::from("Europe/Berlin"), SettingValue::from("Europe/Berlin"));
    }

    #[test]
    fn kind_names() {
        assert_eq!(SettingValue::Int(1).kind(), "integer");
        assert_eq!(SettingValue::Float(1.5).kind(), "float");
        assert_eq!(SettingValue::from("1").kind(), "string");
        assert_eq!(SettingValue::Bool(true).kind(), "boolean");
    }

    #[test]
    fn display_matches_command_syntax() {
        assert_eq!(SettingValue::Int(300).to_string(), "300");
        assert_eq!(SettingValue::Float(300.0).to_string(), "300");
        assert_eq!(SettingValue::Float(1.5).to_string(), "1.5");
        assert_eq!(SettingValue::Bool(false).to_string(), "false");
        assert_eq!(SettingValue::from("http://ota/fw.bin").to_string(), "http://ota/fw.bin");
    }

    #[test]
    fn json_scalars_convert() {
        let v: serde_json::Value = serde_json::json!({
            "i": 12, "f": 12.5, "s": "x", "b": true, "n": null, "o": {}
        });
        assert!(matches!(SettingValue::from_json(&v["i"]), Some(SettingValue::Int(12))));
        assert!(matches!(SettingValue::from_json(&v["f"]), Some(SettingValue::Float(_))));
        assert!(matches!(SettingValue::from_json(&v["s"]), Some(SettingValue::String(_))));
        assert!(matches!(SettingValue::from_json(&v["b"]), Some(SettingValue::Bool(true))));
        assert!(SettingValue::from_json(&v["n"]).is_none());
        assert!(SettingValue::from_json(&v["o"]).is_none());
    }

    #[test]
    fn deserializes_yaml_scalars() {
        let values: Vec<SettingValue> =
            serde_yaml::from_str("[300, 2.5, 'text', true, \"-1\"]").unwrap();
        assert!(matches!(values[0], SettingValue::Int(300)));
        assert!(matches!(values[1], SettingValue::Float(_)));
        assert!(matches!(values[2], SettingValue::String(ref s) if s == "text"));
        assert!(matches!(values[3], SettingValue::Bool(true)));
        assert!(matches!(values[4], SettingValue::String(ref s) if s == "-1"));
    }
}
