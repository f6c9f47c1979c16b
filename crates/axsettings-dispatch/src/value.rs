//! Setting values and their declared types

use axsettings_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const FLOAT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Integer,
    Double,
    String,
}

/// Conversion between the logical value and what the store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueTransform {
    /// The store keeps the opposite boolean, e.g. `closeViewHotkeysEnabled`
    /// backing a "disable shortcuts" setting.
    NegateBoolean,
}

impl ValueTransform {
    pub fn apply(&self, value: &SettingValue) -> SettingValue {
        match (self, value) {
            (ValueTransform::NegateBoolean, SettingValue::Bool(b)) => SettingValue::Bool(!b),
            (_, other) => other.clone(),
        }
    }
}

impl SettingValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            SettingValue::Bool(_) => ValueType::Boolean,
            SettingValue::Integer(_) => ValueType::Integer,
            SettingValue::Double(_) => ValueType::Double,
            SettingValue::String(_) => ValueType::String,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            SettingValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Integer(i) => Some(*i as f64),
            SettingValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Equality that lets an integer match an equal double.
    pub fn matches(&self, other: &SettingValue) -> bool {
        match (self, other) {
            (SettingValue::Bool(a), SettingValue::Bool(b)) => a == b,
            (SettingValue::String(a), SettingValue::String(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x - y).abs() < FLOAT_TOLERANCE,
                _ => false,
            },
        }
    }

    /// Convert to `ty` where that is lossless enough to be unsurprising.
    pub fn coerce(&self, ty: ValueType) -> Result<SettingValue> {
        let converted = match (ty, self) {
            (t, v) if v.value_type() == t => Some(v.clone()),
            (ValueType::Double, SettingValue::Integer(i)) => Some(SettingValue::Double(*i as f64)),
            (ValueType::Integer, SettingValue::Double(d)) if d.fract() == 0.0 => {
                Some(SettingValue::Integer(*d as i64))
            }
            (ValueType::Boolean, SettingValue::Integer(i)) if *i == 0 || *i == 1 => {
                Some(SettingValue::Bool(*i == 1))
            }
            _ => None,
        };
        converted.ok_or_else(|| {
            Error::invalid_value(format!("Expected a {:?} value, got {}", ty, self))
        })
    }

    /// Parse command line text as a value of type `ty`.
    pub fn parse(ty: ValueType, raw: &str) -> Result<SettingValue> {
        let raw = raw.trim();
        let bad = || Error::invalid_value(format!("'{}' is not a valid {:?}", raw, ty));
        Ok(match ty {
            ValueType::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => SettingValue::Bool(true),
                "false" | "0" | "no" | "off" => SettingValue::Bool(false),
                _ => return Err(bad()),
            },
            ValueType::Integer => SettingValue::Integer(raw.parse().map_err(|_| bad())?),
            ValueType::Double => SettingValue::Double(raw.parse().map_err(|_| bad())?),
            ValueType::String => SettingValue::String(raw.to_string()),
        })
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::Integer(i) => write!(f, "{}", i),
            SettingValue::Double(d) => write!(f, "{}", d),
            SettingValue::String(s) => f.write_str(s),
        }
    }
}
