//! Values stored in state/rate containers and published through the kiosk.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whether a registered variable is a state or a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    /// An integrated quantity, flushed from the kiosk before integration.
    State,
    /// A per-day flux, flushed from the kiosk after integration.
    Rate,
}

impl core::fmt::Display for VarKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::State => f.write_str("state"),
            Self::Rate => f.write_str("rate"),
        }
    }
}

/// The declared kind of a container field.
///
/// Numeric kinds and `Bool` have a zero value used by `zerofy()`; the
/// others do not and are left untouched when rates are reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// 64-bit float.
    Float,
    /// 64-bit signed integer.
    Int,
    /// Boolean flag.
    Bool,
    /// Calendar date.
    Date,
    /// Free text.
    Text,
    /// Flat list of floats (interpolation tables and profiles).
    Table,
}

impl ValueKind {
    /// Zero value for this kind: `0.0`, `0` or `false`.
    ///
    /// Returns `None` for kinds without a natural zero.
    pub const fn zero(self) -> Option<Value> {
        match self {
            Self::Float => Some(Value::Float(0.0)),
            Self::Int => Some(Value::Int(0)),
            Self::Bool => Some(Value::Bool(false)),
            Self::Date | Self::Text | Self::Table => None,
        }
    }

    /// Coerce `value` into this kind.
    ///
    /// Integers are widened into floats; every other mismatch yields `None`.
    #[allow(clippy::cast_precision_loss)]
    pub fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (Self::Float, Value::Float(v)) => Some(Value::Float(v)),
            (Self::Float, Value::Int(v)) => Some(Value::Float(v as f64)),
            (Self::Int, Value::Int(v)) => Some(Value::Int(v)),
            (Self::Bool, Value::Bool(v)) => Some(Value::Bool(v)),
            (Self::Date, Value::Date(v)) => Some(Value::Date(v)),
            (Self::Text, Value::Text(v)) => Some(Value::Text(v)),
            (Self::Table, Value::Table(v)) => Some(Value::Table(v)),
            _ => None,
        }
    }
}

impl core::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::Text => "text",
            Self::Table => "table",
        };
        f.write_str(name)
    }
}

/// A single variable or parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Calendar date.
    Date(NaiveDate),
    /// Free text.
    Text(String),
    /// Flat list of floats.
    Table(Vec<f64>),
}

impl Value {
    /// The kind of this value.
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Date(_) => ValueKind::Date,
            Self::Text(_) => ValueKind::Text,
            Self::Table(_) => ValueKind::Table,
        }
    }

    /// Numeric view of this value. Integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Integer view of this value.
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean view of this value.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Date view of this value.
    pub const fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view of this value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Table view of this value.
    pub fn as_table(&self) -> Option<&[f64]> {
        match self {
            Self::Table(v) => Some(v),
            _ => None,
        }
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Table(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::Table(v)
    }
}
