//! Decoded attribute values.
//!
//! Wire data is plain JSON; once a field decodes it, the attribute holds a
//! [`Value`]. The set of shapes is closed: every field kind produces exactly
//! one of these variants, and encoding checks the variant it receives.

use crate::object::DataObject;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Runtime representation of a decoded attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Strings, numbers, booleans and any JSON passed through untouched.
    Json(JsonValue),

    /// A timestamp. Decoded timestamps are always at UTC; values assigned by
    /// callers may carry any offset and are converted when encoded.
    Datetime(DateTime<FixedOffset>),

    /// Homogeneous list produced by a `List` field.
    List(Vec<Value>),

    /// Homogeneous mapping produced by a `Dict` field.
    Dict(BTreeMap<String, Value>),

    /// Nested structured object produced by an `Object` field.
    Object(Box<DataObject>),
}

impl Value {
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Value::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(JsonValue::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_json().and_then(JsonValue::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(JsonValue::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_json().and_then(JsonValue::as_bool)
    }

    /// The timestamp as a UTC instant, whatever offset it was assigned with.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Datetime(dt) => Some(dt.with_timezone(&Utc)),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Dict(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&DataObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut DataObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<DataObject> {
        match self {
            Value::Object(obj) => Some(*obj),
            _ => None,
        }
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Value::Json(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Json(JsonValue::String(v.to_string()))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Json(JsonValue::String(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Json(JsonValue::Bool(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Json(JsonValue::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Json(JsonValue::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Json(JsonValue::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Json(JsonValue::from(v))
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(v: DateTime<Tz>) -> Self {
        Value::Datetime(v.fixed_offset())
    }
}

impl From<DataObject> for Value {
    fn from(v: DataObject) -> Self {
        Value::Object(Box::new(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Dict(v)
    }
}
