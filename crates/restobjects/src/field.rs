//! # Fields
//!
//! A [`Field`] governs how one attribute of a structured object moves between
//! its wire form (a JSON value under the field's `api_name`) and its decoded
//! form (a [`Value`]).
//!
//! ## Field Kinds
//!
//! | Kind | Wire | Decoded | Notes |
//! |------|------|---------|-------|
//! | `Json` | any | `Value::Json` | passed through unchanged |
//! | `Constant` | fixed value | `Value::Json` | decode rejects any other value, encode always emits it |
//! | `List` | array | `Value::List` | inner kind mapped over elements |
//! | `Dict` | object | `Value::Dict` | inner kind mapped over values, keys untouched |
//! | `Object` | object | `Value::Object` | nested [`DataObject`], class given directly or by name |
//! | `Datetime` | string | `Value::Datetime` | fixed format, UTC on the wire |
//!
//! `decode` is only ever handed a value that is present in the source data;
//! absence is handled by the default mechanism in [`DataObject`]. `encode` is
//! only ever handed a value that is present on the instance; absent
//! attributes are omitted from the wire entirely.
//!
//! ## Forward References
//!
//! [`ClassRef::Named`] defers resolution until the first decode, and looks the
//! name up in the registry of the class that owns the field. The registry
//! always answers with the class most recently registered under that name, so
//! a later declaration with the same name takes over every name-based
//! reference that has not already decoded.

use crate::class::ClassDef;
use crate::error::{RestError, Result};
use crate::object::DataObject;
use crate::value::Value;
use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeZone, Utc};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

/// Timestamp layout used by `Datetime` fields unless one is given.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A reference to a structured-object class, either resolved or by name.
#[derive(Clone)]
pub enum ClassRef {
    Class(Arc<ClassDef>),
    Named(String),
}

impl ClassRef {
    /// The bare class name this reference points at.
    pub fn name(&self) -> &str {
        match self {
            ClassRef::Class(cls) => cls.name(),
            ClassRef::Named(name) => name,
        }
    }

    /// Resolve to a concrete class, consulting the registry of `owner` for
    /// name references.
    pub fn resolve(&self, owner: &ClassDef) -> Result<Arc<ClassDef>> {
        match self {
            ClassRef::Class(cls) => Ok(Arc::clone(cls)),
            ClassRef::Named(name) => owner.registry()?.find_by_name(name),
        }
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassRef::Class(cls) => f.debug_tuple("Class").field(&cls.name()).finish(),
            ClassRef::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

impl From<&str> for ClassRef {
    fn from(name: &str) -> Self {
        ClassRef::Named(name.to_string())
    }
}

impl From<String> for ClassRef {
    fn from(name: String) -> Self {
        ClassRef::Named(name)
    }
}

impl From<Arc<ClassDef>> for ClassRef {
    fn from(cls: Arc<ClassDef>) -> Self {
        ClassRef::Class(cls)
    }
}

impl From<&Arc<ClassDef>> for ClassRef {
    fn from(cls: &Arc<ClassDef>) -> Self {
        ClassRef::Class(Arc::clone(cls))
    }
}

/// The closed set of field behaviors.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Json,
    Constant(Value),
    List(Box<FieldKind>),
    Dict(Box<FieldKind>),
    Object(ClassRef),
    Datetime { format: String },
}

impl FieldKind {
    /// Decode a present wire value.
    ///
    /// `owner` is the class that declared the field; name-based `Object`
    /// references resolve through its registry.
    pub fn decode(&self, owner: &ClassDef, value: &JsonValue) -> Result<Value> {
        match self {
            FieldKind::Json => Ok(Value::Json(value.clone())),
            FieldKind::Constant(expected) => {
                if expected.as_json() == Some(value) {
                    Ok(expected.clone())
                } else {
                    Err(RestError::ConstantMismatch {
                        value: value.to_string(),
                        expected: describe(expected),
                    })
                }
            }
            FieldKind::List(inner) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| RestError::decode(value, "list"))?;
                items
                    .iter()
                    .map(|item| inner.decode(owner, item))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List)
            }
            FieldKind::Dict(inner) => {
                let entries = value
                    .as_object()
                    .ok_or_else(|| RestError::decode(value, "dict"))?;
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), inner.decode(owner, v)?)))
                    .collect::<Result<BTreeMap<_, _>>>()
                    .map(Value::Dict)
            }
            FieldKind::Object(cls) => {
                let data = value
                    .as_object()
                    .ok_or_else(|| RestError::decode(value, format!("{} object", cls.name())))?;
                let cls = cls.resolve(owner)?;
                Ok(Value::from(DataObject::from_map(&cls, data.clone())))
            }
            FieldKind::Datetime { format } => {
                let text = value
                    .as_str()
                    .ok_or_else(|| RestError::decode(value, timestamp_expectation(format)))?;
                parse_timestamp(text, format)
                    .map(|dt| Value::Datetime(dt.fixed_offset()))
                    .ok_or_else(|| RestError::decode(value, timestamp_expectation(format)))
            }
        }
    }

    /// Encode a present attribute value.
    pub fn encode(&self, value: &Value) -> Result<JsonValue> {
        match self {
            FieldKind::Json => match value {
                Value::Json(v) => Ok(v.clone()),
                other => Err(RestError::encode(other, "json value")),
            },
            // The constant is emitted whatever valid value the instance holds.
            FieldKind::Constant(expected) => Ok(expected.as_json().cloned().unwrap_or_default()),
            FieldKind::List(inner) => match value {
                Value::List(items) => items
                    .iter()
                    .map(|item| inner.encode(item))
                    .collect::<Result<Vec<_>>>()
                    .map(JsonValue::Array),
                other => Err(RestError::encode(other, "list")),
            },
            FieldKind::Dict(inner) => match value {
                Value::Dict(entries) => entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), inner.encode(v)?)))
                    .collect::<Result<Map<_, _>>>()
                    .map(JsonValue::Object),
                other => Err(RestError::encode(other, "dict")),
            },
            FieldKind::Object(cls) => match value {
                Value::Object(obj) => obj.to_json(),
                other => Err(RestError::encode(other, format!("{} object", cls.name()))),
            },
            FieldKind::Datetime { format } => match value {
                Value::Datetime(dt) => {
                    let utc = dt.with_timezone(&Utc).trunc_subsecs(0);
                    let mut out = String::new();
                    write!(out, "{}", utc.format(format))
                        .map_err(|_| RestError::encode(value, timestamp_expectation(format)))?;
                    Ok(JsonValue::String(out))
                }
                other => Err(RestError::encode(other, "datetime")),
            },
        }
    }
}

fn describe(value: &Value) -> String {
    match value.as_json() {
        Some(v) => v.to_string(),
        None => format!("{:?}", value),
    }
}

fn timestamp_expectation(format: &str) -> String {
    format!("timestamp in format {}", format)
}

fn parse_timestamp(text: &str, format: &str) -> Option<DateTime<Utc>> {
    // Formats carrying an offset parse as aware; plain ones are read as UTC.
    if let Ok(aware) = DateTime::parse_from_str(text, format) {
        return Some(aware.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, format)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Signature of a computed default: the instance being read and its raw
/// source data.
pub type DefaultFn = dyn Fn(&DataObject, &Map<String, JsonValue>) -> Option<Value> + Send + Sync;

/// Value used when the source data has nothing for a field.
#[derive(Clone)]
pub enum FieldDefault {
    Value(Value),
    Computed(Arc<DefaultFn>),
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FieldDefault::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A declared attribute of a structured-object class.
///
/// Fields are built with the constructors below, refined with the `with_*`
/// methods, and handed to [`crate::ClassBuilder::field`], which fixes the
/// attribute name and (when none was given) the `api_name`.
#[derive(Debug, Clone)]
pub struct Field {
    kind: FieldKind,
    attr_name: String,
    api_name: Option<String>,
    default: Option<FieldDefault>,
}

impl Field {
    fn of_kind(kind: FieldKind) -> Self {
        Self {
            kind,
            attr_name: String::new(),
            api_name: None,
            default: None,
        }
    }

    /// A field whose value passes through unchanged (strings, numbers, booleans).
    pub fn json() -> Self {
        Self::of_kind(FieldKind::Json)
    }

    /// A field fixed to one value for every instance of the owning class.
    pub fn constant(value: impl Into<JsonValue>) -> Self {
        Self::of_kind(FieldKind::Constant(Value::Json(value.into())))
    }

    /// A homogeneous list whose elements are coded by `inner`.
    pub fn list(inner: Field) -> Self {
        Self::of_kind(FieldKind::List(Box::new(inner.kind)))
    }

    /// A homogeneous mapping whose values are coded by `inner`.
    pub fn dict(inner: Field) -> Self {
        Self::of_kind(FieldKind::Dict(Box::new(inner.kind)))
    }

    /// A nested structured object of class `cls`, given directly or by name.
    pub fn object(cls: impl Into<ClassRef>) -> Self {
        Self::of_kind(FieldKind::Object(cls.into()))
    }

    /// A timestamp in [`DEFAULT_DATETIME_FORMAT`].
    pub fn datetime() -> Self {
        Self::datetime_with_format(DEFAULT_DATETIME_FORMAT)
    }

    /// A timestamp in a custom `strftime` format.
    pub fn datetime_with_format(format: impl Into<String>) -> Self {
        Self::of_kind(FieldKind::Datetime {
            format: format.into(),
        })
    }

    /// Use `name` as the wire key instead of the attribute name.
    pub fn with_api_name(mut self, name: impl Into<String>) -> Self {
        self.api_name = Some(name.into());
        self
    }

    /// Use a static default when the source data has no value.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Compute the default from the instance and its raw source data.
    ///
    /// Fields are processed in no particular order, so the function must not
    /// depend on or change sibling attributes.
    pub fn with_default_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&DataObject, &Map<String, JsonValue>) -> Option<Value> + Send + Sync + 'static,
    {
        self.default = Some(FieldDefault::Computed(Arc::new(f)));
        self
    }

    pub(crate) fn install(&mut self, attr_name: &str) {
        self.attr_name = attr_name.to_string();
        if self.api_name.is_none() {
            self.api_name = Some(attr_name.to_string());
        }
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Name of the attribute on the instance.
    pub fn attr_name(&self) -> &str {
        &self.attr_name
    }

    /// Key of the field's value in wire data.
    pub fn api_name(&self) -> &str {
        self.api_name.as_deref().unwrap_or(&self.attr_name)
    }

    pub fn default(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, FieldKind::Constant(_))
    }

    /// The fixed value of a `Constant` field.
    pub fn constant_value(&self) -> Option<&Value> {
        match &self.kind {
            FieldKind::Constant(v) => Some(v),
            _ => None,
        }
    }

    pub fn decode(&self, owner: &ClassDef, value: &JsonValue) -> Result<Value> {
        self.kind.decode(owner, value)
    }

    pub fn encode(&self, value: &Value) -> Result<JsonValue> {
        self.kind.encode(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use chrono::FixedOffset;
    use serde_json::json;

    fn owner(registry: &Registry) -> Arc<ClassDef> {
        registry.class("Owner").field("name", Field::json()).build()
    }

    #[test]
    fn json_passes_through() {
        let registry = Registry::new();
        let cls = owner(&registry);
        let field = Field::json();
        let decoded = field.decode(&cls, &json!({"a": [1, 2]})).unwrap();
        assert_eq!(decoded, Value::Json(json!({"a": [1, 2]})));
        assert_eq!(field.encode(&decoded).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn json_encode_rejects_timestamp() {
        let field = Field::json();
        let err = field.encode(&Value::from(Utc::now())).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn constant_decode_requires_exact_value() {
        let registry = Registry::new();
        let cls = owner(&registry);
        let field = Field::constant("post");
        assert_eq!(field.decode(&cls, &json!("post")).unwrap(), Value::from("post"));
        let err = field.decode(&cls, &json!("image")).unwrap_err();
        assert!(matches!(err, RestError::ConstantMismatch { .. }));
    }

    #[test]
    fn constant_encode_ignores_input() {
        let field = Field::constant("post");
        assert_eq!(field.encode(&Value::from("whatever")).unwrap(), json!("post"));
    }

    #[test]
    fn list_maps_inner_field() {
        let registry = Registry::new();
        let cls = owner(&registry);
        let field = Field::list(Field::datetime());
        let decoded = field
            .decode(&cls, &json!(["2008-12-31T04:00:01Z", "2009-01-01T00:00:00Z"]))
            .unwrap();
        let items = decoded.as_list().unwrap();
        assert_eq!(
            items[0].as_datetime(),
            Some(Utc.with_ymd_and_hms(2008, 12, 31, 4, 0, 1).unwrap())
        );
        assert_eq!(
            field.encode(&decoded).unwrap(),
            json!(["2008-12-31T04:00:01Z", "2009-01-01T00:00:00Z"])
        );
    }

    #[test]
    fn list_rejects_non_array() {
        let registry = Registry::new();
        let cls = owner(&registry);
        let err = Field::list(Field::json()).decode(&cls, &json!("nope")).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn dict_keeps_keys() {
        let registry = Registry::new();
        let cls = owner(&registry);
        let field = Field::dict(Field::datetime());
        let wire = json!({"start": "2010-02-11T04:37:44Z"});
        let decoded = field.decode(&cls, &wire).unwrap();
        assert!(decoded.as_dict().unwrap().contains_key("start"));
        assert_eq!(field.encode(&decoded).unwrap(), wire);
    }

    #[test]
    fn object_requires_mapping_and_names_class() {
        let registry = Registry::new();
        let cls = owner(&registry);
        let err = Field::object("Owner").decode(&cls, &json!([1])).unwrap_err();
        assert!(err.is_type_error());
        assert!(err.to_string().contains("Owner object"));
    }

    #[test]
    fn object_by_name_resolves_through_registry() {
        let registry = Registry::new();
        let cls = owner(&registry);
        let decoded = Field::object("Owner")
            .decode(&cls, &json!({"name": "fred"}))
            .unwrap();
        let mut nested = decoded.into_object().unwrap();
        assert_eq!(nested.class().name(), "Owner");
        assert_eq!(nested.get("name").unwrap(), Some(&Value::from("fred")));
    }

    #[test]
    fn object_by_unknown_name_is_lookup_error() {
        let registry = Registry::new();
        let cls = owner(&registry);
        let err = Field::object("Ghost").decode(&cls, &json!({})).unwrap_err();
        assert!(err.is_lookup_error());
    }

    #[test]
    fn datetime_decodes_as_utc() {
        let registry = Registry::new();
        let cls = owner(&registry);
        let decoded = Field::datetime()
            .decode(&cls, &json!("2008-12-31T04:00:01Z"))
            .unwrap();
        match decoded {
            Value::Datetime(dt) => {
                assert_eq!(dt.offset().local_minus_utc(), 0);
                assert_eq!(dt, Utc.with_ymd_and_hms(2008, 12, 31, 4, 0, 1).unwrap());
            }
            other => panic!("Expected Datetime, got {:?}", other),
        }
    }

    #[test]
    fn datetime_rejects_malformed_and_mistyped() {
        let registry = Registry::new();
        let cls = owner(&registry);
        let field = Field::datetime();
        let err = field.decode(&cls, &json!("2008-12-31 04:00:01")).unwrap_err();
        assert!(err.to_string().contains("2008-12-31 04:00:01"));
        assert!(field.decode(&cls, &json!(1230696001)).unwrap_err().is_type_error());
    }

    #[test]
    fn datetime_encode_converts_to_utc_and_truncates() {
        let field = Field::datetime();
        let utc = Utc.with_ymd_and_hms(2010, 2, 11, 4, 37, 44).unwrap()
            + chrono::Duration::milliseconds(250);
        assert_eq!(field.encode(&Value::from(utc)).unwrap(), json!("2010-02-11T04:37:44Z"));

        let eastern = FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2010, 2, 10, 23, 37, 44)
            .unwrap();
        assert_eq!(
            field.encode(&Value::from(eastern)).unwrap(),
            json!("2010-02-11T04:37:44Z")
        );
    }

    #[test]
    fn datetime_encode_rejects_non_timestamp() {
        let err = Field::datetime().encode(&Value::from("now")).unwrap_err();
        assert!(matches!(err, RestError::Encode { .. }));
    }

    #[test]
    fn datetime_custom_format() {
        let registry = Registry::new();
        let cls = owner(&registry);
        let field = Field::datetime_with_format("%Y-%m-%d %H:%M:%S");
        let decoded = field.decode(&cls, &json!("2009-02-03 10:44:00")).unwrap();
        assert_eq!(field.encode(&decoded).unwrap(), json!("2009-02-03 10:44:00"));
    }

    #[test]
    fn install_defaults_api_name_once() {
        let mut plain = Field::json();
        plain.install("title");
        assert_eq!(plain.api_name(), "title");

        let mut renamed = Field::json().with_api_name("fooBarBaz");
        renamed.install("foo_bar_baz");
        assert_eq!(renamed.attr_name(), "foo_bar_baz");
        assert_eq!(renamed.api_name(), "fooBarBaz");
    }
}
