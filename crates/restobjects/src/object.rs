//! # Structured Objects
//!
//! A [`DataObject`] is an instance of a registered class. It keeps two
//! stores side by side:
//!
//! - the **source data**: the last JSON object handed in from outside, kept
//!   verbatim (unknown keys included) and deep-copied at every boundary;
//! - the **decoded attributes**: a sparse cache of values produced by the
//!   fields, filled on first read or by explicit assignment.
//!
//! ## Reads
//!
//! [`DataObject::get`] decodes lazily and caches. The first read of a field
//! looks up its `api_name` in the source data; a present, non-null value is
//! decoded, otherwise the field's default (static or computed) is used, and
//! otherwise the attribute is absent. Constant fields read as their constant;
//! a different value in the source data is a type error.
//!
//! ## Writes
//!
//! [`DataObject::to_dict`] starts from a copy of the source data, so unknown
//! keys survive a round trip, and overlays every declared field that holds a
//! value. Defaults are never written back out; only values decoded from
//! source data or assigned by the caller are.
//!
//! [`DataObject::update_from_dict`] is a full overwrite: it drops every
//! decoded attribute and replaces the source data wholesale.

use crate::class::ClassDef;
use crate::error::{RestError, Result};
use crate::field::{Field, FieldDefault, FieldKind};
use crate::registry::Registry;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Resolved state of one attribute.
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    /// Decoded from source data or assigned; written out by `to_dict`.
    Value(Value),
    /// Supplied by the field's default; not written out.
    Default(Value),
    Absent,
}

impl Slot {
    fn value(&self) -> Option<&Value> {
        match self {
            Slot::Value(v) | Slot::Default(v) => Some(v),
            Slot::Absent => None,
        }
    }

    fn into_value(self) -> Option<Value> {
        match self {
            Slot::Value(v) | Slot::Default(v) => Some(v),
            Slot::Absent => None,
        }
    }
}

/// Serializable copy of a [`DataObject`]'s state.
///
/// `attributes` holds the encoded form of every attribute that was decoded
/// from source data or assigned, so restoring does not depend on the
/// attribute having been written back to `api_data` first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectState {
    pub class: String,
    pub api_data: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, JsonValue>,
}

/// An instance of a registered class.
#[derive(Clone)]
pub struct DataObject {
    class: Arc<ClassDef>,
    decoded: HashMap<String, Slot>,
    api_data: Map<String, JsonValue>,
}

impl DataObject {
    /// An empty instance of `class`.
    pub fn new(class: &Arc<ClassDef>) -> Self {
        Self::from_map(class, Map::new())
    }

    /// Builder-style assignment, for constructing an instance with explicit
    /// attribute values.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// An instance of `class` holding `data` as its source data.
    pub fn from_dict(class: &Arc<ClassDef>, data: &JsonValue) -> Result<Self> {
        let mut obj = Self::new(class);
        obj.update_from_dict(data)?;
        Ok(obj)
    }

    /// An instance of `class` taking ownership of `data`.
    pub fn from_map(class: &Arc<ClassDef>, data: Map<String, JsonValue>) -> Self {
        Self {
            class: Arc::clone(class),
            decoded: HashMap::new(),
            api_data: data,
        }
    }

    /// Like [`DataObject::from_dict`], but picks the subclass of `base` whose
    /// `Constant` field `discriminator` matches the incoming data, falling
    /// back to `base` when no subclass matches.
    pub fn from_dict_dispatch(
        base: &Arc<ClassDef>,
        discriminator: &str,
        data: &JsonValue,
    ) -> Result<Self> {
        let key = base
            .field(discriminator)
            .map(Field::api_name)
            .unwrap_or(discriminator);
        let class = match data.get(key) {
            Some(value) => match base
                .registry()?
                .subclass_with_constant_field(base, discriminator, value)
            {
                Ok(class) => class,
                Err(RestError::NoSubclass { .. }) => Arc::clone(base),
                Err(err) => return Err(err),
            },
            None => Arc::clone(base),
        };
        Self::from_dict(&class, data)
    }

    /// Replace all data with `data`, which must be a JSON object (or an
    /// array, for bare-list classes).
    pub fn update_from_dict(&mut self, data: &JsonValue) -> Result<()> {
        match data {
            JsonValue::Object(map) => {
                self.update_from_map(map.clone());
                Ok(())
            }
            JsonValue::Array(items) if self.class.is_bare_list() => {
                let mut map = Map::new();
                map.insert("entries".to_string(), JsonValue::Array(items.clone()));
                self.update_from_map(map);
                Ok(())
            }
            other => Err(RestError::decode(
                other,
                format!("{} mapping", self.class.name()),
            )),
        }
    }

    /// Replace all data with `data`, taking ownership.
    pub fn update_from_map(&mut self, data: Map<String, JsonValue>) {
        self.decoded.clear();
        self.api_data = data;
    }

    /// Encode the instance as a fresh JSON object.
    pub fn to_dict(&self) -> Result<Map<String, JsonValue>> {
        let mut data = self.api_data.clone();

        for field in self.class.fields() {
            let key = field.api_name();
            if let FieldKind::Constant(constant) = field.kind() {
                self.check_constant(field)?;
                data.insert(key.to_string(), field.encode(constant)?);
                continue;
            }
            match self.decoded.get(field.attr_name()) {
                Some(Slot::Value(value)) => {
                    data.insert(key.to_string(), field.encode(value)?);
                }
                // Defaulted or absent: the source had nothing usable here.
                Some(_) => {}
                None => {
                    if let Some(raw) = self.api_data.get(key).filter(|v| !v.is_null()) {
                        let value = field.decode(&self.class, raw)?;
                        data.insert(key.to_string(), field.encode(&value)?);
                    }
                }
            }
        }

        data.retain(|_, v| !v.is_null());
        Ok(data)
    }

    /// Encode the instance in its wire form: a JSON object, or a bare array
    /// for bare-list classes.
    pub fn to_json(&self) -> Result<JsonValue> {
        let mut data = self.to_dict()?;
        if self.class.is_bare_list() {
            return Ok(data
                .remove("entries")
                .unwrap_or_else(|| JsonValue::Array(Vec::new())));
        }
        Ok(JsonValue::Object(data))
    }

    pub fn class(&self) -> &Arc<ClassDef> {
        &self.class
    }

    /// The raw source data.
    pub fn api_data(&self) -> &Map<String, JsonValue> {
        &self.api_data
    }

    /// Read attribute `name`, decoding and caching it on first access.
    ///
    /// Returns `Ok(None)` for an absent attribute and an error for a name the
    /// class does not declare.
    pub fn get(&mut self, name: &str) -> Result<Option<&Value>> {
        let class = Arc::clone(&self.class);
        let field = class
            .field(name)
            .ok_or_else(|| self.no_such_attribute(name))?;
        if field.is_constant() {
            self.check_constant(field)?;
            return Ok(self.class.field(name).and_then(Field::constant_value));
        }
        self.ensure_resolved(field)?;
        Ok(self.decoded.get(name).and_then(Slot::value))
    }

    /// Mutable access to attribute `name`.
    ///
    /// A defaulted value becomes an explicit one, so changes made through the
    /// reference are written out by `to_dict`. Constant fields yield `None`.
    pub fn get_mut(&mut self, name: &str) -> Result<Option<&mut Value>> {
        let class = Arc::clone(&self.class);
        let field = class
            .field(name)
            .ok_or_else(|| self.no_such_attribute(name))?;
        if field.is_constant() {
            return Ok(None);
        }
        self.ensure_resolved(field)?;
        let Some(slot) = self.decoded.get_mut(name) else {
            return Ok(None);
        };
        if let Slot::Default(v) = slot {
            let taken = std::mem::replace(v, Value::Json(JsonValue::Null));
            *slot = Slot::Value(taken);
        }
        Ok(match slot {
            Slot::Value(v) => Some(v),
            _ => None,
        })
    }

    /// Read attribute `name` without caching the result.
    pub fn peek(&self, name: &str) -> Result<Option<Cow<'_, Value>>> {
        let field = self
            .class
            .field(name)
            .ok_or_else(|| self.no_such_attribute(name))?;
        if let Some(constant) = field.constant_value() {
            self.check_constant(field)?;
            return Ok(Some(Cow::Borrowed(constant)));
        }
        match self.decoded.get(name) {
            Some(slot) => Ok(slot.value().map(Cow::Borrowed)),
            None => Ok(self.resolve(field)?.into_value().map(Cow::Owned)),
        }
    }

    /// Assign attribute `name`.
    ///
    /// A `Constant` field accepts only its constant.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let field = self
            .class
            .field(name)
            .ok_or_else(|| RestError::NoSuchAttribute {
                class: self.class.name().to_string(),
                name: name.to_string(),
            })?;
        if let Some(constant) = field.constant_value() {
            if *constant != value {
                return Err(RestError::ConstantMismatch {
                    value: describe(&value),
                    expected: describe(constant),
                });
            }
            return Ok(());
        }
        self.decoded.insert(name.to_string(), Slot::Value(value));
        Ok(())
    }

    /// Forget attribute `name`: both its decoded value and its source data.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let field = self
            .class
            .field(name)
            .ok_or_else(|| RestError::NoSuchAttribute {
                class: self.class.name().to_string(),
                name: name.to_string(),
            })?;
        self.api_data.remove(field.api_name());
        self.decoded.remove(name);
        Ok(())
    }

    /// Serializable copy of this instance's state.
    pub fn snapshot(&self) -> Result<ObjectState> {
        let mut attributes = Map::new();
        for (name, slot) in &self.decoded {
            if let (Slot::Value(value), Some(field)) = (slot, self.class.field(name)) {
                attributes.insert(name.clone(), field.encode(value)?);
            }
        }
        Ok(ObjectState {
            class: self.class.name().to_string(),
            api_data: self.api_data.clone(),
            attributes,
        })
    }

    pub(crate) fn from_state(class: &Arc<ClassDef>, state: &ObjectState) -> Result<Self> {
        let mut obj = Self::from_map(class, state.api_data.clone());
        for (name, raw) in &state.attributes {
            let field = class
                .field(name)
                .ok_or_else(|| obj.no_such_attribute(name))?;
            let value = field.decode(class, raw)?;
            obj.decoded.insert(name.clone(), Slot::Value(value));
        }
        Ok(obj)
    }

    /// The registry this instance's class belongs to.
    pub fn registry(&self) -> Result<Registry> {
        self.class.registry()
    }

    /// A constant's source value, when present, must be the constant.
    fn check_constant(&self, field: &Field) -> Result<()> {
        match self.api_data.get(field.api_name()) {
            Some(raw) if !raw.is_null() => field.decode(&self.class, raw).map(|_| ()),
            _ => Ok(()),
        }
    }

    fn ensure_resolved(&mut self, field: &Field) -> Result<()> {
        if !self.decoded.contains_key(field.attr_name()) {
            let slot = self.resolve(field)?;
            self.decoded.insert(field.attr_name().to_string(), slot);
        }
        Ok(())
    }

    fn resolve(&self, field: &Field) -> Result<Slot> {
        match self.api_data.get(field.api_name()) {
            Some(raw) if !raw.is_null() => Ok(Slot::Value(field.decode(&self.class, raw)?)),
            _ => Ok(match field.default() {
                Some(FieldDefault::Value(v)) => Slot::Default(v.clone()),
                Some(FieldDefault::Computed(f)) => {
                    f(self, &self.api_data).map_or(Slot::Absent, Slot::Default)
                }
                None => Slot::Absent,
            }),
        }
    }

    fn no_such_attribute(&self, name: &str) -> RestError {
        RestError::NoSuchAttribute {
            class: self.class.name().to_string(),
            name: name.to_string(),
        }
    }
}

fn describe(value: &Value) -> String {
    match value.as_json() {
        Some(v) => v.to_string(),
        None => format!("{:?}", value),
    }
}

impl PartialEq for DataObject {
    fn eq(&self, other: &Self) -> bool {
        if !Arc::ptr_eq(&self.class, &other.class) {
            return false;
        }
        self.class.fields().all(|field| {
            let name = field.attr_name();
            match (self.peek(name), other.peek(name)) {
                (Ok(a), Ok(b)) => a == b,
                // Undecodable on both sides: equal when the source values are.
                (Err(_), Err(_)) => {
                    self.api_data.get(field.api_name()) == other.api_data.get(field.api_name())
                }
                _ => false,
            }
        })
    }
}

impl fmt::Debug for DataObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataObject")
            .field("class", &self.class.name())
            .field("api_data", &self.api_data)
            .field("decoded", &self.decoded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use serde_json::json;

    fn post_class(registry: &Registry) -> Arc<ClassDef> {
        registry
            .class("Post")
            .field("title", Field::json())
            .field("score", Field::json().with_default(7))
            .field("body", Field::json().with_api_name("content"))
            .build()
    }

    #[test]
    fn reads_decode_from_api_name() {
        let registry = Registry::new();
        let cls = post_class(&registry);
        let mut post =
            DataObject::from_dict(&cls, &json!({"title": "Hi", "content": "text"})).unwrap();
        assert_eq!(post.get("title").unwrap(), Some(&Value::from("Hi")));
        assert_eq!(post.get("body").unwrap(), Some(&Value::from("text")));
    }

    #[test]
    fn undeclared_name_is_error() {
        let registry = Registry::new();
        let cls = post_class(&registry);
        let mut post = DataObject::from_dict(&cls, &json!({"secret": "codes"})).unwrap();
        let err = post.get("secret").unwrap_err();
        assert!(matches!(err, RestError::NoSuchAttribute { .. }));
        assert!(post.set("secret", "x").is_err());
    }

    #[test]
    fn null_counts_as_absent() {
        let registry = Registry::new();
        let cls = post_class(&registry);
        let mut post = DataObject::from_dict(&cls, &json!({"title": null, "score": null})).unwrap();
        assert_eq!(post.get("title").unwrap(), None);
        assert_eq!(post.get("score").unwrap(), Some(&Value::from(7)));
        assert_eq!(post.to_dict().unwrap(), Map::new());
    }

    #[test]
    fn defaults_are_not_written_out() {
        let registry = Registry::new();
        let cls = post_class(&registry);
        let mut post = DataObject::from_dict(&cls, &json!({"title": "Hi"})).unwrap();
        assert_eq!(post.get("score").unwrap(), Some(&Value::from(7)));
        assert_eq!(post.to_dict().unwrap(), json!({"title": "Hi"}).as_object().cloned().unwrap());
    }

    #[test]
    fn get_mut_promotes_default() {
        let registry = Registry::new();
        let cls = registry
            .class("Tagged")
            .field("tags", Field::list(Field::json()).with_default(Vec::<Value>::new()))
            .build();
        let mut obj = DataObject::new(&cls);
        obj.get_mut("tags")
            .unwrap()
            .and_then(Value::as_list_mut)
            .unwrap()
            .push(Value::from("rust"));
        assert_eq!(JsonValue::Object(obj.to_dict().unwrap()), json!({"tags": ["rust"]}));
    }

    #[test]
    fn set_overrides_source_and_is_encoded() {
        let registry = Registry::new();
        let cls = post_class(&registry);
        let mut post = DataObject::from_dict(&cls, &json!({"title": "Hi"})).unwrap();
        post.set("title", "Bye").unwrap();
        post.set("body", "words").unwrap();
        assert_eq!(
            JsonValue::Object(post.to_dict().unwrap()),
            json!({"title": "Bye", "content": "words"})
        );
    }

    #[test]
    fn update_is_full_overwrite() {
        let registry = Registry::new();
        let cls = post_class(&registry);
        let mut post = DataObject::from_dict(&cls, &json!({"title": "Hi", "extra": 1})).unwrap();
        post.set("body", "words").unwrap();
        post.update_from_dict(&json!({"score": 3})).unwrap();
        assert_eq!(post.get("title").unwrap(), None);
        assert_eq!(post.get("body").unwrap(), None);
        assert_eq!(JsonValue::Object(post.to_dict().unwrap()), json!({"score": 3}));
    }

    #[test]
    fn from_dict_rejects_non_mapping() {
        let registry = Registry::new();
        let cls = post_class(&registry);
        let err = DataObject::from_dict(&cls, &json!(["a"])).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn remove_forgets_source_value() {
        let registry = Registry::new();
        let cls = post_class(&registry);
        let mut post = DataObject::from_dict(&cls, &json!({"title": "Hi", "score": 2})).unwrap();
        post.remove("score").unwrap();
        assert_eq!(post.get("score").unwrap(), Some(&Value::from(7)));
        assert!(!post.to_dict().unwrap().contains_key("score"));
    }

    #[test]
    fn computed_default_sees_source_data() {
        let registry = Registry::new();
        let cls = registry
            .class("Named")
            .field("name", Field::json())
            .field(
                "slug",
                Field::json().with_default_fn(|_, data| {
                    data.get("name")
                        .and_then(JsonValue::as_str)
                        .map(|n| Value::from(n.to_lowercase()))
                }),
            )
            .build();
        let mut obj = DataObject::from_dict(&cls, &json!({"name": "Fred"})).unwrap();
        assert_eq!(obj.get("slug").unwrap(), Some(&Value::from("fred")));

        let mut empty = DataObject::new(&cls);
        assert_eq!(empty.get("slug").unwrap(), None);
    }

    #[test]
    fn snapshot_restores_equal_object() {
        let registry = Registry::new();
        let cls = post_class(&registry);
        let mut post = DataObject::from_dict(&cls, &json!({"title": "Hi", "secret": "codes"})).unwrap();
        post.set("body", "words").unwrap();

        let state = post.snapshot().unwrap();
        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: ObjectState = serde_json::from_str(&encoded).unwrap();
        let restored = registry.restore(&decoded).unwrap();

        assert_eq!(restored, post);
        assert_eq!(restored.to_dict().unwrap(), post.to_dict().unwrap());
    }

    #[test]
    fn equality_requires_same_class() {
        let registry = Registry::new();
        let a = registry.class("A").field("x", Field::json()).build();
        let b = registry.class("B").field("x", Field::json()).build();
        let left = DataObject::from_dict(&a, &json!({"x": 1})).unwrap();
        let same = DataObject::from_dict(&a, &json!({"x": 1, "ignored": true})).unwrap();
        let other = DataObject::from_dict(&b, &json!({"x": 1})).unwrap();
        assert_eq!(left, same);
        assert_ne!(left, other);
    }

    #[test]
    fn undecodable_objects_compare_by_source() {
        let registry = Registry::new();
        let cls = registry.class("Event").field("at", Field::datetime()).build();
        let bad = DataObject::from_dict(&cls, &json!({"at": "yesterday"})).unwrap();
        assert!(bad.peek("at").is_err());
        assert_eq!(bad, bad.clone());

        let other = DataObject::from_dict(&cls, &json!({"at": "tomorrow"})).unwrap();
        assert_ne!(bad, other);
        let good = DataObject::from_dict(&cls, &json!({"at": "2008-12-31T04:00:01Z"})).unwrap();
        assert_ne!(bad, good);
    }

    #[test]
    fn bare_list_wraps_and_unwraps() {
        let registry = Registry::new();
        registry.class("Entry").field("id", Field::json()).build();
        let list = registry.list_of("Entry");
        let mut obj = DataObject::from_dict(&list, &json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(obj.get("entries").unwrap().and_then(Value::as_list).map(<[Value]>::len), Some(2));
        assert_eq!(obj.to_json().unwrap(), json!([{"id": 1}, {"id": 2}]));
    }
}
