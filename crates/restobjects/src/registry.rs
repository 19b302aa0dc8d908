//! # Class Registry
//!
//! The registry is the runtime half of class declaration. Every class built
//! with [`ClassBuilder`] is recorded here, which is what makes two kinds of
//! late binding possible:
//!
//! - **Forward references.** A field may name its target class as a string
//!   (`Field::object("Entry")`). The name is resolved on first decode, against
//!   whichever class was most recently registered under it. Re-registering a
//!   name overwrites the mapping; it never merges.
//! - **Subclass dispatch.** Each `Constant` field a class declares records the
//!   pair `(attribute name, value)` against the class name. Incoming data can
//!   then be routed to the most specific subclass whose discriminator matches
//!   (see [`crate::DataObject::from_dict_dispatch`]).
//!
//! ## Instances
//!
//! [`Registry::global`] is the process-wide registry most applications use.
//! Independent registries from [`Registry::new`] are useful when two sets of
//! classes must not see each other's names, and in tests.
//!
//! A `Registry` is a cheap handle; clones share the same tables. Classes hold
//! only a weak back-reference, so dropping every handle to a private registry
//! frees its classes once no instances remain.
//!
//! ## Collection Classes
//!
//! [`Registry::page_of`] and [`Registry::list_of`] synthesize container
//! classes for an entry reference on first request and return the cached
//! class afterwards. The cache is keyed by the reference itself: a name
//! resolves lazily, while a class handle pins that exact class, so passing a
//! newly declared class of the same name builds a new container.

use crate::class::{ClassBuilder, ClassDef};
use crate::config::RestConfig;
use crate::error::{RestError, Result};
use crate::field::{ClassRef, Field};
use crate::object::{DataObject, ObjectState};
use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::trace;

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

#[derive(Default)]
struct Tables {
    by_name: HashMap<String, Arc<ClassDef>>,
    /// attribute name -> canonical JSON of the constant -> class name
    by_constant: HashMap<String, HashMap<String, String>>,
    collections: HashMap<(String, EntryKey), Arc<ClassDef>>,
}

/// Identity of the entry reference a collection class was built for.
///
/// `Class` holds the address of the entry class. The cached collection class
/// keeps that `Arc` alive, so the address cannot be reused while cached.
#[derive(Debug, PartialEq, Eq, Hash)]
enum EntryKey {
    Class(usize),
    Named(String),
}

impl EntryKey {
    fn of(entry: &ClassRef) -> Self {
        match entry {
            ClassRef::Class(cls) => EntryKey::Class(Arc::as_ptr(cls) as usize),
            ClassRef::Named(name) => EntryKey::Named(name.clone()),
        }
    }
}

pub(crate) struct RegistryShared {
    tables: RwLock<Tables>,
    config: RestConfig,
}

/// Handle to a set of registered classes.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<RegistryShared>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(RestConfig::default())
    }

    /// An empty registry whose resources use `config`.
    pub fn with_config(config: RestConfig) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                tables: RwLock::new(Tables::default()),
                config,
            }),
        }
    }

    /// The process-wide registry.
    pub fn global() -> Registry {
        GLOBAL.clone()
    }

    pub(crate) fn from_shared(shared: Arc<RegistryShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<RegistryShared> {
        Arc::downgrade(&self.shared)
    }

    pub fn config(&self) -> &RestConfig {
        &self.shared.config
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.shared
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.shared
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start declaring a class named `name` in this registry.
    pub fn class(&self, name: impl Into<String>) -> ClassBuilder {
        ClassBuilder::new(self.clone(), name)
    }

    pub(crate) fn register(&self, class: &Arc<ClassDef>, constants: &[(String, JsonValue)]) {
        let mut tables = self.write();
        tables
            .by_name
            .insert(class.name().to_string(), Arc::clone(class));
        for (attr, value) in constants {
            tables
                .by_constant
                .entry(attr.clone())
                .or_default()
                .insert(value.to_string(), class.name().to_string());
        }
    }

    /// The class most recently registered under `name`.
    pub fn find_by_name(&self, name: &str) -> Result<Arc<ClassDef>> {
        let found = self.read().by_name.get(name).cloned();
        trace!(class = name, found = found.is_some(), "Resolving class by name");
        found.ok_or_else(|| RestError::ClassNotFound(name.to_string()))
    }

    /// The subclass of `base` whose `Constant` field `field` is `value`.
    pub fn subclass_with_constant_field(
        &self,
        base: &ClassDef,
        field: &str,
        value: &JsonValue,
    ) -> Result<Arc<ClassDef>> {
        let no_subclass = || RestError::NoSubclass {
            class: base.name().to_string(),
            field: field.to_string(),
            value: value.to_string(),
        };

        let class_name = self
            .read()
            .by_constant
            .get(field)
            .and_then(|values| values.get(&value.to_string()))
            .cloned()
            .ok_or_else(no_subclass)?;

        let class = self.find_by_name(&class_name).map_err(|_| no_subclass())?;
        if class.is_subclass_of(base) {
            Ok(class)
        } else {
            Err(no_subclass())
        }
    }

    /// A class named `PageOf<Entry>` holding a page of entries under an
    /// `entries` key.
    pub fn page_of(&self, entry: impl Into<ClassRef>) -> Arc<ClassDef> {
        let entry = entry.into();
        self.collection_class(format!("PageOf{}", entry.name()), entry, false)
    }

    /// A class named `ListOf<Entry>` whose wire form is a bare JSON array.
    pub fn list_of(&self, entry: impl Into<ClassRef>) -> Arc<ClassDef> {
        let entry = entry.into();
        self.collection_class(format!("ListOf{}", entry.name()), entry, true)
    }

    fn collection_class(&self, name: String, entry: ClassRef, bare_list: bool) -> Arc<ClassDef> {
        let key = (name.clone(), EntryKey::of(&entry));
        if let Some(class) = self.read().collections.get(&key) {
            return Arc::clone(class);
        }

        let mut builder = self
            .class(name.clone())
            .field("entries", Field::list(Field::object(entry)));
        if bare_list {
            builder = builder.bare_list();
        }
        let class = builder.build();

        // A racing builder may have won; keep whichever landed first.
        let mut tables = self.write();
        Arc::clone(tables.collections.entry(key).or_insert(class))
    }

    /// Rebuild an object from a snapshot taken with
    /// [`DataObject::snapshot`].
    pub fn restore(&self, state: &ObjectState) -> Result<DataObject> {
        let class = self.find_by_name(&state.class)?;
        DataObject::from_state(&class, state)
    }
}
