//! Class definitions and the builder that registers them.
//!
//! A [`ClassDef`] is the runtime description of a structured-object type: its
//! name, the fields it declares (own and inherited), the links it exposes, and
//! the registry it belongs to. Definitions are immutable once built and are
//! shared as `Arc<ClassDef>`.
//!
//! Subclassing is done by [`ClassBuilder::extends`]: the child starts with a
//! copy of the parent's fields and links, may replace any of them by name, and
//! may drop one with [`ClassBuilder::without`].

use crate::config::RestConfig;
use crate::error::{RestError, Result};
use crate::field::{ClassRef, Field};
use crate::registry::{Registry, RegistryShared};
use crate::resource::Resource;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Signature of a computed link path.
pub type LinkPathFn = dyn Fn(&Resource) -> Result<String> + Send + Sync;

/// Where a link points, relative to its owner's location.
#[derive(Clone)]
pub enum LinkPath {
    /// A fixed path, defaulting to the attribute name.
    Static(String),
    /// A path computed from the owning handle.
    Computed(Arc<LinkPathFn>),
}

impl fmt::Debug for LinkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkPath::Static(path) => f.debug_tuple("Static").field(path).finish(),
            LinkPath::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A declared relationship to another remote resource.
///
/// Reading a link (see [`Resource::link`]) builds a fresh undelivered handle
/// of the target class whose location is the owner's location joined with
/// the link path.
#[derive(Debug, Clone)]
pub struct Link {
    target: ClassRef,
    path: Option<LinkPath>,
}

impl Link {
    /// A link to `target`, at a path equal to the attribute name.
    pub fn to(target: impl Into<ClassRef>) -> Self {
        Self {
            target: target.into(),
            path: None,
        }
    }

    /// Use a fixed relative path.
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(LinkPath::Static(path.into()));
        self
    }

    /// Compute the relative path from the owning handle.
    pub fn computed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Resource) -> Result<String> + Send + Sync + 'static,
    {
        self.path = Some(LinkPath::Computed(Arc::new(f)));
        self
    }

    fn install(&mut self, attr_name: &str) {
        if self.path.is_none() {
            self.path = Some(LinkPath::Static(attr_name.to_string()));
        }
    }

    pub fn target(&self) -> &ClassRef {
        &self.target
    }

    pub fn path(&self) -> Option<&LinkPath> {
        self.path.as_ref()
    }
}

/// Runtime description of a structured-object class.
pub struct ClassDef {
    name: String,
    parent: Option<Arc<ClassDef>>,
    fields: BTreeMap<String, Field>,
    links: BTreeMap<String, Link>,
    bare_list: bool,
    registry: Weak<RegistryShared>,
}

impl ClassDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ClassDef>> {
        self.parent.as_ref()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// All declared fields, own and inherited, ordered by attribute name.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Whether wire data for this class is a bare JSON array held under
    /// the `entries` field.
    pub fn is_bare_list(&self) -> bool {
        self.bare_list
    }

    /// True if `self` is `other` or was built by extending it, directly or
    /// through intermediate classes.
    pub fn is_subclass_of(&self, other: &ClassDef) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.parent
            .as_deref()
            .is_some_and(|parent| parent.is_subclass_of(other))
    }

    /// The registry this class was registered in.
    pub fn registry(&self) -> Result<Registry> {
        self.registry
            .upgrade()
            .map(Registry::from_shared)
            .ok_or_else(|| RestError::ClassNotFound(format!("registry of {}", self.name)))
    }

    pub(crate) fn config(&self) -> Result<RestConfig> {
        Ok(self.registry()?.config().clone())
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("links", &self.links.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for a [`ClassDef`]; obtain one from [`Registry::class`].
pub struct ClassBuilder {
    registry: Registry,
    name: String,
    parent: Option<Arc<ClassDef>>,
    fields: BTreeMap<String, Field>,
    links: BTreeMap<String, Link>,
    removed: Vec<String>,
    bare_list: bool,
}

impl ClassBuilder {
    pub(crate) fn new(registry: Registry, name: impl Into<String>) -> Self {
        Self {
            registry,
            name: name.into(),
            parent: None,
            fields: BTreeMap::new(),
            links: BTreeMap::new(),
            removed: Vec::new(),
            bare_list: false,
        }
    }

    /// Inherit every field and link of `parent`.
    pub fn extends(mut self, parent: &Arc<ClassDef>) -> Self {
        self.bare_list = parent.bare_list;
        self.parent = Some(Arc::clone(parent));
        self
    }

    /// Declare a field. The attribute name is `name`; the wire key is `name`
    /// unless the field carries its own `api_name`.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        let name = name.into();
        self.links.remove(&name);
        self.fields.insert(name, field);
        self
    }

    /// Declare a link to another resource.
    pub fn link(mut self, name: impl Into<String>, link: Link) -> Self {
        let name = name.into();
        self.fields.remove(&name);
        self.links.insert(name, link);
        self
    }

    /// Drop an inherited field or link.
    pub fn without(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.fields.remove(&name);
        self.links.remove(&name);
        self.removed.push(name);
        self
    }

    pub(crate) fn bare_list(mut self) -> Self {
        self.bare_list = true;
        self
    }

    /// Finish the class and register it, replacing any earlier class of the
    /// same name for lookups by name.
    pub fn build(self) -> Arc<ClassDef> {
        let ClassBuilder {
            registry,
            name,
            parent,
            fields: own_fields,
            links: own_links,
            removed,
            bare_list,
        } = self;

        let (mut fields, mut links) = match &parent {
            Some(p) => (p.fields.clone(), p.links.clone()),
            None => (BTreeMap::new(), BTreeMap::new()),
        };
        for dropped in &removed {
            fields.remove(dropped);
            links.remove(dropped);
        }

        let mut constants = Vec::new();
        for (attr, mut field) in own_fields {
            field.install(&attr);
            if let Some(value) = field.constant_value().and_then(|v| v.as_json()) {
                constants.push((attr.clone(), value.clone()));
            }
            links.remove(&attr);
            fields.insert(attr, field);
        }
        for (attr, mut link) in own_links {
            link.install(&attr);
            fields.remove(&attr);
            links.insert(attr, link);
        }

        trace!(
            class = %name,
            fields = fields.len(),
            links = links.len(),
            "Registering class"
        );

        let class = Arc::new(ClassDef {
            name,
            parent,
            fields,
            links,
            bare_list,
            registry: registry.downgrade(),
        });
        registry.register(&class, &constants);
        class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_inherits_and_overrides() {
        let registry = Registry::new();
        let base = registry
            .class("Base")
            .field("name", Field::json())
            .field("kind", Field::json())
            .build();
        let child = registry
            .class("Child")
            .extends(&base)
            .field("kind", Field::constant("child"))
            .field("extra", Field::json())
            .build();

        assert_eq!(
            child.field_names().collect::<Vec<_>>(),
            vec!["extra", "kind", "name"]
        );
        assert!(child.field("kind").unwrap().is_constant());
        assert!(!base.field("kind").unwrap().is_constant());
        assert!(child.is_subclass_of(&base));
        assert!(!base.is_subclass_of(&child));
    }

    #[test]
    fn without_drops_inherited_field() {
        let registry = Registry::new();
        let base = registry
            .class("Base")
            .field("name", Field::json())
            .field("secret", Field::json())
            .build();
        let child = registry.class("Child").extends(&base).without("secret").build();
        assert!(child.has_field("name"));
        assert!(!child.has_field("secret"));
    }

    #[test]
    fn field_replaces_inherited_link() {
        let registry = Registry::new();
        let base = registry
            .class("Base")
            .link("comments", Link::to("Base"))
            .build();
        let child = registry
            .class("Child")
            .extends(&base)
            .field("comments", Field::list(Field::json()))
            .build();
        assert!(child.link("comments").is_none());
        assert!(child.has_field("comments"));
        assert!(base.link("comments").is_some());
    }

    #[test]
    fn link_path_defaults_to_attribute_name() {
        let registry = Registry::new();
        let cls = registry
            .class("Blog")
            .link("posts", Link::to("Blog"))
            .link("feed", Link::to("Blog").at("atom.xml"))
            .build();
        match cls.link("posts").and_then(Link::path) {
            Some(LinkPath::Static(path)) => assert_eq!(path, "posts"),
            other => panic!("Expected static path, got {:?}", other),
        }
        match cls.link("feed").and_then(Link::path) {
            Some(LinkPath::Static(path)) => assert_eq!(path, "atom.xml"),
            other => panic!("Expected static path, got {:?}", other),
        }
    }

    #[test]
    fn registry_is_reachable_from_class() {
        let registry = Registry::new();
        let cls = registry.class("Thing").build();
        let found = cls.registry().unwrap().find_by_name("Thing").unwrap();
        assert!(Arc::ptr_eq(&cls, &found));
    }
}
