//! # Restobjects Architecture
//!
//! Restobjects maps **JSON REST resources onto typed objects**. You declare a
//! class of objects once, with a field per attribute, and get two things for
//! free: conversion between wire dictionaries and attributes in both
//! directions, and handles that treat a remote resource as if it were a live
//! object that fetches itself the first time it is used.
//!
//! ## The Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Collection (collection.rs)                                 │
//! │  - A resource whose `entries` field is a list of objects    │
//! │  - Slices become offset/limit query parameters              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Resource (resource.rs, promised.rs, http.rs)               │
//! │  - Location, etag, delivery state                           │
//! │  - Fetch on first use, exactly once                         │
//! │  - GET/PUT/POST/DELETE, lazy HEAD/OPTIONS                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  DataObject (object.rs)                                     │
//! │  - Raw source data + sparse cache of decoded attributes     │
//! │  - to_dict / from_dict / update_from_dict                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Classes and Fields (class.rs, registry.rs, field.rs)       │
//! │  - Field kinds: json, constant, list, dict, object, datetime│
//! │  - Registry: names, forward references, subclass dispatch   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The bottom two layers never perform I/O. Everything that talks to a server
//! goes through the [`transport::Transport`] trait, which the crate consumes
//! but does not require you to implement: [`transport::MemTransport`] serves
//! canned responses for tests, and the `http` feature adds a `ureq` client.
//!
//! ## Declaring Classes
//!
//! ```
//! use restobjects::{DataObject, Field, Registry, Value};
//! use serde_json::json;
//!
//! let registry = Registry::new();
//! let entry = registry
//!     .class("Entry")
//!     .field("title", Field::json())
//!     .field("published", Field::datetime())
//!     .field("replies", Field::list(Field::object("Entry")))
//!     .build();
//!
//! let mut post = DataObject::from_dict(&entry, &json!({
//!     "title": "Hello",
//!     "published": "2010-02-11T04:37:44Z",
//!     "replies": [{"title": "Hi back"}],
//! })).unwrap();
//!
//! assert_eq!(post.get("title").unwrap(), Some(&Value::from("Hello")));
//! ```
//!
//! A field naming a class as a string is resolved on first decode, so a class
//! may refer to itself or to classes declared after it.
//!
//! ## Lazy Handles
//!
//! ```
//! use restobjects::transport::MemTransport;
//! use restobjects::{Field, Registry, Resource};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let registry = Registry::new();
//! let entry = registry.class("Entry").field("title", Field::json()).build();
//!
//! let transport = Arc::new(MemTransport::new());
//! transport.serve_json("http://example.com/entry/1", &json!({"title": "Hello"}));
//!
//! let mut post = Resource::at(&entry, "http://example.com/entry/1")
//!     .with_transport(transport.clone());
//! assert_eq!(transport.request_count(), 0);
//! post.get("title").unwrap();
//! assert_eq!(transport.request_count(), 1);
//! ```
//!
//! ## Testing Strategy
//!
//! Every module carries unit tests beside its code. Cross-module behavior
//! (round trips, delivery, paging, HTTP outcomes) is covered by the
//! integration tests under `tests/`, which build their classes in private
//! registries and talk to [`transport::MemTransport`].
//!
//! ## Module Overview
//!
//! - [`field`]: Field kinds and their decode/encode rules
//! - [`class`]: Class definitions, builders, links
//! - [`registry`]: Class registry, forward references, subclass dispatch
//! - [`object`]: The structured object
//! - [`resource`]: Lazy resource handles and HTTP verbs
//! - [`promised`]: Lazy `HEAD`/`OPTIONS` responses
//! - [`collection`]: Paged lists of objects
//! - [`http`]: Response interpretation
//! - [`transport`]: The transport contract and implementations
//! - [`config`]: Configuration
//! - [`value`]: Decoded attribute values
//! - [`error`]: Error types

pub mod class;
pub mod collection;
pub mod config;
pub mod error;
pub mod field;
pub mod http;
pub mod object;
pub mod promised;
pub mod registry;
pub mod resource;
pub mod transport;
pub mod value;

pub use class::{ClassBuilder, ClassDef, Link, LinkPath};
pub use collection::Collection;
pub use config::RestConfig;
pub use error::{RestError, Result};
pub use field::{ClassRef, Field, FieldDefault, FieldKind, DEFAULT_DATETIME_FORMAT};
pub use object::{DataObject, ObjectState};
pub use promised::PromisedResponse;
pub use registry::Registry;
pub use resource::{DeliveryState, Resource, ResourceState};
pub use value::Value;
