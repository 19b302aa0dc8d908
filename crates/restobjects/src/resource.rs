//! # Lazy Resource Handles
//!
//! A [`Resource`] is a [`DataObject`] bound to a remote location. Building a
//! handle for a URL costs nothing; the resource is fetched the first time its
//! data is needed, and never more than once.
//!
//! ## Delivery States
//!
//! | State | Location | Delivered | Reading a declared field |
//! |-------|----------|-----------|--------------------------|
//! | `Unplaced` | none | no | reads local data |
//! | `Pending` | known | no | fetches, then reads |
//! | `Delivered` | any | yes | reads local data |
//!
//! Reads, writes and removals of declared fields, and `to_dict`, all deliver a
//! pending handle first, so local changes always land on top of the fetched
//! state. Names the class does not declare never trigger a fetch. Writing a
//! declared field of an unplaced handle marks it delivered, so a handle built
//! locally and placed afterwards keeps its data.
//!
//! [`Resource::deliver`] performs the transition explicitly. Calling it on a
//! delivered handle, or on one without a location, is an error, and the two
//! cases are distinguishable ([`RestError::AlreadyDelivered`] and
//! [`RestError::NoLocation`]).
//!
//! ## Derived Handles
//!
//! [`Resource::filter`] and [`Resource::link`] never touch the receiver. Each
//! returns a new pending handle for a derived URL that shares the receiver's
//! transport. Relative locations such as `/posts?page=1` are accepted and
//! stay relative in the derived handle.
//!
//! ## Concurrency
//!
//! Handles are plain values and delivery needs `&mut self`, so two threads
//! cannot race the first fetch of one handle. Share a handle across threads
//! behind your own lock.

use crate::class::{ClassDef, LinkPath};
use crate::error::{RestError, Result};
use crate::http;
use crate::object::{DataObject, ObjectState};
use crate::promised::PromisedResponse;
use crate::registry::Registry;
use crate::transport::{self, Method, Request, Response, Transport};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::{Position, Url};

/// Where a handle is in its delivery lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Unplaced,
    Pending,
    Delivered,
}

/// Serializable copy of a [`Resource`]'s state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(flatten)]
    pub object: ObjectState,
    pub location: Option<String>,
    pub etag: Option<String>,
    pub delivered: bool,
}

/// A structured object backed by a remote resource.
#[derive(Clone)]
pub struct Resource {
    object: DataObject,
    location: Option<String>,
    etag: Option<String>,
    delivered: bool,
    transport: Option<Arc<dyn Transport>>,
}

impl Resource {
    /// A new, unplaced instance of `class`.
    pub fn new(class: &Arc<ClassDef>) -> Self {
        Self::from_object(DataObject::new(class))
    }

    /// Wrap an existing object; the handle starts unplaced.
    pub fn from_object(object: DataObject) -> Self {
        Self {
            object,
            location: None,
            etag: None,
            delivered: false,
            transport: None,
        }
    }

    /// A pending handle for the resource at `url`. Nothing is fetched until
    /// its data is used.
    pub fn at(class: &Arc<ClassDef>, url: impl Into<String>) -> Self {
        let mut resource = Self::new(class);
        resource.location = Some(url.into());
        resource
    }

    /// Fetch the resource at `url` now, using the default transport.
    pub fn fetch(class: &Arc<ClassDef>, url: impl Into<String>) -> Result<Self> {
        let mut resource = Self::at(class, url);
        resource.deliver()?;
        Ok(resource)
    }

    /// Use `transport` for this handle and every handle derived from it.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn class(&self) -> &Arc<ClassDef> {
        self.object.class()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Move the handle to `location`. The delivery flag is left alone.
    pub fn set_location(&mut self, location: Option<String>) {
        self.location = location;
    }

    /// The version tag from the last response, replayed as `If-Match`.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    pub fn state(&self) -> DeliveryState {
        match (self.delivered, &self.location) {
            (true, _) => DeliveryState::Delivered,
            (false, Some(_)) => DeliveryState::Pending,
            (false, None) => DeliveryState::Unplaced,
        }
    }

    /// The underlying object as it stands, without delivering.
    pub fn object(&self) -> &DataObject {
        &self.object
    }

    /// The underlying object, delivering first if pending.
    pub fn into_object(mut self) -> Result<DataObject> {
        self.deliver_if_pending()?;
        Ok(self.object)
    }

    /// Fetch the resource and fill the handle from the response.
    pub fn deliver(&mut self) -> Result<()> {
        if self.delivered {
            return Err(RestError::AlreadyDelivered {
                class: self.class().name().to_string(),
                location: self.location.clone().unwrap_or_default(),
            });
        }
        let url = self.require_location()?;
        debug!(class = self.class().name(), url = %url, "Delivering resource");

        let request = self.request(Method::Get, &url)?;
        let (response, content) = transport::dispatch(self.transport.as_ref(), &request)?;
        self.update_from_response(&url, &response, &content)
    }

    fn deliver_if_pending(&mut self) -> Result<()> {
        if self.state() == DeliveryState::Pending {
            self.deliver()?;
        }
        Ok(())
    }

    fn deliver_for(&mut self, name: &str) -> Result<()> {
        if self.class().has_field(name) {
            self.deliver_if_pending()?;
        }
        Ok(())
    }

    /// Prepare a write to `name`: deliver first if pending. A write to a
    /// declared field of an unplaced handle counts as delivery, so placing
    /// the handle later never fetches over local data.
    fn prepare_write(&mut self, name: &str) -> Result<()> {
        self.deliver_for(name)?;
        if self.state() == DeliveryState::Unplaced && self.class().has_field(name) {
            self.delivered = true;
        }
        Ok(())
    }

    /// Read attribute `name`, delivering first if pending.
    pub fn get(&mut self, name: &str) -> Result<Option<&Value>> {
        self.deliver_for(name)?;
        self.object.get(name)
    }

    /// Mutable access to attribute `name`, delivering first if pending.
    pub fn get_mut(&mut self, name: &str) -> Result<Option<&mut Value>> {
        self.prepare_write(name)?;
        self.object.get_mut(name)
    }

    /// Assign attribute `name`, delivering first if pending.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.prepare_write(name)?;
        self.object.set(name, value)
    }

    /// Forget attribute `name`, delivering first if pending.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.prepare_write(name)?;
        self.object.remove(name)
    }

    /// Encode the resource, delivering first if pending.
    pub fn to_dict(&mut self) -> Result<Map<String, JsonValue>> {
        self.deliver_if_pending()?;
        self.object.to_dict()
    }

    /// Encode the resource in its wire form, delivering first if pending.
    pub fn to_json(&mut self) -> Result<JsonValue> {
        self.deliver_if_pending()?;
        self.object.to_json()
    }

    /// Replace all data. Assigning data counts as delivery.
    pub fn update_from_dict(&mut self, data: &JsonValue) -> Result<()> {
        self.object.update_from_dict(data)?;
        self.delivered = true;
        Ok(())
    }

    /// Fill the handle from a response to a request for `url`.
    ///
    /// Fails with the matching error kind if the response is unusable.
    /// Otherwise decodes the body when the status carries one, moves the
    /// handle to the location the response names, remembers its `ETag`, and
    /// marks the handle delivered.
    pub fn update_from_response(
        &mut self,
        url: &str,
        response: &Response,
        content: &[u8],
    ) -> Result<()> {
        let config = self.class().config()?;
        http::raise_for_response(
            self.class().name(),
            url,
            response,
            content,
            &config.content_types(),
        )?;

        if http::expects_body(response, content) {
            let data = http::parse_body(content)?;
            self.object.update_from_dict(&data)?;
        }

        self.location = Some(http::resolve_location(url, response)?);
        if let Some(etag) = response.headers.get("etag") {
            self.etag = Some(etag.to_string());
        }
        self.delivered = true;
        Ok(())
    }

    /// A new pending handle for this resource's URL with `params` merged
    /// into its query string. Existing parameters of the same name are
    /// replaced in place; new ones are appended.
    pub fn filter<I, K, V>(&self, params: I) -> Result<Resource>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let location = self.require_location()?;
        let url = merge_query(&location, params)?;
        Ok(self.derive(self.class(), url))
    }

    /// Follow the link named `name` to a new pending handle.
    pub fn link(&self, name: &str) -> Result<Resource> {
        let class = Arc::clone(self.class());
        let link = class
            .link(name)
            .ok_or_else(|| RestError::NoSuchAttribute {
                class: class.name().to_string(),
                name: name.to_string(),
            })?;
        let location = self.require_location()?;
        let path = match link.path() {
            Some(LinkPath::Static(path)) => path.clone(),
            Some(LinkPath::Computed(f)) => f(self)?,
            None => name.to_string(),
        };
        let target = link.target().resolve(&class)?;
        let (base, relative) = parse_location(&location)?;
        let url = base.join(&path)?;
        Ok(self.derive(&target, render_location(&url, relative)))
    }

    fn derive(&self, class: &Arc<ClassDef>, url: String) -> Resource {
        let mut derived = Resource::at(class, url);
        derived.transport = self.transport.clone();
        derived
    }

    /// Save the resource back to its location with `PUT`.
    pub fn put(&mut self) -> Result<()> {
        let url = self.require_location()?;
        let body = serde_json::to_vec(&self.to_json()?)?;
        let mut request = self.request(Method::Put, &url)?.body(body);
        request.headers.insert("content-type", self.content_type()?);
        if let Some(etag) = &self.etag {
            request.headers.insert("if-match", etag.clone());
        }

        let (response, content) = transport::dispatch(self.transport.as_ref(), &request)?;
        self.update_from_response(&url, &response, &content)
    }

    /// Add `other` to this resource with `POST`, updating `other` from the
    /// response.
    pub fn post(&self, other: &mut Resource) -> Result<()> {
        let url = self.require_location()?;
        let body = serde_json::to_vec(&other.to_json()?)?;
        let mut request = other.request(Method::Post, &url)?.body(body);
        request.headers.insert("content-type", other.content_type()?);

        let (response, content) = transport::dispatch(self.transport.as_ref(), &request)?;
        other.update_from_response(&url, &response, &content)?;
        if other.transport.is_none() {
            other.transport = self.transport.clone();
        }
        Ok(())
    }

    /// Delete the remote resource. The handle loses its location and etag.
    pub fn delete(&mut self) -> Result<()> {
        let url = self.require_location()?;
        let mut request = self.request(Method::Delete, &url)?;
        if let Some(etag) = &self.etag {
            request.headers.insert("if-match", etag.clone());
        }

        let (response, content) = transport::dispatch(self.transport.as_ref(), &request)?;
        let config = self.class().config()?;
        http::raise_for_response(
            self.class().name(),
            &url,
            &response,
            &content,
            &config.content_types(),
        )?;

        debug!(class = self.class().name(), url = %url, "Deleted resource");
        self.location = None;
        self.etag = None;
        Ok(())
    }

    /// A pending `HEAD` response for this resource.
    pub fn head(&self) -> Result<PromisedResponse> {
        self.promised(Method::Head)
    }

    /// A pending `OPTIONS` response for this resource.
    pub fn options(&self) -> Result<PromisedResponse> {
        self.promised(Method::Options)
    }

    fn promised(&self, method: Method) -> Result<PromisedResponse> {
        let config = self.class().config()?;
        Ok(PromisedResponse::new(
            method,
            self.location.clone(),
            http::request_headers(&config),
            self.transport.clone(),
        ))
    }

    /// Serializable copy of this handle's state. Does not deliver.
    pub fn snapshot(&self) -> Result<ResourceState> {
        Ok(ResourceState {
            object: self.object.snapshot()?,
            location: self.location.clone(),
            etag: self.etag.clone(),
            delivered: self.delivered,
        })
    }

    /// Rebuild a handle from a snapshot. The transport is not part of the
    /// snapshot; attach one with [`Resource::with_transport`].
    pub fn restore(registry: &Registry, state: &ResourceState) -> Result<Self> {
        let mut resource = Self::from_object(registry.restore(&state.object)?);
        resource.location = state.location.clone();
        resource.etag = state.etag.clone();
        resource.delivered = state.delivered;
        Ok(resource)
    }

    fn require_location(&self) -> Result<String> {
        self.location.clone().ok_or_else(|| RestError::NoLocation {
            class: self.class().name().to_string(),
        })
    }

    fn request(&self, method: Method, url: &str) -> Result<Request> {
        let config = self.class().config()?;
        let mut request = Request::new(method, url);
        request.headers = http::request_headers(&config);
        Ok(request)
    }

    fn content_type(&self) -> Result<String> {
        let config = self.class().config()?;
        Ok(config
            .content_types()
            .into_iter()
            .next()
            .unwrap_or_else(|| "application/json".to_string()))
    }
}

/// Placeholder origin for resolving relative locations.
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// How a relative location was written, so it can be written back the
/// same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relative {
    Rooted,
    Bare,
}

/// Parse a handle location. Locations without a scheme are resolved against
/// [`RELATIVE_BASE`] and rendered back without it.
fn parse_location(location: &str) -> Result<(Url, Option<Relative>)> {
    match Url::parse(location) {
        Ok(url) => Ok((url, None)),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let url = Url::parse(RELATIVE_BASE)?.join(location)?;
            let relative = if location.starts_with('/') {
                Relative::Rooted
            } else {
                Relative::Bare
            };
            Ok((url, Some(relative)))
        }
        Err(err) => Err(err.into()),
    }
}

fn render_location(url: &Url, relative: Option<Relative>) -> String {
    match relative {
        None => url.to_string(),
        Some(Relative::Rooted) => url[Position::BeforePath..].to_string(),
        Some(Relative::Bare) => url[Position::BeforePath..]
            .trim_start_matches('/')
            .to_string(),
    }
}

fn merge_query<I, K, V>(location: &str, params: I) -> Result<String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    let (mut url, relative) = parse_location(location)?;
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

    for (key, value) in params {
        let key = key.into();
        let value = value.to_string();
        match pairs.iter().position(|(k, _)| *k == key) {
            Some(pos) => {
                pairs[pos].1 = value;
                let mut seen = false;
                pairs.retain(|(k, _)| {
                    if *k != key {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => pairs.push((key, value)),
        }
    }

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs.iter());
    }
    Ok(render_location(&url, relative))
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location && self.object == other.object
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("class", &self.class().name())
            .field("location", &self.location)
            .field("state", &self.state())
            .field("etag", &self.etag)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::transport::{MemResponse, MemTransport};
    use serde_json::json;

    fn setup() -> (Registry, Arc<ClassDef>, Arc<MemTransport>) {
        let registry = Registry::new();
        let cls = registry
            .class("Post")
            .field("title", Field::json())
            .build();
        (registry, cls, Arc::new(MemTransport::new()))
    }

    #[test]
    fn states() {
        let (_registry, cls, _) = setup();
        assert_eq!(Resource::new(&cls).state(), DeliveryState::Unplaced);
        assert_eq!(
            Resource::at(&cls, "http://example.com/p").state(),
            DeliveryState::Pending
        );
    }

    #[test]
    fn unplaced_reads_do_not_deliver() {
        let (_registry, cls, transport) = setup();
        let mut post = Resource::new(&cls).with_transport(transport.clone());
        assert_eq!(post.get("title").unwrap(), None);
        assert_eq!(post.state(), DeliveryState::Unplaced);
        post.set("title", "local").unwrap();
        assert_eq!(post.state(), DeliveryState::Delivered);
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn deliver_errors_are_distinct() {
        let (_registry, cls, transport) = setup();
        let err = Resource::new(&cls).deliver().unwrap_err();
        assert!(matches!(err, RestError::NoLocation { .. }));

        transport.serve_json("http://example.com/p", &json!({"title": "Hi"}));
        let mut post = Resource::at(&cls, "http://example.com/p").with_transport(transport);
        post.deliver().unwrap();
        let err = post.deliver().unwrap_err();
        assert!(matches!(err, RestError::AlreadyDelivered { .. }));
    }

    #[test]
    fn undeclared_name_does_not_deliver() {
        let (_registry, cls, transport) = setup();
        let mut post =
            Resource::at(&cls, "http://example.com/p").with_transport(transport.clone());
        assert!(post.get("nope").is_err());
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn update_from_dict_marks_delivered() {
        let (_registry, cls, transport) = setup();
        let mut post =
            Resource::at(&cls, "http://example.com/p").with_transport(transport.clone());
        post.update_from_dict(&json!({"title": "Set"})).unwrap();
        assert!(post.is_delivered());
        assert_eq!(post.get("title").unwrap(), Some(&Value::from("Set")));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn requests_carry_accept_header() {
        let (_registry, cls, transport) = setup();
        transport.serve_json("http://example.com/p", &json!({}));
        let mut post =
            Resource::at(&cls, "http://example.com/p").with_transport(transport.clone());
        post.deliver().unwrap();
        let request = transport.last_request().unwrap();
        assert_eq!(request.headers.get("accept"), Some("application/json"));
    }

    #[test]
    fn content_location_moves_handle() {
        let (_registry, cls, transport) = setup();
        transport.route(
            Method::Get,
            "http://example.com/p",
            MemResponse::json(200, &json!({"title": "Hi"}))
                .header("Content-Location", "http://example.com/posts/1")
                .header("ETag", "\"v1\""),
        );
        let mut post = Resource::at(&cls, "http://example.com/p").with_transport(transport);
        post.deliver().unwrap();
        assert_eq!(post.location(), Some("http://example.com/posts/1"));
        assert_eq!(post.etag(), Some("\"v1\""));
    }

    #[test]
    fn merge_query_overwrites_and_appends() {
        assert_eq!(
            merge_query("http://example.com/p?a=1&b=2", [("a", "3"), ("c", "4")]).unwrap(),
            "http://example.com/p?a=3&b=2&c=4"
        );
        assert_eq!(
            merge_query("http://example.com/p?a=1&a=2", [("a", 5)]).unwrap(),
            "http://example.com/p?a=5"
        );
        assert_eq!(
            merge_query("http://example.com/p", Vec::<(String, String)>::new()).unwrap(),
            "http://example.com/p"
        );
    }

    #[test]
    fn relative_locations_stay_relative() {
        assert_eq!(
            merge_query("/posts?page=1", [("page", 2), ("tag", 7)]).unwrap(),
            "/posts?page=2&tag=7"
        );
        assert_eq!(merge_query("posts", [("q", "x")]).unwrap(), "posts?q=x");

        let (_registry, cls, _) = setup();
        let posts = Resource::at(&cls, "/blog/posts/").filter([("page", 1)]).unwrap();
        assert_eq!(posts.location(), Some("/blog/posts/?page=1"));
    }

    #[test]
    fn filter_requires_location() {
        let (_registry, cls, _) = setup();
        let err = Resource::new(&cls).filter([("a", 1)]).unwrap_err();
        assert!(matches!(err, RestError::NoLocation { .. }));
    }

    #[test]
    fn snapshot_round_trip() {
        let (registry, cls, _) = setup();
        let mut post = Resource::at(&cls, "http://example.com/p");
        post.update_from_dict(&json!({"title": "Hi", "extra": true})).unwrap();

        let state = post.snapshot().unwrap();
        let text = serde_json::to_string(&state).unwrap();
        let restored = Resource::restore(&registry, &serde_json::from_str(&text).unwrap()).unwrap();

        assert_eq!(restored, post);
        assert!(restored.is_delivered());
        assert_eq!(restored.location(), Some("http://example.com/p"));
    }
}
