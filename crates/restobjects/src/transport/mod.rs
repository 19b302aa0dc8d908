//! # Transport
//!
//! The object layer never speaks HTTP itself. It builds a [`Request`] and
//! hands it to a [`Transport`], which returns the [`Response`] head and the
//! raw body bytes. Interpreting the outcome (status mapping, location headers,
//! content checks) is done afterwards by [`crate::http`].
//!
//! ## Implementations
//!
//! - [`MemTransport`]: canned responses keyed by method and URI, with a
//!   request log. Always compiled; used throughout the test suite.
//! - `UreqTransport`: a blocking client over `ureq`, behind the `http`
//!   feature.
//!
//! ## Default Transport
//!
//! A resource without its own transport uses the process-wide default set
//! with [`set_default`]. With the `http` feature enabled an unset default
//! falls back to a `UreqTransport`; without it, requests fail with
//! [`crate::RestError::NoTransport`].

mod mem;
#[cfg(feature = "http")]
mod ureq_client;

pub use mem::{MemResponse, MemTransport};
#[cfg(feature = "http")]
pub use ureq_client::UreqTransport;

use crate::error::{RestError, Result};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// HTTP methods the object layer issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive header map. Names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Builder-style [`Headers::insert`].
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub uri: String,
    pub method: Method,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            method,
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status line and headers of a response. The body travels separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: reason_phrase(status).to_string(),
            headers: Headers::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Canonical reason phrase for the statuses the object layer distinguishes.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        412 => "Precondition Failed",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Something that can carry a request to a server and bring back its answer.
///
/// Implementations return non-2xx statuses as ordinary responses; only a
/// failure to complete the exchange at all is an error.
pub trait Transport: Send + Sync {
    fn request(&self, request: &Request) -> Result<(Response, Vec<u8>)>;
}

static DEFAULT: Lazy<RwLock<Option<Arc<dyn Transport>>>> = Lazy::new(|| RwLock::new(None));

/// Install the process-wide default transport.
pub fn set_default(transport: Arc<dyn Transport>) {
    *DEFAULT.write().unwrap_or_else(PoisonError::into_inner) = Some(transport);
}

/// Remove the process-wide default transport.
pub fn clear_default() {
    *DEFAULT.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// The process-wide default transport, if one is available.
pub fn default_transport() -> Option<Arc<dyn Transport>> {
    if let Some(transport) = DEFAULT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return Some(Arc::clone(transport));
    }
    fallback()
}

/// Send `request` through `transport`, or through the default when `None`.
pub(crate) fn dispatch(
    transport: Option<&Arc<dyn Transport>>,
    request: &Request,
) -> Result<(Response, Vec<u8>)> {
    let transport = match transport {
        Some(t) => Arc::clone(t),
        None => default_transport().ok_or_else(|| RestError::NoTransport(request.uri.clone()))?,
    };
    debug!(method = %request.method, uri = %request.uri, "Sending request");
    transport.request(request)
}

#[cfg(feature = "http")]
fn fallback() -> Option<Arc<dyn Transport>> {
    let mut slot = DEFAULT.write().unwrap_or_else(PoisonError::into_inner);
    let transport = slot.get_or_insert_with(|| Arc::new(UreqTransport::new()) as Arc<dyn Transport>);
    Some(Arc::clone(transport))
}

#[cfg(not(feature = "http"))]
fn fallback() -> Option<Arc<dyn Transport>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive() {
        let headers = Headers::new()
            .with("Content-Type", "application/json")
            .with("ETag", "\"abc\"");
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("etag"), Some("\"abc\""));
        assert!(headers.contains("CONTENT-TYPE"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn request_builder() {
        let request = Request::new(Method::Put, "http://example.com/a")
            .header("If-Match", "\"v1\"")
            .body(b"{}".to_vec());
        assert_eq!(request.method.to_string(), "PUT");
        assert_eq!(request.headers.get("if-match"), Some("\"v1\""));
        assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn response_has_reason() {
        assert_eq!(Response::new(404).reason, "Not Found");
        assert_eq!(Response::new(299).reason, "");
    }
}
