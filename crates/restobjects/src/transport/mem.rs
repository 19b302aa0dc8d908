use super::{Method, Request, Response, Transport};
use crate::error::{RestError, Result};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A canned answer served by [`MemTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemResponse {
    pub response: Response,
    pub body: Vec<u8>,
}

impl MemResponse {
    pub fn new(status: u16) -> Self {
        Self {
            response: Response::new(status),
            body: Vec::new(),
        }
    }

    /// A JSON body with `content-type: application/json`.
    pub fn json(status: u16, body: &JsonValue) -> Self {
        Self {
            response: Response::new(status).header("content-type", "application/json"),
            body: body.to_string().into_bytes(),
        }
    }

    /// A plain-text body.
    pub fn text(status: u16, body: &str) -> Self {
        Self {
            response: Response::new(status).header("content-type", "text/plain"),
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.response.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

/// In-memory transport for testing.
///
/// Responses are routed by exact method and URI. A request with no route
/// gets a bare 404. Every request is recorded, in order, whether or not a
/// route matched.
#[derive(Default)]
pub struct MemTransport {
    routes: Mutex<HashMap<(Method, String), MemResponse>>,
    log: Mutex<Vec<Request>>,
    simulate_failure: AtomicBool,
}

impl MemTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for `method` requests to `uri`, replacing any
    /// earlier route.
    pub fn route(&self, method: Method, uri: impl Into<String>, response: MemResponse) {
        lock(&self.routes).insert((method, uri.into()), response);
    }

    /// Shorthand for a GET route answering 200 with a JSON body.
    pub fn serve_json(&self, uri: impl Into<String>, body: &JsonValue) {
        self.route(Method::Get, uri, MemResponse::json(200, body));
    }

    /// Make every subsequent request fail before reaching a route.
    pub fn set_simulate_failure(&self, simulate: bool) {
        self.simulate_failure.store(simulate, Ordering::SeqCst);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.log).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.log).len()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<Request> {
        lock(&self.log).last().cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport for MemTransport {
    fn request(&self, request: &Request) -> Result<(Response, Vec<u8>)> {
        lock(&self.log).push(request.clone());

        if self.simulate_failure.load(Ordering::SeqCst) {
            return Err(RestError::Transport(format!(
                "Simulated failure for {} {}",
                request.method, request.uri
            )));
        }

        let routes = lock(&self.routes);
        match routes.get(&(request.method, request.uri.clone())) {
            Some(canned) => Ok((canned.response.clone(), canned.body.clone())),
            None => Ok((Response::new(404), Vec::new())),
        }
    }
}
