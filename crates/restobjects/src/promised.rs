//! A response to `HEAD` or `OPTIONS` that is only requested when read.

use crate::error::{RestError, Result};
use crate::transport::{self, Headers, Method, Request, Response, Transport};
use std::fmt;
use std::sync::Arc;

/// A lazily issued `HEAD` or `OPTIONS` request.
///
/// Built by [`crate::Resource::head`] and [`crate::Resource::options`]. The
/// first accessor call sends the request; later calls reuse the response.
/// Statuses are reported as-is, never turned into errors.
#[derive(Clone)]
pub struct PromisedResponse {
    method: Method,
    location: Option<String>,
    headers: Headers,
    transport: Option<Arc<dyn Transport>>,
    response: Option<Response>,
}

impl PromisedResponse {
    pub(crate) fn new(
        method: Method,
        location: Option<String>,
        headers: Headers,
        transport: Option<Arc<dyn Transport>>,
    ) -> Self {
        Self {
            method,
            location,
            headers,
            transport,
            response: None,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn is_delivered(&self) -> bool {
        self.response.is_some()
    }

    /// Send the request now.
    pub fn deliver(&mut self) -> Result<()> {
        if self.response.is_some() {
            return Err(RestError::AlreadyDelivered {
                class: "PromisedResponse".to_string(),
                location: self.location.clone().unwrap_or_default(),
            });
        }
        let url = self.location.clone().ok_or_else(|| RestError::NoLocation {
            class: "PromisedResponse".to_string(),
        })?;

        let mut request = Request::new(self.method, url);
        request.headers = self.headers.clone();
        let (response, _) = transport::dispatch(self.transport.as_ref(), &request)?;
        self.response = Some(response);
        Ok(())
    }

    /// The response, requesting it first if needed.
    pub fn response(&mut self) -> Result<&Response> {
        if self.response.is_none() {
            self.deliver()?;
        }
        self.response
            .as_ref()
            .ok_or_else(|| RestError::BadResponse(format!("No {} response", self.method)))
    }

    pub fn status(&mut self) -> Result<u16> {
        Ok(self.response()?.status)
    }

    pub fn header(&mut self, name: &str) -> Result<Option<String>> {
        Ok(self.response()?.headers.get(name).map(str::to_string))
    }

    /// True for a 2xx status.
    pub fn found(&mut self) -> Result<bool> {
        Ok((200..300).contains(&self.status()?))
    }

    /// True when the `Allow` header lists `DELETE`.
    pub fn can_delete(&mut self) -> Result<bool> {
        Ok(self
            .header("allow")?
            .is_some_and(|allow| allow.contains("DELETE")))
    }
}

impl fmt::Debug for PromisedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromisedResponse")
            .field("method", &self.method)
            .field("location", &self.location)
            .field("response", &self.response)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemResponse, MemTransport};

    fn promised(transport: &Arc<MemTransport>, method: Method) -> PromisedResponse {
        PromisedResponse::new(
            method,
            Some("http://example.com/p".to_string()),
            Headers::new(),
            Some(transport.clone() as Arc<dyn Transport>),
        )
    }

    #[test]
    fn head_is_lazy_and_single() {
        let transport = Arc::new(MemTransport::new());
        transport.route(Method::Head, "http://example.com/p", MemResponse::new(200));

        let mut head = promised(&transport, Method::Head);
        assert_eq!(transport.request_count(), 0);
        assert!(head.found().unwrap());
        assert_eq!(head.status().unwrap(), 200);
        assert_eq!(transport.request_count(), 1);
        assert_eq!(transport.last_request().unwrap().method, Method::Head);
    }

    #[test]
    fn missing_resource_is_not_found_not_error() {
        let transport = Arc::new(MemTransport::new());
        let mut head = promised(&transport, Method::Head);
        assert!(!head.found().unwrap());
    }

    #[test]
    fn options_reports_allow() {
        let transport = Arc::new(MemTransport::new());
        transport.route(
            Method::Options,
            "http://example.com/p",
            MemResponse::new(200).header("Allow", "GET, PUT, DELETE"),
        );
        let mut options = promised(&transport, Method::Options);
        assert!(options.can_delete().unwrap());
        assert!(options.deliver().unwrap_err().is_promise_error());
    }

    #[test]
    fn no_location_is_promise_error() {
        let mut head = PromisedResponse::new(Method::Head, None, Headers::new(), None);
        let err = head.status().unwrap_err();
        assert!(matches!(err, RestError::NoLocation { .. }));
    }
}
