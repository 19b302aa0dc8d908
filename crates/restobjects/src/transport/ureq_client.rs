use super::{reason_phrase, Headers, Request, Response, Transport};
use crate::error::{RestError, Result};
use tracing::debug;
use ureq::http;
use ureq::Agent;

/// Blocking HTTP transport over a shared `ureq` agent.
///
/// Error statuses come back as ordinary responses so the object layer can
/// map them to its own error kinds.
pub struct UreqTransport {
    agent: Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }

    pub fn with_agent(agent: Agent) -> Self {
        Self { agent }
    }
}

fn transport_error(request: &Request, err: impl std::fmt::Display) -> RestError {
    RestError::Transport(format!("{} {}: {}", request.method, request.uri, err))
}

impl Transport for UreqTransport {
    fn request(&self, request: &Request) -> Result<(Response, Vec<u8>)> {
        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(request.uri.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        let result = match &request.body {
            Some(body) => builder
                .body(body.clone())
                .map_err(|e| transport_error(request, e))
                .and_then(|req| self.agent.run(req).map_err(|e| transport_error(request, e))),
            None => builder
                .body(())
                .map_err(|e| transport_error(request, e))
                .and_then(|req| self.agent.run(req).map_err(|e| transport_error(request, e))),
        };
        let mut response = result?;

        let status = response.status();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str(), value);
            }
        }
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| transport_error(request, e))?;

        debug!(
            method = %request.method,
            uri = %request.uri,
            status = status.as_u16(),
            bytes = body.len(),
            "Received response"
        );

        Ok((
            Response {
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .unwrap_or_else(|| reason_phrase(status.as_u16()))
                    .to_string(),
                headers,
            },
            body,
        ))
    }
}
