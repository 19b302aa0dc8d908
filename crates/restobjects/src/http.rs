//! # Response Interpretation
//!
//! Turns a transport's raw answer into either an error kind or the inputs a
//! resource needs to update itself: a decoded body and a new location.
//!
//! ## Status Handling
//!
//! | Status | Outcome | Body expected | Location from |
//! |--------|---------|---------------|---------------|
//! | 200 | success | yes | `Content-Location`, else request URL |
//! | 201 | success | yes | `Location` (required) |
//! | 202, 204 | success | no | request URL |
//! | 301, 302 | success | yes | `Location` (required) |
//! | 304 | success | yes, unless empty | request URL |
//! | 400 | `RequestError` | | |
//! | 401 | `Unauthorized` | | |
//! | 403 | `Forbidden` | | |
//! | 404 | `NotFound` | | |
//! | 412 | `PreconditionFailed` | | |
//! | 500 | `ServerError` | | |
//! | other | `BadResponse` | | |
//!
//! A body-bearing success must carry one of the configured content types
//! (media type only; parameters such as `charset` are ignored).

use crate::config::RestConfig;
use crate::error::{RestError, Result};
use crate::transport::{Headers, Response};
use serde_json::Value as JsonValue;
use tracing::warn;

/// Whether a response with `status` carries a body to decode.
pub fn response_has_content(status: u16) -> Option<bool> {
    match status {
        200 | 201 | 301 | 302 | 304 => Some(true),
        202 | 204 => Some(false),
        _ => None,
    }
}

/// The header naming a resource's location after a `status` response, and
/// whether it is required.
pub fn location_header(status: u16) -> Option<(&'static str, bool)> {
    match status {
        200 => Some(("content-location", false)),
        201 | 301 | 302 => Some(("location", true)),
        _ => None,
    }
}

/// The media type of a `Content-Type` header value, without parameters.
pub fn media_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
}

/// Headers every request carries under `config`.
pub fn request_headers(config: &RestConfig) -> Headers {
    let mut headers = Headers::new().with("accept", config.accept_header());
    if let Some(agent) = &config.user_agent {
        headers.insert("user-agent", agent.clone());
    }
    headers
}

/// Whether a decodable body is present for this response.
pub(crate) fn expects_body(response: &Response, content: &[u8]) -> bool {
    match response_has_content(response.status) {
        Some(true) => !(response.status == 304 && content.is_empty()),
        _ => false,
    }
}

/// Fail with the error kind matching an unusable response.
pub fn raise_for_response(
    class: &str,
    url: &str,
    response: &Response,
    content: &[u8],
    content_types: &[String],
) -> Result<()> {
    let class = class.to_string();
    let url = url.to_string();
    match response.status {
        404 => return Err(RestError::NotFound { class, url }),
        401 => return Err(RestError::Unauthorized { class, url }),
        403 => return Err(RestError::Forbidden { class, url }),
        412 => return Err(RestError::PreconditionFailed { class, url }),
        400 | 500 => {
            let detail = response
                .headers
                .get("content-type")
                .filter(|ct| media_type(ct) == "text/plain")
                .map(|_| first_line(content));
            let status = response.status;
            let reason = response.reason.clone();
            return Err(if status == 400 {
                RestError::RequestError {
                    status,
                    reason,
                    class,
                    url,
                    detail,
                }
            } else {
                RestError::ServerError {
                    status,
                    reason,
                    class,
                    url,
                    detail,
                }
            });
        }
        _ => {}
    }

    if response_has_content(response.status).is_none() {
        return Err(RestError::BadResponse(format!(
            "Unexpected response requesting {} {}: {} {}",
            class, url, response.status, response.reason
        )));
    }

    if let Some((header, true)) = location_header(response.status) {
        if !response.headers.contains(header) {
            return Err(RestError::BadResponse(format!(
                "{:?} header missing from {} {} response requesting {} {}",
                header, response.status, response.reason, class, url
            )));
        }
    }

    if !expects_body(response, content) {
        return Ok(());
    }

    let content_type = response.headers.get("content-type").unwrap_or_default();
    if !content_types.iter().any(|t| t == media_type(content_type)) {
        return Err(RestError::BadResponse(format!(
            "Bad response fetching {} {}: content-type {} is not an expected type",
            class, url, content_type
        )));
    }
    Ok(())
}

/// The location a resource has after a successful response to a request
/// for `url`.
pub fn resolve_location(url: &str, response: &Response) -> Result<String> {
    match location_header(response.status) {
        None => Ok(url.to_string()),
        Some((header, required)) => match response.headers.get(header) {
            Some(location) => Ok(location.to_string()),
            None if !required => Ok(url.to_string()),
            None => Err(RestError::BadResponse(format!(
                "{:?} header missing from {} {} response",
                header, response.status, response.reason
            ))),
        },
    }
}

/// Decode a JSON body, recovering from invalid UTF-8 by substituting
/// replacement characters.
pub fn parse_body(content: &[u8]) -> Result<JsonValue> {
    match std::str::from_utf8(content) {
        Ok(text) => Ok(serde_json::from_str(text)?),
        Err(err) => {
            warn!(
                valid_up_to = err.valid_up_to(),
                "Response body is not valid UTF-8; decoding lossily"
            );
            Ok(serde_json::from_str(&String::from_utf8_lossy(content))?)
        }
    }
}

fn first_line(content: &[u8]) -> String {
    String::from_utf8_lossy(content)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string()
}
