use thiserror::Error;

/// Every failure the object layer can report.
///
/// Variants group into kinds: type errors raised while decoding or encoding a
/// field, promise errors raised by the delivery state machine, lookup errors
/// raised by the class registry, and HTTP outcome errors raised while
/// interpreting a response. Nothing here is retried or swallowed; the direct
/// caller always sees the first error.
#[derive(Error, Debug)]
pub enum RestError {
    #[error("Value to decode {value} is not a valid {expected}")]
    Decode { value: String, expected: String },

    #[error("Value to encode {value} is not a valid {expected}")]
    Encode { value: String, expected: String },

    #[error("Value {value} is not expected value {expected}")]
    ConstantMismatch { value: String, expected: String },

    #[error("{class} instance has no such attribute {name:?}")]
    NoSuchAttribute { class: String, name: String },

    #[error("{class} instance at {location} has already been delivered")]
    AlreadyDelivered { class: String, location: String },

    #[error("{class} instance has no URL from which to request")]
    NoLocation { class: String },

    #[error("No class registered with name {0:?}")]
    ClassNotFound(String),

    #[error("No such subclass of {class} with field {field:?} equivalent to {value}")]
    NoSubclass {
        class: String,
        field: String,
        value: String,
    },

    #[error("No such {class} {url}")]
    NotFound { class: String, url: String },

    #[error("Not authorized to fetch {class} {url}")]
    Unauthorized { class: String, url: String },

    #[error("Forbidden from fetching {class} {url}")]
    Forbidden { class: String, url: String },

    #[error("Precondition failed for {class} request to {url}")]
    PreconditionFailed { class: String, url: String },

    #[error("{status} {reason} requesting {class} {url}{}", detail_suffix(.detail))]
    RequestError {
        status: u16,
        reason: String,
        class: String,
        url: String,
        detail: Option<String>,
    },

    #[error("{status} {reason} requesting {class} {url}{}", detail_suffix(.detail))]
    ServerError {
        status: u16,
        reason: String,
        class: String,
        url: String,
        detail: Option<String>,
    },

    #[error("Bad response: {0}")]
    BadResponse(String),

    #[error("Invalid slice: stop {stop} is before start {start}")]
    InvalidSlice { start: usize, stop: usize },

    #[error("No transport available to request {0}")]
    NoTransport(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Config error: {0}")]
    Config(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(": {}", d),
        None => String::new(),
    }
}

impl RestError {
    /// True for errors raised because a value did not fit its field.
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            RestError::Decode { .. } | RestError::Encode { .. } | RestError::ConstantMismatch { .. }
        )
    }

    /// True for errors raised by the delivery state machine.
    pub fn is_promise_error(&self) -> bool {
        matches!(
            self,
            RestError::AlreadyDelivered { .. } | RestError::NoLocation { .. }
        )
    }

    /// True for registry lookup failures.
    pub fn is_lookup_error(&self) -> bool {
        matches!(self, RestError::ClassNotFound(_) | RestError::NoSubclass { .. })
    }

    pub(crate) fn decode(value: &serde_json::Value, expected: impl Into<String>) -> Self {
        RestError::Decode {
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    pub(crate) fn encode(value: impl std::fmt::Debug, expected: impl Into<String>) -> Self {
        RestError::Encode {
            value: format!("{:?}", value),
            expected: expected.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RestError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_error_names_value_and_expectation() {
        let err = RestError::decode(&json!("soon"), "timestamp in format %Y-%m-%dT%H:%M:%SZ");
        let msg = err.to_string();
        assert!(msg.contains("\"soon\""));
        assert!(msg.contains("%Y-%m-%dT%H:%M:%SZ"));
        assert!(err.is_type_error());
    }

    #[test]
    fn promise_kinds_are_distinct() {
        let delivered = RestError::AlreadyDelivered {
            class: "Post".into(),
            location: "http://example.com/p".into(),
        };
        let unplaced = RestError::NoLocation {
            class: "Post".into(),
        };
        assert!(delivered.is_promise_error());
        assert!(unplaced.is_promise_error());
        assert!(matches!(delivered, RestError::AlreadyDelivered { .. }));
        assert!(matches!(unplaced, RestError::NoLocation { .. }));
    }

    #[test]
    fn request_error_includes_detail_line() {
        let err = RestError::RequestError {
            status: 400,
            reason: "Bad Request".into(),
            class: "Post".into(),
            url: "http://example.com/p".into(),
            detail: Some("title is required".into()),
        };
        assert_eq!(
            err.to_string(),
            "400 Bad Request requesting Post http://example.com/p: title is required"
        );
    }

    #[test]
    fn lookup_kinds() {
        assert!(RestError::ClassNotFound("Nope".into()).is_lookup_error());
        assert!(!RestError::BadResponse("x".into()).is_lookup_error());
    }
}
