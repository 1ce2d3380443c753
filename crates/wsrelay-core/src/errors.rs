//! Error types for request parsing and upstream sends.

use thiserror::Error;

/// A caller body that cannot be relayed.
///
/// Always maps to `400 Bad Request`; nothing is registered or sent.
#[derive(Debug, Error)]
pub enum MalformedRequest {
    /// Body is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// Body is valid JSON but not an object.
    #[error("request body must be a JSON object")]
    NotAnObject,
    /// The `id` field is absent, `null`, or an empty string.
    #[error("request id is missing or empty")]
    MissingId,
    /// The `id` field is neither a number nor a string.
    #[error("request id must be a number or a string")]
    InvalidId,
}

/// Failure to hand a frame to the upstream session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// The session task has exited; no further frames can be written.
    #[error("upstream session closed")]
    Closed,
    /// The socket write itself failed.
    #[error("upstream write failed: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_json_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: MalformedRequest = json_err.into();
        assert!(matches!(err, MalformedRequest::InvalidJson(_)));
        assert!(err.to_string().starts_with("invalid JSON"));
    }

    #[test]
    fn missing_id_display() {
        assert_eq!(
            MalformedRequest::MissingId.to_string(),
            "request id is missing or empty"
        );
    }

    #[test]
    fn send_error_display() {
        assert_eq!(SendError::Closed.to_string(), "upstream session closed");
        let err = SendError::Io("broken pipe".into());
        assert!(err.to_string().contains("broken pipe"));
    }
}
