//! JSON object handling for relayed frames.
//!
//! Only the `id` member is ever touched; every other member passes through
//! unchanged in both directions.

use serde_json::{Map, Value};

use crate::errors::MalformedRequest;
use crate::ids::{CorrelationId, RequestId};

/// A JSON object frame.
pub type JsonObject = Map<String, Value>;

/// Name of the correlated member.
pub const ID_FIELD: &str = "id";

/// Parse bytes as a single JSON object.
pub fn parse_object(bytes: &[u8]) -> Result<JsonObject, MalformedRequest> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(MalformedRequest::NotAnObject),
    }
}

/// A validated caller request.
#[derive(Debug, Clone)]
pub struct CallerRequest {
    /// The caller's id, type preserved.
    pub id: RequestId,
    /// The full request object, `id` included.
    pub body: JsonObject,
}

impl CallerRequest {
    /// Parse and validate a caller body.
    pub fn parse(bytes: &[u8]) -> Result<Self, MalformedRequest> {
        let body = parse_object(bytes)?;
        let id = RequestId::from_field(body.get(ID_FIELD))?;
        Ok(Self { id, body })
    }

    /// Serialize the request for upstream with `id` replaced by `correlation_id`.
    #[must_use]
    pub fn to_upstream_frame(&self, correlation_id: &CorrelationId) -> String {
        let mut body = self.body.clone();
        let _ = body.insert(ID_FIELD.to_owned(), correlation_id.to_value());
        Value::Object(body).to_string()
    }
}

/// Extract the correlation id from an upstream reply.
#[must_use]
pub fn correlation_id_of(frame: &JsonObject) -> Option<CorrelationId> {
    frame.get(ID_FIELD).and_then(CorrelationId::from_wire)
}

/// Put the caller's original id back into a reply.
pub fn restore_id(frame: &mut JsonObject, original: &RequestId) {
    let _ = frame.insert(ID_FIELD.to_owned(), original.to_value());
}
