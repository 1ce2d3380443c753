//! Caller ids, correlation ids, and correlation id generation.
//!
//! Callers pick their own JSON-RPC ids, which may collide across callers and
//! may be numbers or strings. The relay never forwards them. Each request is
//! instead tagged with a [`CorrelationId`] that is unique among in-flight
//! requests, and the caller's [`RequestId`] is restored on the way back.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use siphasher::sip::SipHasher13;

use crate::errors::MalformedRequest;

/// The caller's own id, with its JSON type preserved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// A numeric id, kept as the exact `serde_json::Number` received.
    Number(Number),
    /// A non-empty string id.
    String(String),
}

impl RequestId {
    /// Interpret the `id` field of a caller request.
    ///
    /// `None`, `null` and `""` are treated as missing. Booleans, arrays and
    /// objects are rejected.
    pub fn from_field(value: Option<&Value>) -> Result<Self, MalformedRequest> {
        match value {
            None | Some(Value::Null) => Err(MalformedRequest::MissingId),
            Some(Value::String(s)) if s.is_empty() => Err(MalformedRequest::MissingId),
            Some(Value::String(s)) => Ok(Self::String(s.clone())),
            Some(Value::Number(n)) => Ok(Self::Number(n.clone())),
            Some(_) => Err(MalformedRequest::InvalidId),
        }
    }

    /// Convert back into the JSON value the caller originally sent.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// Relay-assigned id substituted for the caller's id on the upstream leg.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create from an existing string value.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The JSON value written into outbound frames (always a string).
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }

    /// Read a correlation id back out of an upstream reply.
    ///
    /// Upstreams that coerce ids to integers are tolerated: an unsigned
    /// integer resolves to the same decimal key as the string form.
    #[must_use]
    pub fn from_wire(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => n.as_u64().map(|n| Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CorrelationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Generates correlation ids.
///
/// Each id is `SipHash-1-3(timestamp_nanos, sequence, caller)` rendered as a
/// decimal string. The timestamp is wall-clock nanoseconds at construction
/// plus monotonic elapsed time, so it never goes backwards. The sequence
/// number keeps ids distinct when the clock has not advanced between calls.
/// Hash keys are random per generator.
pub struct IdGenerator {
    key0: u64,
    key1: u64,
    epoch_nanos: u128,
    origin: Instant,
    sequence: AtomicU64,
}

impl IdGenerator {
    /// Create a generator with random hash keys.
    #[must_use]
    pub fn new() -> Self {
        Self::with_keys(rand::random(), rand::random())
    }

    /// Create a generator with fixed hash keys.
    #[must_use]
    pub fn with_keys(key0: u64, key1: u64) -> Self {
        let epoch_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self {
            key0,
            key1,
            epoch_nanos,
            origin: Instant::now(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Produce a fresh correlation id for a request from `caller`.
    ///
    /// `caller` is any caller-identifying string, typically the source
    /// network address.
    pub fn generate(&self, caller: &str) -> CorrelationId {
        let nanos = self.epoch_nanos + self.origin.elapsed().as_nanos();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        let mut hasher = SipHasher13::new_with_keys(self.key0, self.key1);
        hasher.write(&nanos.to_le_bytes());
        hasher.write_u64(sequence);
        hasher.write(caller.as_bytes());
        CorrelationId(hasher.finish().to_string())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
