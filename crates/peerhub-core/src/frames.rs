//! JSON wire frames exchanged over an upgraded session.
//!
//! The protocol is deliberately loose: a *request frame* is any JSON object
//! that names a target fingerprint; the broker routes it to the target's
//! session without interpreting the remaining fields. A *status frame* is the
//! broker's push in the other direction, carrying a numeric code and a
//! human-readable description:
//!
//! ```json
//! {"status_code": 401, "description": "peer exists with different properties"}
//! ```
//!
//! # Trusted source fields
//!
//! Before a request frame is forwarded to the hub, the session injects
//! `source_fp` and `source_name` describing the *sender*. These fields are
//! never accepted from the remote client: [`RequestFrame::inject_source`]
//! overwrites whatever the client supplied, so a receiver can rely on them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field naming the target fingerprint of a request frame.
pub const TARGET_FIELD: &str = "target";
/// Trusted field carrying the sender's fingerprint; injected by the session.
pub const SOURCE_FP_FIELD: &str = "source_fp";
/// Trusted field carrying the sender's display name; injected by the session.
pub const SOURCE_NAME_FIELD: &str = "source_name";

/// Error type for inbound frame parsing.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
}

/// A client-sent request frame: a JSON object addressed to a fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    fields: Map<String, Value>,
}

impl RequestFrame {
    /// Parses a text frame into a request.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Malformed`] for invalid JSON and
    /// [`FrameError::NotAnObject`] for any JSON value that is not an object.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(FrameError::NotAnObject),
        }
    }

    /// The target fingerprint this frame addresses, when present as a string.
    pub fn target(&self) -> Option<&str> {
        self.fields.get(TARGET_FIELD).and_then(Value::as_str)
    }

    /// The trusted sender fingerprint, present after injection.
    pub fn source_fp(&self) -> Option<&str> {
        self.fields.get(SOURCE_FP_FIELD).and_then(Value::as_str)
    }

    /// Overwrites the trusted source fields with the session's own identity.
    pub fn inject_source(&mut self, fingerprint: &str, name: &str) {
        self.fields
            .insert(SOURCE_FP_FIELD.to_string(), Value::String(fingerprint.to_string()));
        self.fields
            .insert(SOURCE_NAME_FIELD.to_string(), Value::String(name.to_string()));
    }

    /// Returns an arbitrary field by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Consumes the frame into a JSON value ready for delivery.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Broker-pushed status frame describing the state of a session or the fate
/// of a routed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFrame {
    pub status_code: u16,
    pub description: String,
}

impl StatusFrame {
    pub fn new(status_code: u16, description: impl Into<String>) -> Self {
        Self {
            status_code,
            description: description.into(),
        }
    }

    /// Serializes the frame into the JSON value the write task sends.
    pub fn to_value(&self) -> Value {
        // A two-field struct cannot fail to serialize.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
