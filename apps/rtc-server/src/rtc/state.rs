//! State generators: turn inbound data into objects destined for broadcast.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::HandlerError;

use super::envelope::Payload;

/// An object produced by a state generator.
///
/// `kind` selects the broadcast policies the object fans out to (see
/// `RegistryBuilder::associate`); `data` is the payload relayed to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct StateObject {
    pub kind: String,
    pub data: Payload,
}

impl StateObject {
    pub fn new(kind: impl Into<String>, data: Payload) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Build from any value that serializes to a JSON object.
    pub fn from_serialize<T: Serialize>(kind: impl Into<String>, value: &T) -> Result<Self, HandlerError> {
        match serde_json::to_value(value)? {
            Value::Object(data) => Ok(Self::new(kind, data)),
            other => Err(HandlerError::new(format!(
                "state object must serialize to a JSON object, got {other}"
            ))),
        }
    }
}

/// Stateless-per-invocation generator. A fresh instance is created for every
/// envelope naming it.
#[async_trait]
pub trait StateGenerator: Send + Sync {
    async fn create(&self, data: Payload) -> Result<Vec<StateObject>, HandlerError>;
}
