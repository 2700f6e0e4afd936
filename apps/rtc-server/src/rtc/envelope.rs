//! Wire-format envelopes, inbound and outbound.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::broadcast::PolicyRef;

/// Opaque handler payload: the `data` object of an envelope.
pub type Payload = Map<String, Value>;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// A message received from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// The connection id the client believes it is talking to.
    pub resource: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<Payload>,
}

/// Where an envelope is routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    State(String),
    Action(String),
    None,
}

impl Envelope {
    /// Split into routing target and payload. A non-blank `state` wins over
    /// `action`.
    pub fn into_target(self) -> (Target, Payload) {
        let data = self.data.unwrap_or_default();
        let target = match (non_blank(self.state), non_blank(self.action)) {
            (Some(state), _) => Target::State(state),
            (None, Some(action)) => Target::Action(action),
            (None, None) => Target::None,
        };
        (target, data)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// A broadcast relayed to the client.
#[derive(Debug, Serialize)]
pub struct OutboundBroadcast<'a> {
    pub broadcast: &'a str,
    pub data: &'a Payload,
}

/// First frame on every connection, telling the client its resource id.
#[derive(Debug, Serialize)]
pub struct Hello<'a> {
    pub resource: &'a str,
}

// ---------------------------------------------------------------------------
// Server-originated input
// ---------------------------------------------------------------------------

/// A pre-built broadcast submitted by server-side code. It bypasses
/// envelope parsing and is only filtered by its policy.
#[derive(Clone)]
pub struct BroadcastMessage {
    pub policy: PolicyRef,
    pub data: Payload,
}

impl BroadcastMessage {
    pub fn new(policy: PolicyRef, data: Payload) -> Self {
        Self { policy, data }
    }
}

impl fmt::Debug for BroadcastMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastMessage")
            .field("policy", &self.policy.name())
            .field("data", &self.data)
            .finish()
    }
}

/// Everything the dispatcher accepts for one connection.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Raw text frame from the client.
    Text(String),
    Broadcast(Arc<BroadcastMessage>),
}

impl From<String> for Inbound {
    fn from(text: String) -> Self {
        Inbound::Text(text)
    }
}

impl From<&str> for Inbound {
    fn from(text: &str) -> Self {
        Inbound::Text(text.to_string())
    }
}
