//! Error types for the dispatcher and its collaborators.
//!
//! Every failure is contained at the single-envelope boundary
//! (`Dispatcher::on_message`); these types exist so the failure can be logged
//! with context and asserted on in tests.

use std::fmt;

use thiserror::Error;

/// The capability a registered name provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    State,
    Action,
    Policy,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::State => "state generator",
            Capability::Action => "action",
            Capability::Policy => "broadcast policy",
        })
    }
}

/// Name resolution and registration failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("[{name}] isn't a registered name")]
    UnknownName { name: String },

    #[error("[{name}] is registered as {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: Capability,
        found: Capability,
    },

    #[error("[{name}] is already registered")]
    Duplicate { name: String },
}

/// A failure raised by a state generator, action or broadcast policy.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Outbound write failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection is closed")]
    Closed,
}

/// The handler call a [`HandlerError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Create,
    Initialize,
    Execute,
    ShouldBroadcast,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Create => "create",
            Stage::Initialize => "initialize",
            Stage::Execute => "execute",
            Stage::ShouldBroadcast => "should_broadcast",
        })
    }
}

/// Everything that can go wrong while dispatching one envelope.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{stage} failed: {source}")]
    Handler {
        stage: Stage,
        #[source]
        source: HandlerError,
    },

    #[error("failed to encode broadcast: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("write failed: {0}")]
    Write(#[from] TransportError),

    #[error("connection has disconnected")]
    ConnectionClosed,
}

impl DispatchError {
    pub fn handler(stage: Stage, source: HandlerError) -> Self {
        Self::Handler { stage, source }
    }

    /// Short machine-readable tag used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Malformed(_) => "malformed",
            DispatchError::Registry(RegistryError::UnknownName { .. }) => "unknown_name",
            DispatchError::Registry(RegistryError::TypeMismatch { .. }) => "type_mismatch",
            DispatchError::Registry(RegistryError::Duplicate { .. }) => "duplicate",
            DispatchError::Handler { .. } => "handler",
            DispatchError::Encode(_) => "encode",
            DispatchError::Write(_) => "write",
            DispatchError::ConnectionClosed => "closed",
        }
    }
}
