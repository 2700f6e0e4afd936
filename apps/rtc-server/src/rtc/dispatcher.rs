//! Envelope dispatch: the entry point for everything a connection receives.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::error::{DispatchError, Stage};
use crate::identity::{Identity, IdentityProvider};

use super::broadcast::maybe_broadcast;
use super::connection::Connection;
use super::envelope::{Envelope, Inbound, Payload, Target};
use super::registry::Registry;

/// Why an envelope was dropped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// `resource` names a different connection (stale client state).
    ResourceMismatch,
    /// Neither `state` nor `action` was set.
    NoTarget,
}

/// What dispatching one inbound message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Server-originated broadcast, written or filtered out.
    Relayed { written: bool },
    /// State generator ran; `evaluated` policy checks led to `written` frames.
    /// `failed` counts policy or write failures, which don't stop the fan-out.
    State {
        objects: usize,
        evaluated: usize,
        written: usize,
        failed: usize,
    },
    Action { name: String, created: bool },
    Discarded(Discard),
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    identity: Arc<dyn IdentityProvider>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { registry, identity }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The connection's identity, resolved on first use.
    pub async fn identity<'a>(&self, connection: &'a Connection) -> &'a Identity {
        connection.identity(self.identity.as_ref()).await
    }

    /// Dispatch one inbound message, reporting failures to the caller.
    pub async fn handle(&self, connection: &Connection, inbound: Inbound) -> Result<Outcome, DispatchError> {
        let identity = self.identity(connection).await;

        let text = match inbound {
            Inbound::Broadcast(message) => {
                let written = maybe_broadcast(&message.policy, &message.data, identity, connection)?;
                return Ok(Outcome::Relayed { written });
            }
            Inbound::Text(text) => text,
        };

        let envelope: Envelope = serde_json::from_str(&text).map_err(DispatchError::Malformed)?;

        if envelope.resource != connection.id() {
            return Ok(Outcome::Discarded(Discard::ResourceMismatch));
        }

        match envelope.into_target() {
            (Target::State(name), data) => self.generate(&name, data, identity, connection).await,
            (Target::Action(name), data) => {
                let run = connection
                    .actions()
                    .execute(&name, identity, || self.registry.resolve_action(&name), data)
                    .await?;
                if run.created {
                    tracing::debug!(connection_id = %connection.id(), action = %name, "action created");
                }
                Ok(Outcome::Action {
                    name,
                    created: run.created,
                })
            }
            (Target::None, _) => Ok(Outcome::Discarded(Discard::NoTarget)),
        }
    }

    async fn generate(
        &self,
        name: &str,
        data: Payload,
        identity: &Identity,
        connection: &Connection,
    ) -> Result<Outcome, DispatchError> {
        let generator = self.registry.resolve_state(name)?;
        let objects = generator
            .create(data)
            .await
            .map_err(|source| DispatchError::handler(Stage::Create, source))?;

        let (mut evaluated, mut written, mut failed) = (0, 0, 0);
        for object in &objects {
            for policy in self.registry.policies_for(&object.kind) {
                evaluated += 1;
                match maybe_broadcast(policy, &object.data, identity, connection) {
                    Ok(true) => written += 1,
                    Ok(false) => {}
                    Err(err) => {
                        failed += 1;
                        tracing::warn!(
                            connection_id = %connection.id(),
                            state = %name,
                            kind = %object.kind,
                            policy = %policy.name(),
                            %err,
                            "broadcast failed"
                        );
                    }
                }
            }
        }

        Ok(Outcome::State {
            objects: objects.len(),
            evaluated,
            written,
            failed,
        })
    }

    /// Transport-facing boundary: dispatch, log, and swallow any failure
    /// (including a handler panic). The connection always stays open.
    pub async fn on_message(&self, connection: &Connection, inbound: Inbound) -> Option<Outcome> {
        match AssertUnwindSafe(self.handle(connection, inbound)).catch_unwind().await {
            Ok(Ok(outcome)) => {
                tracing::debug!(connection_id = %connection.id(), ?outcome, "envelope dispatched");
                Some(outcome)
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    kind = err.kind(),
                    %err,
                    "envelope dropped"
                );
                None
            }
            Err(_panic) => {
                tracing::error!(connection_id = %connection.id(), "handler panicked; envelope dropped");
                None
            }
        }
    }

    /// Destroy every action created for `connection`. Safe to call more than
    /// once; returns the number of actions destroyed by this call.
    pub async fn on_disconnect(&self, connection: &Connection) -> usize {
        let destroyed = connection.actions().close().await;
        tracing::debug!(connection_id = %connection.id(), destroyed, "connection actions destroyed");
        destroyed
    }
}
