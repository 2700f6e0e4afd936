//! Connection-scoped actions and the per-connection action cache.
//!
//! Each connection holds at most one instance per action name. The instance
//! is created and initialized on the first envelope naming it, reused for
//! every later envelope, and destroyed exactly once when the connection
//! goes away.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{DispatchError, HandlerError, RegistryError, Stage};
use crate::identity::Identity;

use super::envelope::Payload;

/// A stateful handler bound to one connection.
#[async_trait]
pub trait Action: Send {
    /// Called once, before the first `execute`.
    async fn initialize(&mut self, identity: &Identity) -> Result<(), HandlerError>;

    async fn execute(&mut self, data: Payload) -> Result<(), HandlerError>;

    /// Called once, after the connection disconnects.
    async fn destroy(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }
}

enum Slot {
    /// Reserved; no instance yet.
    Vacant,
    Ready(Box<dyn Action>),
    /// Destroyed on disconnect. Terminal.
    Retired,
    /// Removed from the map after a failed create or initialize.
    Discarded,
}

#[derive(Default)]
struct CacheState {
    closed: bool,
    slots: HashMap<String, Arc<AsyncMutex<Slot>>>,
}

/// Result of running one envelope through the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionRun {
    /// Whether this call created (and initialized) the instance.
    pub created: bool,
}

/// Per-connection map of action name → instance.
///
/// The map itself is guarded by a `parking_lot::Mutex` that is never held
/// across an await. Each slot has its own async mutex, held for the whole
/// create/initialize/execute (or destroy) sequence, so envelopes for the same
/// action serialize while different actions run independently.
#[derive(Default)]
pub struct ActionCache {
    inner: Mutex<CacheState>,
}

impl ActionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up (or create via `create`, then initialize with `identity`) the
    /// action `name`, and execute it with `data`.
    ///
    /// When `create` or `initialize` fails nothing stays in the cache; the
    /// next envelope tries again. An instance whose `execute` fails stays
    /// cached.
    pub async fn execute<F>(
        &self,
        name: &str,
        identity: &Identity,
        create: F,
        data: Payload,
    ) -> Result<ActionRun, DispatchError>
    where
        F: FnOnce() -> Result<Box<dyn Action>, RegistryError>,
    {
        loop {
            let entry = {
                let mut state = self.inner.lock();
                if state.closed {
                    return Err(DispatchError::ConnectionClosed);
                }
                state
                    .slots
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(Slot::Vacant)))
                    .clone()
            };

            let mut slot = entry.lock().await;

            let created = match *slot {
                // Released by a failed create after we cloned it; reserve again.
                Slot::Discarded => continue,
                Slot::Vacant => true,
                Slot::Ready(_) | Slot::Retired => false,
            };

            if created {
                match Self::create_and_initialize(create, identity).await {
                    Ok(action) => *slot = Slot::Ready(action),
                    Err(err) => {
                        *slot = Slot::Discarded;
                        self.release(name, &entry);
                        return Err(err);
                    }
                }
            }

            match &mut *slot {
                Slot::Ready(action) => action
                    .execute(data)
                    .await
                    .map_err(|source| DispatchError::handler(Stage::Execute, source))?,
                Slot::Vacant | Slot::Retired | Slot::Discarded => {
                    return Err(DispatchError::ConnectionClosed)
                }
            }

            return Ok(ActionRun { created });
        }
    }

    async fn create_and_initialize<F>(create: F, identity: &Identity) -> Result<Box<dyn Action>, DispatchError>
    where
        F: FnOnce() -> Result<Box<dyn Action>, RegistryError>,
    {
        let mut action = create()?;
        action
            .initialize(identity)
            .await
            .map_err(|source| DispatchError::handler(Stage::Initialize, source))?;
        Ok(action)
    }

    /// Drop the map entry for `name` if it still points at `slot`.
    fn release(&self, name: &str, slot: &Arc<AsyncMutex<Slot>>) {
        let mut state = self.inner.lock();
        if state.slots.get(name).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            state.slots.remove(name);
        }
    }

    /// Close the cache and destroy every created action. Waits for any
    /// in-flight `execute` on an action before destroying it.
    ///
    /// Returns the number of actions destroyed; calling again returns 0.
    pub async fn close(&self) -> usize {
        let slots = {
            let mut state = self.inner.lock();
            if state.closed {
                return 0;
            }
            state.closed = true;
            std::mem::take(&mut state.slots)
        };

        let mut destroyed = 0;
        for (name, slot) in slots {
            let mut slot = slot.lock().await;
            if let Slot::Ready(mut action) = std::mem::replace(&mut *slot, Slot::Retired) {
                if let Err(err) = action.destroy().await {
                    tracing::warn!(action = %name, %err, "action destroy failed");
                }
                destroyed += 1;
            }
        }
        destroyed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of action names with a live or pending instance.
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
