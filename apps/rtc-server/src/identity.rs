//! Identity resolution for connections.
//!
//! Clients obtain a short-lived, single-use ticket out of band and present it
//! on the WebSocket upgrade (`/rtc?ticket=...`). The dispatcher resolves it
//! lazily, the first time an envelope needs the connection's identity.

use std::sync::Arc;

use async_trait::async_trait;
use rtc_common::id::{prefix, prefixed};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::kv::{KeyValueStore, KvError};

/// Ticket TTL in seconds.
pub const TICKET_TTL_SECS: u64 = 30;

/// The principal behind a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Identity {
    #[default]
    Anonymous,
    User {
        user_id: String,
    },
}

impl Identity {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::User {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::User { user_id } => Some(user_id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Store(#[from] KvError),

    #[error("corrupt ticket data")]
    Corrupt,
}

/// Resolves the identity behind a connection credential.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `credential` is whatever the client presented on connect, if anything.
    async fn resolve(&self, credential: Option<&str>) -> Result<Identity, IdentityError>;
}

/// Data stored alongside a ticket.
#[derive(Debug, Serialize, Deserialize)]
struct TicketData {
    user_id: String,
}

/// Ticket-based identity provider backed by a [`KeyValueStore`].
pub struct TicketIdentityProvider {
    kv: Arc<dyn KeyValueStore>,
}

impl TicketIdentityProvider {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Issue a single-use ticket for `user_id`.
    pub async fn issue_ticket(&self, user_id: &str) -> Result<String, IdentityError> {
        let ticket = generate_ticket();
        let value = serde_json::to_string(&TicketData {
            user_id: user_id.to_string(),
        })
        .map_err(|_| IdentityError::Corrupt)?;
        self.kv
            .set_ex(&ticket_key(&ticket), &value, TICKET_TTL_SECS)
            .await?;
        Ok(ticket)
    }
}

#[async_trait]
impl IdentityProvider for TicketIdentityProvider {
    async fn resolve(&self, credential: Option<&str>) -> Result<Identity, IdentityError> {
        let Some(ticket) = credential.filter(|t| !t.is_empty()) else {
            return Ok(Identity::Anonymous);
        };

        match self.kv.take(&ticket_key(ticket)).await? {
            Some(value) => {
                let data: TicketData =
                    serde_json::from_str(&value).map_err(|_| IdentityError::Corrupt)?;
                Ok(Identity::user(data.user_id))
            }
            None => Ok(Identity::Anonymous),
        }
    }
}

fn ticket_key(ticket: &str) -> String {
    format!("rtc:wst:{}", ticket)
}

/// Generate an opaque random ticket.
fn generate_ticket() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = [0u8; 32];
    rand::thread_rng().fill(&mut buf[..]);
    prefixed(prefix::TICKET, URL_SAFE_NO_PAD.encode(buf))
}
