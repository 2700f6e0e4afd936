//! Built-in broadcast policies.

use crate::error::HandlerError;
use crate::identity::Identity;

use super::broadcast::BroadcastPolicy;
use super::envelope::Payload;

pub const EVERYONE: &str = "everyone";
pub const AUTHENTICATED: &str = "authenticated";
pub const USER: &str = "user";

/// Relays to every connection.
pub struct EveryonePolicy;

impl BroadcastPolicy for EveryonePolicy {
    fn should_broadcast(&self, _data: &Payload, _identity: &Identity) -> Result<bool, HandlerError> {
        Ok(true)
    }
}

/// Relays to connections with a resolved user.
pub struct AuthenticatedPolicy;

impl BroadcastPolicy for AuthenticatedPolicy {
    fn should_broadcast(&self, _data: &Payload, identity: &Identity) -> Result<bool, HandlerError> {
        Ok(!identity.is_anonymous())
    }
}

/// Relays only to the user named by the payload's `user_id` field.
pub struct UserPolicy;

impl BroadcastPolicy for UserPolicy {
    fn should_broadcast(&self, data: &Payload, identity: &Identity) -> Result<bool, HandlerError> {
        let target = data
            .get("user_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerError::new("user broadcast without a user_id"))?;
        Ok(identity.user_id() == Some(target))
    }
}
