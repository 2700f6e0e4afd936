//! Broadcast policies and the filter/writer pair.

use std::sync::Arc;

use crate::error::{DispatchError, HandlerError, Stage};
use crate::identity::Identity;

use super::connection::Connection;
use super::envelope::{OutboundBroadcast, Payload};

/// Decides whether a payload is relayed to a given identity.
///
/// Policies are shared across connections and must not keep per-decision
/// state.
pub trait BroadcastPolicy: Send + Sync + 'static {
    fn should_broadcast(&self, data: &Payload, identity: &Identity) -> Result<bool, HandlerError>;
}

/// A policy together with the name it is registered under. The name is what
/// clients see in the outbound `broadcast` field.
#[derive(Clone)]
pub struct PolicyRef {
    name: Arc<str>,
    policy: Arc<dyn BroadcastPolicy>,
}

impl PolicyRef {
    pub fn new(name: impl Into<Arc<str>>, policy: impl BroadcastPolicy) -> Self {
        Self {
            name: name.into(),
            policy: Arc::new(policy),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn should_broadcast(&self, data: &Payload, identity: &Identity) -> Result<bool, HandlerError> {
        self.policy.should_broadcast(data, identity)
    }
}

/// Relay `data` to `connection` if `policy` allows it for `identity`.
///
/// Returns whether a frame was written.
pub fn maybe_broadcast(
    policy: &PolicyRef,
    data: &Payload,
    identity: &Identity,
    connection: &Connection,
) -> Result<bool, DispatchError> {
    let allowed = policy
        .should_broadcast(data, identity)
        .map_err(|source| DispatchError::handler(Stage::ShouldBroadcast, source))?;

    if !allowed {
        return Ok(false);
    }

    write_broadcast(policy.name(), data, connection)?;
    Ok(true)
}

/// Serialize `{broadcast, data}` and hand it to the connection's transport.
pub fn write_broadcast(
    policy_name: &str,
    data: &Payload,
    connection: &Connection,
) -> Result<(), DispatchError> {
    let text = serde_json::to_string(&OutboundBroadcast {
        broadcast: policy_name,
        data,
    })
    .map_err(DispatchError::Encode)?;
    connection.write(text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtc::connection::ChannelTransport;
    use serde_json::{json, Value};

    struct Fixed(bool);

    impl BroadcastPolicy for Fixed {
        fn should_broadcast(&self, _: &Payload, _: &Identity) -> Result<bool, HandlerError> {
            Ok(self.0)
        }
    }

    struct Failing;

    impl BroadcastPolicy for Failing {
        fn should_broadcast(&self, _: &Payload, _: &Identity) -> Result<bool, HandlerError> {
            Err(HandlerError::new("policy exploded"))
        }
    }

    fn payload() -> Payload {
        let mut data = Payload::new();
        data.insert("comment".into(), json!("hi"));
        data
    }

    #[test]
    fn writes_when_policy_allows() {
        let (transport, mut rx) = ChannelTransport::new();
        let conn = Connection::with_id("conn-1", transport, None);

        let written = maybe_broadcast(
            &PolicyRef::new("P", Fixed(true)),
            &payload(),
            &Identity::Anonymous,
            &conn,
        )
        .unwrap();
        assert!(written);

        let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame, json!({ "broadcast": "P", "data": { "comment": "hi" } }));
    }

    #[test]
    fn skips_when_policy_refuses() {
        let (transport, mut rx) = ChannelTransport::new();
        let conn = Connection::with_id("conn-1", transport, None);

        let written = maybe_broadcast(
            &PolicyRef::new("P", Fixed(false)),
            &payload(),
            &Identity::Anonymous,
            &conn,
        )
        .unwrap();
        assert!(!written);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn policy_failure_is_reported_not_written() {
        let (transport, mut rx) = ChannelTransport::new();
        let conn = Connection::with_id("conn-1", transport, None);

        let err = maybe_broadcast(
            &PolicyRef::new("P", Failing),
            &payload(),
            &Identity::Anonymous,
            &conn,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Handler {
                stage: Stage::ShouldBroadcast,
                ..
            }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn write_to_closed_connection_fails() {
        let (transport, rx) = ChannelTransport::new();
        let conn = Connection::with_id("conn-1", transport, None);
        drop(rx);

        let err = write_broadcast("P", &payload(), &conn).unwrap_err();
        assert_eq!(err.kind(), "write");
    }
}
