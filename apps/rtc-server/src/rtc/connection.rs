//! Per-connection state and the transport seam.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, OnceCell};

use rtc_common::id::{prefix, prefixed_ulid};

use crate::error::TransportError;
use crate::identity::{Identity, IdentityProvider};

use super::action::ActionCache;

/// Outbound half of a connection. Writes are fire-and-forget.
pub trait Transport: Send + Sync {
    fn write(&self, text: String) -> Result<(), TransportError>;
}

/// Transport that queues frames on an unbounded channel; the connection's
/// writer task drains the receiver into the socket.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn write(&self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }
}

/// State for a single live connection.
pub struct Connection {
    /// Stable identifier (`rtc_` prefixed ULID); clients echo it as `resource`.
    id: String,
    /// Credential presented on connect (a ticket), handed to the identity provider.
    credential: Option<String>,
    identity: OnceCell<Identity>,
    transport: Box<dyn Transport>,
    actions: ActionCache,
}

impl Connection {
    pub fn new(transport: impl Transport + 'static, credential: Option<String>) -> Self {
        Self::with_id(prefixed_ulid(prefix::CONNECTION), transport, credential)
    }

    pub fn with_id(
        id: impl Into<String>,
        transport: impl Transport + 'static,
        credential: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            credential,
            identity: OnceCell::new(),
            transport: Box::new(transport),
            actions: ActionCache::new(),
        }
    }

    /// Pre-resolve the identity so the provider is never consulted.
    pub fn with_identity(self, identity: Identity) -> Self {
        let _ = self.identity.set(identity);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn write(&self, text: String) -> Result<(), TransportError> {
        self.transport.write(text)
    }

    /// The connection's identity, resolved through `provider` on first use.
    /// A provider failure degrades to anonymous.
    pub async fn identity(&self, provider: &dyn IdentityProvider) -> &Identity {
        self.identity
            .get_or_init(|| async {
                match provider.resolve(self.credential.as_deref()).await {
                    Ok(identity) => identity,
                    Err(err) => {
                        tracing::warn!(connection_id = %self.id, %err, "identity resolution failed");
                        Identity::Anonymous
                    }
                }
            })
            .await
    }

    pub fn actions(&self) -> &ActionCache {
        &self.actions
    }
}

/// Live connections, keyed by id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.id().to_string(), connection);
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.remove(id).map(|(_, connection)| connection)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        async fn resolve(&self, credential: Option<&str>) -> Result<Identity, IdentityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(credential.map(Identity::user).unwrap_or_default())
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl IdentityProvider for BrokenProvider {
        async fn resolve(&self, _: Option<&str>) -> Result<Identity, IdentityError> {
            Err(IdentityError::Corrupt)
        }
    }

    #[test]
    fn generated_ids_are_prefixed() {
        let (transport, _rx) = ChannelTransport::new();
        let conn = Connection::new(transport, None);
        assert!(conn.id().starts_with("rtc_"));
    }

    #[tokio::test]
    async fn identity_is_resolved_once() {
        let (transport, _rx) = ChannelTransport::new();
        let conn = Connection::with_id("conn-1", transport, Some("U1".into()));
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };

        assert_eq!(conn.identity(&provider).await.user_id(), Some("U1"));
        assert_eq!(conn.identity(&provider).await.user_id(), Some("U1"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preset_identity_skips_provider() {
        let (transport, _rx) = ChannelTransport::new();
        let conn = Connection::with_id("conn-1", transport, None).with_identity(Identity::user("U9"));
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };

        assert_eq!(conn.identity(&provider).await.user_id(), Some("U9"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_failure_is_anonymous() {
        let (transport, _rx) = ChannelTransport::new();
        let conn = Connection::with_id("conn-1", transport, Some("x".into()));
        assert!(conn.identity(&BrokenProvider).await.is_anonymous());
    }

    #[test]
    fn write_after_receiver_dropped() {
        let (transport, rx) = ChannelTransport::new();
        let conn = Connection::with_id("conn-1", transport, None);
        assert!(conn.write("a".into()).is_ok());
        drop(rx);
        assert_eq!(conn.write("b".into()), Err(TransportError::Closed));
    }

    #[test]
    fn registry_tracks_connections() {
        let registry = ConnectionRegistry::new();
        let (transport, _rx) = ChannelTransport::new();
        let conn = Arc::new(Connection::with_id("conn-1", transport, None));

        registry.register(conn.clone());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("conn-1").is_some());

        assert!(registry.remove("conn-1").is_some());
        assert!(registry.is_empty());
        assert!(registry.remove("conn-1").is_none());
    }
}
