pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod rtc;
pub mod store;

use std::sync::Arc;

use config::Config;
use identity::TicketIdentityProvider;
use rtc::connection::ConnectionRegistry;
use rtc::hub::BroadcastHub;
use rtc::{Dispatcher, Registry};
use store::kv::{KeyValueStore, MemoryStore};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub hub: BroadcastHub,
    pub connections: Arc<ConnectionRegistry>,
    pub tickets: Arc<TicketIdentityProvider>,
}

impl AppState {
    /// Wire the dispatcher to an in-memory ticket store.
    pub fn new(config: Config, registry: Registry) -> Self {
        Self::with_hub(config, registry, BroadcastHub::new())
    }

    /// Like [`AppState::new`], with a hub created up front so registered
    /// actions can publish through it.
    pub fn with_hub(config: Config, registry: Registry, hub: BroadcastHub) -> Self {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let tickets = Arc::new(TicketIdentityProvider::new(kv));
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), tickets.clone()));

        Self {
            config: Arc::new(config),
            dispatcher,
            hub,
            connections: Arc::new(ConnectionRegistry::new()),
            tickets,
        }
    }
}
