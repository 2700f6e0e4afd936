pub mod action;
pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod envelope;
pub mod hub;
pub mod policies;
pub mod registry;
pub mod server;
pub mod state;

pub use action::Action;
pub use broadcast::{BroadcastPolicy, PolicyRef};
pub use connection::Connection;
pub use dispatcher::{Dispatcher, Outcome};
pub use envelope::{BroadcastMessage, Inbound, Payload};
pub use registry::{Registry, RegistryBuilder};
pub use state::{StateGenerator, StateObject};
