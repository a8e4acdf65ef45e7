pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod store;

use std::sync::Arc;

use config::Config;
use gateway::fanout::GatewayBroadcast;
use gateway::presence::PresenceManager;
use gateway::rooms::RoomRegistry;
use store::{MemorySessionStore, SessionStore};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn SessionStore>,
    pub presence: PresenceManager,
    pub broadcast: GatewayBroadcast,
}

impl AppState {
    /// Build a state with the in-memory session store.
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(MemorySessionStore::new()),
            presence: PresenceManager::new(Arc::new(RoomRegistry::new())),
            broadcast: GatewayBroadcast::new(),
        }
    }
}
