//! Application state shared across all handlers.

use nd_core::NewsdeskConfig;
use nd_storage::{MemoryStore, Store, UpstashStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<NewsdeskConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: NewsdeskConfig) -> Self {
        Self { store, config: Arc::new(config), start_time: Instant::now() }
    }

    /// In-memory store with the given config.
    pub fn in_memory(config: NewsdeskConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Upstash when a REST url and token are configured, in-memory otherwise.
    pub fn from_config(config: NewsdeskConfig) -> Self {
        match UpstashStore::from_config(&config.store) {
            Some(store) => Self::new(Arc::new(store), config),
            None => {
                warn!("KV_REST_API_URL/KV_REST_API_TOKEN not set; using the in-memory store");
                Self::in_memory(config)
            }
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory(NewsdeskConfig::default())
    }
}
