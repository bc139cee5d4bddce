//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::upload::UploadStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: UploadStore,
}

impl AppState {
    /// Create a new application state with an empty upload store
    pub fn new(config: Config) -> Self {
        let store = UploadStore::with_limits(config.limits.store_limits());
        Self::with_store(config, store)
    }

    /// Create state around an existing store
    pub fn with_store(config: Config, store: UploadStore) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, store }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the upload store
    pub fn store(&self) -> &UploadStore {
        &self.inner.store
    }
}
