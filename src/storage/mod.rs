//! # Config Store Seam
//!
//! The persisted configuration store is owned by the surrounding
//! application; this crate only consumes it through [`ConfigStore`]. The
//! token registry awaits [`ConfigStore::ready`] before trusting stored
//! values, and a store failure degrades — never aborts — a resolution pass.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::{LocalplaneError, Result};

/// Store key under which the generated API token is persisted.
pub const STORE_KEY_API_AUTH_TOKEN: &str = "api_auth_token";

/// Async key/value store with a readiness gate.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Resolves once the store is usable. Errors here mark the store source
    /// as unavailable for the current resolution pass.
    async fn ready(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
    fail_ready: Arc<RwLock<bool>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store.
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> =
            entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { entries: Arc::new(RwLock::new(map)), fail_ready: Arc::new(RwLock::new(false)) }
    }

    /// Make subsequent `ready()` calls fail, simulating an unavailable store.
    pub async fn set_ready_failure(&self, fail: bool) {
        *self.fail_ready.write().await = fail;
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn ready(&self) -> Result<()> {
        if *self.fail_ready.read().await {
            return Err(LocalplaneError::store("config store is not ready"));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
