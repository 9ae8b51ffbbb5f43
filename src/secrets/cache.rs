//! Per-backend secret value cache.
//!
//! A TTL map with two twists the backends rely on:
//! - **negative caching**: a failed or empty fetch is cached for
//!   `min(ttl, 30s)` so an unavailable backend is not hammered;
//! - **single-flight**: concurrent fetches for the same key share one
//!   underlying call. The first caller becomes the leader; followers wait on
//!   a watch channel and re-read the cache once the leader settles.
//!
//! Each backend instance owns its cache — nothing here is process-global.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

use super::error::{Result, SecretsError};

/// Cap applied to negative cache entries.
const NEGATIVE_TTL_CAP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
enum EntryKind {
    /// Backend returned a value.
    Value(String),
    /// Backend answered but the secret has no string payload.
    Missing,
    /// Backend failed; callers get `Unavailable` until the entry expires.
    Unavailable,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    kind: EntryKind,
    expires_at: Instant,
}

/// TTL cache with negative caching and single-flight de-duplication.
#[derive(Debug)]
pub struct SecretValueCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    inflight: Arc<Mutex<HashMap<String, watch::Receiver<()>>>>,
}

impl SecretValueCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Return the cached outcome for `key`, or run `fetch` exactly once
    /// across all concurrent callers and cache its result for `ttl`.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Option<String>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Option<String>>>,
    {
        loop {
            if let Some(outcome) = self.lookup(key).await {
                return outcome;
            }

            // Either join an in-flight call as a follower or become the
            // leader by parking a receiver other callers can wait on.
            let role = {
                let mut inflight = self.inflight.lock().await;
                match inflight.get(key) {
                    Some(rx) => FlightRole::Follower(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(());
                        inflight.insert(key.to_string(), rx);
                        FlightRole::Leader(tx)
                    }
                }
            };

            match role {
                FlightRole::Follower(mut rx) => {
                    debug!(key = %key, "Joining in-flight secret fetch");
                    // Err means the leader already settled and dropped its
                    // sender; either way, re-read the cache.
                    let _ = rx.changed().await;
                }
                FlightRole::Leader(tx) => {
                    let result = fetch().await;
                    let outcome = self.settle(key, ttl, result).await;
                    self.inflight.lock().await.remove(key);
                    // Dropping the sender wakes every waiting follower.
                    drop(tx);
                    return outcome;
                }
            }
        }
    }

    /// Drop every entry. Used by operators after rotating secrets.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of live entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn lookup(&self, key: &str) -> Option<Result<Option<String>>> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        let now = Instant::now();
        if entry.expires_at <= now {
            debug!(key = %key, "Secret cache entry expired");
            return None;
        }
        Some(match &entry.kind {
            EntryKind::Value(value) => {
                debug!(key = %key, "Secret cache hit");
                Ok(Some(value.clone()))
            }
            EntryKind::Missing => Ok(None),
            EntryKind::Unavailable => {
                let retry_after_secs = (entry.expires_at - now).as_secs().max(1);
                Err(SecretsError::unavailable("negative-cached backend failure", retry_after_secs))
            }
        })
    }

    async fn settle(
        &self,
        key: &str,
        ttl: Duration,
        result: Result<Option<String>>,
    ) -> Result<Option<String>> {
        let now = Instant::now();
        let negative_ttl = ttl.min(NEGATIVE_TTL_CAP);

        match result {
            Ok(Some(value)) => {
                self.insert(key, EntryKind::Value(value.clone()), now + ttl).await;
                Ok(Some(value))
            }
            Ok(None) => {
                self.insert(key, EntryKind::Missing, now + negative_ttl).await;
                Ok(None)
            }
            Err(SecretsError::Unavailable { message, retry_after_secs }) => {
                self.insert(key, EntryKind::Unavailable, now + negative_ttl).await;
                // The backend's own retry hint wins when it is shorter than
                // the negative-cache window.
                let retry_after = retry_after_secs.min(negative_ttl.as_secs()).max(1);
                Err(SecretsError::unavailable(message, retry_after))
            }
            // Configuration and unexpected errors are not cached: they need
            // operator action, not a cooldown.
            Err(other) => Err(other),
        }
    }

    async fn insert(&self, key: &str, kind: EntryKind, expires_at: Instant) {
        self.entries.write().await.insert(key.to_string(), CacheEntry { kind, expires_at });
    }
}

impl Default for SecretValueCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SecretValueCache {
    fn clone(&self) -> Self {
        Self { entries: Arc::clone(&self.entries), inflight: Arc::clone(&self.inflight) }
    }
}

enum FlightRole {
    Leader(watch::Sender<()>),
    Follower(watch::Receiver<()>),
}
