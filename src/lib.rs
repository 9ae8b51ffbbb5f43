//! # Localplane
//!
//! Credential resolution and secrets infrastructure for a local HTTP
//! control plane. The library decides, per inbound request, who is calling
//! and what they may do, while sourcing the trusted credentials from up to
//! three competing origins (process environment, a persisted local store,
//! and a remote secret manager) and tolerating partial failure of any of
//! them.
//!
//! ## Core Components
//!
//! - **Token Registry**: merges and prioritizes credential sources into
//!   authoritative token records, with caching and weak-token detection
//! - **Permission Resolver**: role-based access control with override and
//!   fallback semantics
//! - **Secrets Provider**: one facade over a cloud secret manager and a
//!   Vault-compatible KV store, each with its own cache and single-flight
//!   de-duplication
//! - **Resilience Primitives**: retry with backoff and a circuit breaker
//!   for wrapping flaky external calls
//! - **Health Aggregator**: rolls per-component status into one report
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use localplane::auth::TokenRegistry;
//! use localplane::config::EnvSettingsSource;
//! use localplane::storage::MemoryConfigStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = TokenRegistry::new(
//!         Arc::new(EnvSettingsSource),
//!         Arc::new(MemoryConfigStore::new()),
//!     );
//!     if let Some(identity) = registry.verify("candidate-token").await {
//!         println!("caller role: {}", identity.role);
//!     }
//! }
//! ```

pub mod auth;
pub mod config;
pub mod errors;
pub mod observability;
pub mod resilience;
pub mod secrets;
pub mod storage;

// Re-export commonly used types and traits
pub use auth::{Identity, TokenRegistry};
pub use errors::{LocalplaneError, Result};
pub use observability::{HealthAggregator, HealthReport};
pub use secrets::SecretProvider;

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
