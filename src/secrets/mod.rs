//! Secrets infrastructure for the token registry.
//!
//! Two remote backends — AWS Secrets Manager and a Vault-compatible KV
//! store — sit behind the [`SecretProvider`] facade. Each backend owns its
//! value cache with single-flight de-duplication and negative caching;
//! the facade normalizes errors and records failure metrics.

pub mod aws;
pub mod cache;
pub mod error;
pub mod provider;
pub mod types;
pub mod vault;

pub use aws::AwsSecretsBackend;
pub use cache::SecretValueCache;
pub use error::{Result, SecretsError};
pub use provider::SecretProvider;
pub use types::SecretString;
pub use vault::VaultBackend;
