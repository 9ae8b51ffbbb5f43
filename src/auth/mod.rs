//! API credential resolution.
//!
//! Token records, role-based permission resolution, the secret payload
//! schema, and the registry that merges credential origins into one
//! verifiable snapshot.

pub mod payload;
pub mod permissions;
pub mod registry;
pub mod token;

pub use payload::{parse_secret_payload, PayloadParse, SecretPayload};
pub use permissions::{Permission, PermissionResolution};
pub use registry::{
    Identity, RegistryIssue, SourceStatus, TokenRegistry, TokenRegistryResolution,
};
pub use token::{TokenRecord, TokenSource};
