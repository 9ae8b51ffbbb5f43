//! Role-based permission resolution.
//!
//! Pure functions, no I/O. Three built-in roles with fixed default sets;
//! unknown roles fall back to `observer` (least privilege), never to zero
//! permissions and never to `admin`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// The closed permission universe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Permission {
    #[serde(rename = "chat.completions")]
    ChatCompletions,
    #[serde(rename = "models.list")]
    ModelsList,
    #[serde(rename = "models.manage")]
    ModelsManage,
    #[serde(rename = "config.read")]
    ConfigRead,
    #[serde(rename = "config.write")]
    ConfigWrite,
    #[serde(rename = "health.read")]
    HealthRead,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ChatCompletions => "chat.completions",
            Permission::ModelsList => "models.list",
            Permission::ModelsManage => "models.manage",
            Permission::ConfigRead => "config.read",
            Permission::ConfigWrite => "config.write",
            Permission::HealthRead => "health.read",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "chat.completions" => Some(Permission::ChatCompletions),
            "models.list" => Some(Permission::ModelsList),
            "models.manage" => Some(Permission::ModelsManage),
            "config.read" => Some(Permission::ConfigRead),
            "config.write" => Some(Permission::ConfigWrite),
            "health.read" => Some(Permission::HealthRead),
            _ => None,
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wildcard permission string granting the whole universe.
pub const PERMISSION_WILDCARD: &str = "*";

/// Every known permission.
pub fn permission_universe() -> BTreeSet<Permission> {
    BTreeSet::from([
        Permission::ChatCompletions,
        Permission::ModelsList,
        Permission::ModelsManage,
        Permission::ConfigRead,
        Permission::ConfigWrite,
        Permission::HealthRead,
    ])
}

/// Default permission set for one of the built-in roles.
pub fn default_permissions(role: &str) -> Option<BTreeSet<Permission>> {
    match role {
        "admin" => Some(permission_universe()),
        "operator" => Some(BTreeSet::from([
            Permission::ChatCompletions,
            Permission::ModelsList,
            Permission::ModelsManage,
            Permission::HealthRead,
        ])),
        "observer" => Some(observer_permissions()),
        _ => None,
    }
}

fn observer_permissions() -> BTreeSet<Permission> {
    BTreeSet::from([Permission::ModelsList, Permission::HealthRead])
}

/// Outcome of one permission resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionResolution {
    pub permissions: BTreeSet<Permission>,
    /// Input strings that named no known permission. Logged, never
    /// silently dropped.
    pub unknown_permissions: Vec<String>,
    pub role_is_unknown: bool,
}

/// Resolve the permission set for `role`.
///
/// `role_overrides` (typically the `roles` map from a secret payload) wins
/// over built-in defaults; `explicit_permissions` are unioned in on top.
/// The returned set is never empty: an empty outcome falls back to the
/// `observer` defaults.
pub fn resolve(
    role: &str,
    role_overrides: Option<&BTreeMap<String, Vec<String>>>,
    explicit_permissions: Option<&[String]>,
) -> PermissionResolution {
    let mut unknown_permissions = Vec::new();
    let mut role_is_unknown = false;

    let mut permissions = match role_overrides.and_then(|overrides| overrides.get(role)) {
        Some(strings) => parse_permission_strings(strings, &mut unknown_permissions),
        None => match default_permissions(role) {
            Some(defaults) => defaults,
            None => {
                role_is_unknown = true;
                warn!(role = %role, "Unknown role, falling back to observer permissions");
                observer_permissions()
            }
        },
    };

    if let Some(explicit) = explicit_permissions {
        permissions.extend(parse_permission_strings(explicit, &mut unknown_permissions));
    }

    if !unknown_permissions.is_empty() {
        warn!(
            unknown = ?unknown_permissions,
            role = %role,
            "Ignoring unknown permission strings"
        );
    }

    if permissions.is_empty() {
        permissions = observer_permissions();
    }

    PermissionResolution { permissions, unknown_permissions, role_is_unknown }
}

fn parse_permission_strings(
    strings: &[String],
    unknown: &mut Vec<String>,
) -> BTreeSet<Permission> {
    let mut parsed = BTreeSet::new();
    for value in strings {
        if value == PERMISSION_WILDCARD {
            return permission_universe();
        }
        match Permission::parse(value) {
            Some(permission) => {
                parsed.insert(permission);
            }
            None => unknown.push(value.clone()),
        }
    }
    parsed
}
