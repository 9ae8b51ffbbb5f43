//! Secret payload schema.
//!
//! Remote secrets must deserialize to
//! `{ "tokens": [ { token | sha256, role, permissions? } ], "roles"?: { role: [perm] } }`.
//! Parsing is all-or-nothing: one malformed entry fails the whole load,
//! surfacing structured issues instead of skipping entries silently.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::token::normalize_digest;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPayload {
    tokens: Vec<RawTokenEntry>,
    #[serde(default)]
    roles: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTokenEntry {
    token: Option<String>,
    sha256: Option<String>,
    role: String,
    permissions: Option<Vec<String>>,
}

/// The credential half of one payload entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadCredential {
    Plaintext(String),
    /// Normalized lowercase hex digest.
    Sha256(String),
}

/// One validated payload entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadToken {
    pub credential: PayloadCredential,
    pub role: String,
    pub permissions: Option<Vec<String>>,
}

/// A fully validated secret payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecretPayload {
    pub tokens: Vec<PayloadToken>,
    pub roles: BTreeMap<String, Vec<String>>,
}

/// Tagged parse outcome: typed data, or the structural problems found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadParse {
    Valid(SecretPayload),
    Invalid { issues: Vec<String> },
}

/// Parse and structurally validate a raw secret payload.
pub fn parse_secret_payload(raw: &str) -> PayloadParse {
    let payload: RawPayload = match serde_json::from_str(raw) {
        Ok(payload) => payload,
        Err(e) => {
            return PayloadParse::Invalid { issues: vec![format!("payload is not valid: {e}")] }
        }
    };

    let mut issues = Vec::new();
    let mut tokens = Vec::with_capacity(payload.tokens.len());

    for (index, entry) in payload.tokens.into_iter().enumerate() {
        match validate_entry(index, entry) {
            Ok(token) => tokens.push(token),
            Err(issue) => issues.push(issue),
        }
    }

    if issues.is_empty() {
        PayloadParse::Valid(SecretPayload { tokens, roles: payload.roles })
    } else {
        PayloadParse::Invalid { issues }
    }
}

fn validate_entry(index: usize, entry: RawTokenEntry) -> Result<PayloadToken, String> {
    let credential = match (entry.token, entry.sha256) {
        (Some(token), None) => PayloadCredential::Plaintext(token),
        (None, Some(digest)) => match normalize_digest(&digest) {
            Some(normalized) => PayloadCredential::Sha256(normalized),
            None => {
                return Err(format!(
                    "tokens[{index}]: sha256 must be 64 hex characters (got length {})",
                    digest.len()
                ))
            }
        },
        (Some(_), Some(_)) => {
            return Err(format!("tokens[{index}]: token and sha256 are mutually exclusive"))
        }
        (None, None) => {
            return Err(format!("tokens[{index}]: requires exactly one of token or sha256"))
        }
    };

    Ok(PayloadToken { credential, role: entry.role, permissions: entry.permissions })
}
