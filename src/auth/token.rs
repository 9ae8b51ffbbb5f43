//! Token records and credential matching.
//!
//! A [`TokenRecord`] is one authoritative credential: internally it is
//! always a SHA-256 digest, whether it was built from a plaintext token or
//! from a configured digest override. Matching hashes the candidate and
//! compares digests in constant time, so comparison cost never depends on
//! where the candidate diverges from the stored value.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;
use ring::constant_time::verify_slices_are_equal;
use sha2::{Digest, Sha256};

use crate::secrets::SecretString;
use super::permissions::Permission;

/// Minimum accepted plaintext token length.
pub const MIN_TOKEN_LENGTH: usize = 16;
/// Maximum accepted plaintext token length.
pub const MAX_TOKEN_LENGTH: usize = 256;

/// Fingerprints are a digest prefix, long enough to correlate log lines
/// and short enough to be useless for matching.
const FINGERPRINT_LENGTH: usize = 12;

lazy_static! {
    static ref TOKEN_CHARSET: Regex =
        Regex::new(r"^[A-Za-z0-9._~+/=-]+$").unwrap();
    static ref DIGEST_PATTERN: Regex = Regex::new(r"^[0-9a-f]{64}$").unwrap();
}

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenSource {
    Environment,
    PersistedStore,
    RemoteSecret,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSource::Environment => "environment",
            TokenSource::PersistedStore => "persisted-store",
            TokenSource::RemoteSecret => "remote-secret",
        }
    }
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a supplied credential was rejected as weak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenWeakness {
    /// Length outside the accepted bounds; carries the supplied length.
    Length(usize),
    /// Characters outside the URL-safe token alphabet.
    Charset,
}

/// Validate plaintext token strength: length bounds plus a restricted
/// URL-safe alphabet. The value itself is never logged, only its length.
pub fn validate_token_strength(token: &str) -> Result<(), TokenWeakness> {
    let len = token.len();
    if !(MIN_TOKEN_LENGTH..=MAX_TOKEN_LENGTH).contains(&len) {
        return Err(TokenWeakness::Length(len));
    }
    if !TOKEN_CHARSET.is_match(token) {
        return Err(TokenWeakness::Charset);
    }
    Ok(())
}

/// Case-fold and validate a configured SHA-256 digest. Returns the
/// normalized lowercase hex form, or `None` when malformed.
pub fn normalize_digest(digest: &str) -> Option<String> {
    let folded = digest.trim().to_ascii_lowercase();
    DIGEST_PATTERN.is_match(&folded).then_some(folded)
}

/// Lowercase hex SHA-256 of a value.
pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// One authoritative, matchable credential.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    /// Digest prefix safe for logs and audit trails.
    pub fingerprint: String,
    pub role: String,
    pub permissions: BTreeSet<Permission>,
    pub source: TokenSource,
    /// Present only when the plaintext may be surfaced back to a trusted
    /// local caller. Digest-only and remote-secret records never carry it.
    pub exposable_value: Option<SecretString>,
    digest: [u8; 32],
}

impl TokenRecord {
    /// Build a record from a plaintext token. The plaintext is retained
    /// only when `exposable` is set.
    pub fn from_plaintext(
        token: &str,
        role: impl Into<String>,
        permissions: BTreeSet<Permission>,
        source: TokenSource,
        exposable: bool,
    ) -> Self {
        let digest: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        Self {
            fingerprint: fingerprint_of(&digest),
            role: role.into(),
            permissions,
            source,
            exposable_value: exposable.then(|| SecretString::from(token)),
            digest,
        }
    }

    /// Build a record from a normalized digest (see [`normalize_digest`]).
    /// Returns `None` when the hex form does not decode to 32 bytes.
    pub fn from_digest_hex(
        digest_hex: &str,
        role: impl Into<String>,
        permissions: BTreeSet<Permission>,
        source: TokenSource,
    ) -> Option<Self> {
        let bytes = hex::decode(digest_hex).ok()?;
        let digest: [u8; 32] = bytes.try_into().ok()?;
        Some(Self {
            fingerprint: fingerprint_of(&digest),
            role: role.into(),
            permissions,
            source,
            exposable_value: None,
            digest,
        })
    }

    /// Constant-time candidate check. The candidate is hashed first, so
    /// both sides are fixed-width and the comparison never short-circuits
    /// on content.
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate_digest = Sha256::digest(candidate.as_bytes());
        verify_slices_are_equal(candidate_digest.as_slice(), &self.digest).is_ok()
    }
}

fn fingerprint_of(digest: &[u8; 32]) -> String {
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LENGTH);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions;

    fn admin_permissions() -> BTreeSet<Permission> {
        permissions::permission_universe()
    }

    #[test]
    fn test_strength_validation_bounds() {
        assert!(validate_token_strength("a".repeat(16).as_str()).is_ok());
        assert!(validate_token_strength("a".repeat(256).as_str()).is_ok());
        assert_eq!(
            validate_token_strength("short"),
            Err(TokenWeakness::Length(5))
        );
        assert_eq!(
            validate_token_strength("a".repeat(257).as_str()),
            Err(TokenWeakness::Length(257))
        );
    }

    #[test]
    fn test_strength_validation_charset() {
        assert!(validate_token_strength("abcDEF123._~+/=-").is_ok());
        assert_eq!(
            validate_token_strength("has spaces inside!"),
            Err(TokenWeakness::Charset)
        );
    }

    #[test]
    fn test_digest_normalization() {
        let upper = "A".repeat(64);
        assert_eq!(normalize_digest(&upper), Some("a".repeat(64)));
        assert_eq!(normalize_digest("a".repeat(63).as_str()), None);
        assert_eq!(normalize_digest("z".repeat(64).as_str()), None);
    }

    #[test]
    fn test_plaintext_record_matches_exact_value_only() {
        let record = TokenRecord::from_plaintext(
            "correct-horse-battery",
            "admin",
            admin_permissions(),
            TokenSource::Environment,
            true,
        );
        assert!(record.matches("correct-horse-battery"));
        assert!(!record.matches("correct-horse-batterz"));
        assert!(!record.matches("correct-horse-batter"));
        assert!(record.exposable_value.is_some());
    }

    #[test]
    fn test_digest_record_matches_preimage() {
        let plaintext = "A".repeat(64);
        let digest = sha256_hex(&plaintext);
        let record = TokenRecord::from_digest_hex(
            &digest,
            "admin",
            admin_permissions(),
            TokenSource::Environment,
        )
        .unwrap();
        assert!(record.matches(&plaintext));
        assert!(!record.matches("B".repeat(64).as_str()));
        assert!(record.exposable_value.is_none());
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = TokenRecord::from_plaintext(
            "correct-horse-battery",
            "admin",
            admin_permissions(),
            TokenSource::Environment,
            false,
        );
        let b = TokenRecord::from_plaintext(
            "correct-horse-battery",
            "observer",
            admin_permissions(),
            TokenSource::PersistedStore,
            false,
        );
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint.len(), 12);
        assert_ne!(a.fingerprint, sha256_hex("other"));
    }

    #[test]
    fn test_record_debug_never_prints_plaintext() {
        let record = TokenRecord::from_plaintext(
            "super-secret-token-value",
            "admin",
            admin_permissions(),
            TokenSource::Environment,
            true,
        );
        let rendered = format!("{:?}", record);
        assert!(!rendered.contains("super-secret-token-value"));
    }
}
