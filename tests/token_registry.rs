//! End-to-end token registry resolution across all three credential
//! origins, driving the remote-secret path through a mock Vault server.

use std::sync::Arc;

use proptest::prelude::*;
use tracing_test::traced_test;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use localplane::auth::permissions::{self, Permission};
use localplane::auth::registry::{RegistryIssue, SourceStatus};
use localplane::auth::token::sha256_hex;
use localplane::auth::{TokenRegistry, TokenSource};
use localplane::config::{AuthSettings, StaticSettingsSource, VaultSettings};
use localplane::storage::{MemoryConfigStore, STORE_KEY_API_AUTH_TOKEN};

fn registry(settings: AuthSettings, store: MemoryConfigStore) -> TokenRegistry {
    TokenRegistry::new(Arc::new(StaticSettingsSource(settings)), Arc::new(store))
}

fn vault_settings(address: String) -> VaultSettings {
    VaultSettings {
        address,
        namespace: None,
        auth_method: Some("approle".into()),
        role_id: Some("registry-role".into()),
        secret_id: Some("registry-secret".into()),
        jwt_role: None,
        jwt: None,
        jwt_path: None,
        field: Some("token_payload".into()),
        cache_ttl_secs: None,
        renew_window_secs: None,
    }
}

async fn mount_vault(server: &MockServer, payload: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "auth": { "client_token": "vault-session-token", "lease_duration": 3600 }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/secret/api-tokens"))
        .and(header("X-Vault-Token", "vault-session-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "token_payload": payload.to_string() }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn digest_override_verifies_preimage_but_is_never_exposable() {
    let preimage = "A".repeat(64);
    let settings = AuthSettings {
        env_token_sha256: Some(sha256_hex(&preimage)),
        ..AuthSettings::default()
    };
    let registry = registry(settings, MemoryConfigStore::new());

    let identity = registry.verify(&preimage).await.expect("digest preimage must verify");
    assert_eq!(identity.role, "admin");
    assert_eq!(identity.source, TokenSource::Environment);
    assert_eq!(identity.permissions, permissions::permission_universe());

    assert!(registry.has_configured_api_tokens().await);
    assert_eq!(registry.get_exposable_token().await, None);
}

#[tokio::test]
async fn stored_token_is_exposable_and_carries_store_role() {
    let settings =
        AuthSettings { store_role: Some("operator".into()), ..AuthSettings::default() };
    let store =
        MemoryConfigStore::with_entries([(STORE_KEY_API_AUTH_TOKEN, "generated-local-token")]);
    let registry = registry(settings, store);

    let identity = registry.verify("generated-local-token").await.expect("stored token verifies");
    assert_eq!(identity.role, "operator");
    assert_eq!(identity.source, TokenSource::PersistedStore);
    assert!(identity.permissions.contains(&Permission::ChatCompletions));
    assert!(!identity.permissions.contains(&Permission::ConfigWrite));

    assert_eq!(registry.get_exposable_token().await.as_deref(), Some("generated-local-token"));
}

#[tokio::test]
async fn digest_override_suppresses_stored_token_entirely() {
    let settings = AuthSettings {
        env_token_sha256: Some(sha256_hex("env-digest-preimage-value")),
        ..AuthSettings::default()
    };
    let store =
        MemoryConfigStore::with_entries([(STORE_KEY_API_AUTH_TOKEN, "generated-local-token")]);
    let registry = registry(settings, store);

    // The stored token is discarded even though it is valid on its own.
    assert!(registry.verify("generated-local-token").await.is_none());
    assert!(registry.verify("env-digest-preimage-value").await.is_some());

    let resolution = registry.resolve().await;
    assert!(resolution.records.iter().all(|r| r.source == TokenSource::Environment));
    assert!(resolution.weak_sources.contains(&TokenSource::PersistedStore));
}

#[tokio::test]
async fn secret_payload_tokens_resolve_with_operator_defaults() {
    let server = MockServer::start().await;
    let plaintext = "remote-secret-token-value";
    mount_vault(
        &server,
        serde_json::json!({
            "tokens": [{ "sha256": sha256_hex(plaintext), "role": "operator" }]
        }),
    )
    .await;

    let settings = AuthSettings {
        secret_driver: Some("vault".into()),
        secret_id: Some("secret/api-tokens".into()),
        vault: Some(vault_settings(server.uri())),
        ..AuthSettings::default()
    };
    let registry = registry(settings, MemoryConfigStore::new());

    let identity = registry.verify(plaintext).await.expect("payload token verifies");
    assert_eq!(identity.role, "operator");
    assert_eq!(identity.source, TokenSource::RemoteSecret);
    assert_eq!(
        identity.permissions,
        permissions::default_permissions("operator").expect("built-in role")
    );

    let resolution = registry.resolve().await;
    assert_eq!(resolution.secret_status, SourceStatus::Ok);
    assert_eq!(resolution.secret_driver.map(|d| d.as_str()), Some("vault"));
    // Remote-secret tokens are never surfaced back.
    assert_eq!(registry.get_exposable_token().await, None);
}

#[tokio::test]
async fn payload_roles_map_overrides_builtin_defaults() {
    let server = MockServer::start().await;
    mount_vault(
        &server,
        serde_json::json!({
            "tokens": [{ "token": "ci-pipeline-token-value", "role": "ci" }],
            "roles": { "ci": ["models.list", "health.read"] }
        }),
    )
    .await;

    let settings = AuthSettings {
        secret_driver: Some("vault".into()),
        secret_id: Some("secret/api-tokens".into()),
        vault: Some(vault_settings(server.uri())),
        ..AuthSettings::default()
    };
    let registry = registry(settings, MemoryConfigStore::new());

    let identity = registry.verify("ci-pipeline-token-value").await.expect("payload token");
    assert_eq!(identity.role, "ci");
    let expected: std::collections::BTreeSet<Permission> =
        [Permission::ModelsList, Permission::HealthRead].into_iter().collect();
    assert_eq!(identity.permissions, expected);

    let resolution = registry.resolve().await;
    assert!(!resolution.issues.contains(&RegistryIssue::RoleUnknown));
}

#[tokio::test]
async fn malformed_payload_entry_discards_whole_secret_load() {
    let server = MockServer::start().await;
    mount_vault(
        &server,
        serde_json::json!({
            "tokens": [
                { "token": "good-remote-token-value", "role": "admin" },
                { "role": "admin" }
            ]
        }),
    )
    .await;

    let settings = AuthSettings {
        secret_driver: Some("vault".into()),
        secret_id: Some("secret/api-tokens".into()),
        vault: Some(vault_settings(server.uri())),
        ..AuthSettings::default()
    };
    let registry = registry(settings, MemoryConfigStore::new());

    let resolution = registry.resolve().await;
    assert_eq!(resolution.secret_status, SourceStatus::Error);
    assert!(resolution.issues.contains(&RegistryIssue::SecretUnavailable));
    // The well-formed entry is not salvaged.
    assert!(registry.verify("good-remote-token-value").await.is_none());
}

#[tokio::test]
async fn vault_outage_degrades_secret_source_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let settings = AuthSettings {
        env_token: Some("environment-token-value".into()),
        secret_driver: Some("vault".into()),
        secret_id: Some("secret/api-tokens".into()),
        vault: Some(vault_settings(server.uri())),
        ..AuthSettings::default()
    };
    let registry = registry(settings, MemoryConfigStore::new());

    let resolution = registry.resolve().await;
    assert_eq!(resolution.secret_status, SourceStatus::Error);
    assert!(resolution.issues.contains(&RegistryIssue::SecretUnavailable));
    // The environment token still works.
    assert!(registry.verify("environment-token-value").await.is_some());
}

#[traced_test]
#[tokio::test]
async fn weak_token_warning_fires_once_across_resolutions() {
    let settings = AuthSettings { env_token: Some("short".into()), ..AuthSettings::default() };
    let registry = registry(settings, MemoryConfigStore::new());

    registry.resolve().await;
    registry.invalidate().await;
    registry.resolve().await;

    // Both passes reject the token, but the warning is de-duplicated.
    logs_assert(|lines: &[&str]| {
        let count =
            lines.iter().filter(|line| line.contains("Rejecting weak API token")).count();
        match count {
            1 => Ok(()),
            other => Err(format!("expected one weak-token warning, saw {other}")),
        }
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any well-formed token verifies for the exact value and fails for a
    /// single-character mutation.
    #[test]
    fn prop_verify_rejects_single_character_mutations(
        token in "[A-Za-z0-9._~+/=-]{16,64}",
        position in any::<prop::sample::Index>(),
    ) {
        let mut mutated: Vec<char> = token.chars().collect();
        let index = position.index(mutated.len());
        mutated[index] = if mutated[index] == 'x' { 'y' } else { 'x' };
        let mutated: String = mutated.into_iter().collect();
        prop_assume!(mutated != token);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let settings =
                AuthSettings { env_token: Some(token.clone()), ..AuthSettings::default() };
            let registry = registry(settings, MemoryConfigStore::new());

            prop_assert!(registry.verify(&token).await.is_some());
            prop_assert!(registry.verify(&mutated).await.is_none());
            Ok(())
        })?;
    }
}
