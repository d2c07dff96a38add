mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{codec, services};
use idforge_auth::system_keys::CreateSystemKey;
use idforge_core::api_keys::generate_api_key;
use idforge_core::error::CoreError;
use idforge_db::models::system_api_key::{CreateSystemApiKey, UpdateSystemApiKey};

fn named(name: &str) -> CreateSystemKey {
    CreateSystemKey {
        name: name.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn defaults_on_create() {
    let (services, _) = services();
    let issued = services.system_keys.create(1, named("default")).await.unwrap();

    assert_eq!(issued.key.rate_limit_rpm, 60);
    assert_eq!(issued.key.rate_limit_tpm, 100_000);
    assert_eq!(issued.key.scopes, vec!["chat", "embedding", "image"]);
    assert_eq!(issued.key.key_prefix.len(), 10);
    assert_eq!(issued.plaintext.len(), 51);
}

#[tokio::test]
async fn sixth_key_exceeds_ceiling_and_stores_nothing() {
    let (services, _) = services();
    for i in 0..5 {
        services
            .system_keys
            .create(1, named(&format!("key-{i}")))
            .await
            .unwrap();
    }

    assert_matches!(
        services.system_keys.create(1, named("one-too-many")).await,
        Err(CoreError::LimitExceeded(_))
    );
    assert_eq!(services.system_keys.list(1).await.unwrap().len(), 5);

    // The ceiling is per user.
    assert!(services.system_keys.create(2, named("other")).await.is_ok());
}

#[tokio::test]
async fn rotation_invalidates_old_plaintext() {
    let (services, _) = services();
    let issued = services.system_keys.create(1, named("rotating")).await.unwrap();

    let rotated = services.system_keys.rotate(1, issued.key.id).await.unwrap();
    assert_ne!(rotated.plaintext, issued.plaintext);
    assert!(rotated.key.last_rotated_at.is_some());

    assert_matches!(
        services.system_keys.validate(&issued.plaintext).await,
        Err(CoreError::NotFound { .. })
    );
    assert_eq!(
        services.system_keys.validate(&rotated.plaintext).await.unwrap().id,
        issued.key.id
    );
}

#[tokio::test]
async fn foreign_key_operations_are_forbidden() {
    let (services, _) = services();
    let issued = services
        .system_keys
        .create(
            1,
            CreateSystemKey {
                scopes: vec!["audio".into()],
                rate_limit_rpm: Some(30),
                ..named("mine")
            },
        )
        .await
        .unwrap();

    assert_matches!(
        services
            .system_keys
            .update(
                2,
                issued.key.id,
                UpdateSystemApiKey {
                    name: Some("hijacked".into()),
                    scopes: Some(vec!["video".into()]),
                    rate_limit_rpm: Some(1),
                    rate_limit_tpm: Some(1),
                    is_active: Some(false),
                },
            )
            .await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(
        services.system_keys.rotate(2, issued.key.id).await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(
        services.system_keys.delete(2, issued.key.id).await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(
        services.system_keys.get(2, issued.key.id).await,
        Err(CoreError::Forbidden(_))
    );

    // Untouched: the original plaintext still validates.
    assert!(services.system_keys.validate(&issued.plaintext).await.is_ok());
    let stored = services.system_keys.get(1, issued.key.id).await.unwrap();
    assert_eq!(stored.name, "mine");
    assert_eq!(stored.scopes, vec!["audio"]);
    assert_eq!(stored.rate_limit_rpm, 30);
    assert_eq!(stored.rate_limit_tpm, issued.key.rate_limit_tpm);
    assert!(stored.is_active);
    assert_eq!(stored.key_hash, issued.key.key_hash);
}

#[tokio::test]
async fn repeated_validation_resolves_same_key() {
    let (services, _) = services();
    let issued = services.system_keys.create(1, named("stable")).await.unwrap();
    services.system_keys.create(1, named("other")).await.unwrap();

    let first = services.system_keys.validate(&issued.plaintext).await.unwrap();
    let second = services.system_keys.validate(&issued.plaintext).await.unwrap();

    assert_eq!(first.id, issued.key.id);
    assert_eq!(second.id, issued.key.id);
}

#[tokio::test]
async fn expired_key_is_rejected() {
    let (services, repos) = services();
    let generated = generate_api_key(codec().as_ref());
    repos
        .system_api_keys
        .create(&CreateSystemApiKey {
            user_id: 1,
            name: "stale".into(),
            key_hash: generated.hash.clone(),
            key_prefix: generated.prefix.clone(),
            scopes: vec!["chat".into()],
            rate_limit_rpm: 60,
            rate_limit_tpm: 100_000,
            expires_at: Some(Utc::now() - Duration::seconds(1)),
            allowed_ips: Vec::new(),
            rotate_after_days: None,
        })
        .await
        .unwrap();

    assert_matches!(
        services.system_keys.validate(&generated.plaintext).await,
        Err(CoreError::Expired)
    );
}

#[tokio::test]
async fn validate_records_last_used_in_background() {
    let (services, _) = services();
    let issued = services.system_keys.create(1, named("tracked")).await.unwrap();
    assert!(issued.key.last_used_at.is_none());

    services.system_keys.validate(&issued.plaintext).await.unwrap();
    services.usage.flush().await;

    let key = services.system_keys.get(1, issued.key.id).await.unwrap();
    assert!(key.last_used_at.is_some());
}

#[tokio::test]
async fn deleted_key_no_longer_validates() {
    let (services, _) = services();
    let issued = services.system_keys.create(1, named("temp")).await.unwrap();

    services.system_keys.delete(1, issued.key.id).await.unwrap();
    assert_matches!(
        services.system_keys.validate(&issued.plaintext).await,
        Err(CoreError::NotFound { .. })
    );
}

#[tokio::test]
async fn serialized_key_has_no_hash() {
    let (services, _) = services();
    let issued = services.system_keys.create(1, named("json")).await.unwrap();

    let json = serde_json::to_value(&issued.key).unwrap();
    assert!(json.get("key_hash").is_none());
    assert_eq!(json["key_prefix"], issued.key.key_prefix.as_str());
}
