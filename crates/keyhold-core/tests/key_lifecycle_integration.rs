//! Keyhold Core Integration Tests
//!
//! Drives the lifecycle and query services against a migrated in-memory
//! SQLite store.

use std::sync::Arc;

use keyhold_core::domain::events::EventRecorder;
use keyhold_core::domain::keys::{
    DeleteMode, KeyContext, KeyId, KeyLifecycleManager, KeyListing, KeyPayload, KeyQueryService,
    KeyRepository, ProjectId, RetrieveQueryParams, SecretNormalizer, ValidationError,
};
use keyhold_core::infrastructure::events::SqliteEventRepository;
use keyhold_core::infrastructure::keys::SqliteKeyRepository;
use keyhold_core::storage::Database;
use keyhold_core::Error;

struct Harness {
    db: Database,
    keys: Arc<SqliteKeyRepository>,
    events: Arc<SqliteEventRepository>,
    lifecycle: KeyLifecycleManager,
    query: KeyQueryService,
}

async fn harness() -> Harness {
    let db = Database::in_memory().await.expect("Failed to create database");
    sqlx::query("INSERT INTO projects (id, name) VALUES (7, 'seven'), (9, 'nine')")
        .execute(db.pool())
        .await
        .unwrap();

    let keys = Arc::new(SqliteKeyRepository::new(db.pool().clone()));
    let events = Arc::new(SqliteEventRepository::new(db.pool().clone()));

    Harness {
        lifecycle: KeyLifecycleManager::new(keys.clone(), events.clone()),
        query: KeyQueryService::new(keys.clone()),
        db,
        keys,
        events,
    }
}

fn ssh_payload(project: i64, secret: &str) -> KeyPayload {
    KeyPayload::new("deploy", "ssh")
        .with_project(ProjectId(project))
        .with_secret(secret)
}

async fn key_count(db: &Database) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM access_keys")
        .fetch_one(db.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_normalizes_secret_and_records_event() {
    let h = harness().await;

    let key = h.lifecycle.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();

    let stored = h.keys.get(ProjectId(7), key.id).await.unwrap().unwrap();
    assert_eq!(stored.secret.as_ref().unwrap().as_str(), "KEY\n");
    assert_eq!(SecretNormalizer::normalize(stored.secret.as_ref().unwrap()).as_str(), "KEY\n");

    let events = h.events.list(ProjectId(7), None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].description, "Access Key deploy created");
    assert_eq!(events[0].object_type.as_deref(), Some("key"));
    assert_eq!(events[0].object_id, Some(key.id.0));
}

#[tokio::test]
async fn test_create_under_other_project_is_rejected_before_persistence() {
    let h = harness().await;

    let err = h
        .lifecycle
        .create(ProjectId(9), ssh_payload(7, "KEY"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::ValidationFailed(ValidationError::ProjectMismatch { .. })
    ));
    assert_eq!(key_count(&h.db).await, 0);
    assert!(h.events.list(ProjectId(9), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_without_secret_keeps_stored_secret() {
    let h = harness().await;
    let payload = KeyPayload::new("cloud", "gcloud")
        .with_project(ProjectId(7))
        .with_secret("{\"type\": \"service_account\"}");
    let key = h.lifecycle.create(ProjectId(7), payload).await.unwrap();
    let existing = h.keys.get(ProjectId(7), key.id).await.unwrap().unwrap();

    let updated = h
        .lifecycle
        .update(
            &existing,
            KeyPayload::new("renamed", "gcloud").with_project(ProjectId(7)),
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "renamed");

    let stored = h.keys.get(ProjectId(7), key.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "renamed");
    assert_eq!(
        stored.secret.as_ref().unwrap().as_str(),
        "{\"type\": \"service_account\"}\n"
    );

    let events = h.events.list(ProjectId(7), Some(1)).await.unwrap();
    assert_eq!(events[0].description, "Access Key renamed updated");
}

#[tokio::test]
async fn test_ssh_update_without_secret_is_rejected() {
    let h = harness().await;
    let key = h.lifecycle.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();
    let existing = h.keys.get(ProjectId(7), key.id).await.unwrap().unwrap();

    let err = h
        .lifecycle
        .update(&existing, KeyPayload::new("renamed", "ssh"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ValidationFailed(ValidationError::EmptySecret)
    ));

    let stored = h.keys.get(ProjectId(7), key.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "deploy");
    assert_eq!(h.events.list(ProjectId(7), None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_soft_delete_hides_key_from_listing_only() {
    let h = harness().await;
    let key = h.lifecycle.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();
    h.lifecycle
        .create(
            ProjectId(7),
            KeyPayload::new("cloud", "aws").with_project(ProjectId(7)),
        )
        .await
        .unwrap();

    h.lifecycle.delete(&key, DeleteMode::Soft).await.unwrap();

    let listing = h
        .query
        .list(ProjectId(7), &RetrieveQueryParams::default(), None)
        .await
        .unwrap();
    let names: Vec<_> = listing.into_vec().into_iter().map(|k| k.name).collect();
    assert_eq!(names, vec!["cloud"]);

    let context = KeyContext::resolve(h.keys.as_ref(), ProjectId(7), key.id).await.unwrap();
    assert!(context.key().removed);

    let single = h
        .query
        .list(ProjectId(7), &RetrieveQueryParams::default(), Some(&context))
        .await
        .unwrap();
    match single {
        KeyListing::Single(k) => {
            assert_eq!(k.id, key.id);
            assert!(k.secret.is_none());
        }
        KeyListing::Many(_) => panic!("expected the resolved key"),
    }
}

#[tokio::test]
async fn test_hard_delete_of_referenced_key_is_blocked() {
    let h = harness().await;
    let key = h.lifecycle.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();

    sqlx::query(
        "INSERT INTO repositories (project_id, name, git_url, ssh_key_id) VALUES (7, 'app', 'git@example.com:app.git', ?)",
    )
    .bind(key.id.0)
    .execute(h.db.pool())
    .await
    .unwrap();

    let err = h.lifecycle.delete(&key, DeleteMode::Hard).await.unwrap_err();
    assert!(err.in_use());
    assert_eq!(err.to_response().in_use, Some(true));

    let stored = h.keys.get(ProjectId(7), key.id).await.unwrap().unwrap();
    assert!(!stored.removed);
    assert_eq!(stored.secret.as_ref().unwrap().as_str(), "KEY\n");

    let usage = h.keys.usage(ProjectId(7), key.id).await.unwrap();
    assert_eq!(usage.repositories, 1);
}

#[tokio::test]
async fn test_hard_delete_of_unreferenced_key_removes_it() {
    let h = harness().await;
    let key = h.lifecycle.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();

    h.lifecycle.delete(&key, DeleteMode::Hard).await.unwrap();

    assert!(h.keys.get(ProjectId(7), key.id).await.unwrap().is_none());
    let events = h.events.list(ProjectId(7), Some(1)).await.unwrap();
    assert_eq!(events[0].description, "Access Key deploy deleted");
    assert_eq!(events[0].object_id, Some(key.id.0));
}

#[tokio::test]
async fn test_keys_are_isolated_per_project() {
    let h = harness().await;
    let key = h.lifecycle.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();

    let err = KeyContext::resolve(h.keys.as_ref(), ProjectId(9), key.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::KeyNotFound { .. }));

    let listing = h
        .query
        .list(ProjectId(9), &RetrieveQueryParams::default(), None)
        .await
        .unwrap();
    assert!(listing.is_empty());
    assert!(h.keys.get(ProjectId(9), KeyId(key.id.0)).await.unwrap().is_none());
}
