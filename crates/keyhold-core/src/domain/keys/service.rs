//! Access key lifecycle
//!
//! Orchestrates create, update and delete of access keys against the key
//! repository and the audit trail.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::events::{EventRecorder, NewEvent};
use crate::error::Result;

use super::entity::{AccessKey, KeyPayload, NewAccessKey, ProjectId};
use super::event::{key_event, KeyEventType};
use super::repository::KeyRepository;
use super::secret::SecretNormalizer;
use super::validation::KeyValidator;

/// How a key is removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Flag the key removed and keep the record
    #[default]
    Soft,
    /// Physically remove the key; refused while anything references it
    Hard,
}

/// Service owning the access key lifecycle policy
///
/// # Policy
///
/// - Validation runs before any store call; a rejected payload never
///   touches the repository
/// - Every supplied secret is normalized exactly once
/// - Every successful mutation records one audit event after the mutation
///   commits; a failed audit write is logged and never fails the mutation
/// - Secrets are never logged
///
/// # Example
///
/// ```ignore
/// let manager = KeyLifecycleManager::new(keys, events);
///
/// let payload = KeyPayload::new("deploy", "ssh")
///     .with_project(ProjectId(7))
///     .with_secret(private_key);
/// let key = manager.create(ProjectId(7), payload).await?;
///
/// manager.delete(&key, DeleteMode::Hard).await?;
/// ```
pub struct KeyLifecycleManager {
    keys: Arc<dyn KeyRepository>,
    events: Arc<dyn EventRecorder>,
}

impl KeyLifecycleManager {
    /// Create a new KeyLifecycleManager
    pub fn new(keys: Arc<dyn KeyRepository>, events: Arc<dyn EventRecorder>) -> Self {
        Self { keys, events }
    }

    /// Create a key under `project_id`
    ///
    /// The payload must name the same project it is submitted under.
    /// Returns the persisted key with its assigned id.
    pub async fn create(&self, project_id: ProjectId, payload: KeyPayload) -> Result<AccessKey> {
        KeyValidator::validate_project(&payload, project_id)?;
        let credential = KeyValidator::validate_payload(&payload)?;
        let credential = credential.map_secret(|s| SecretNormalizer::normalize(&s));

        let key = self
            .keys
            .create(NewAccessKey {
                project_id,
                name: payload.name,
                credential,
            })
            .await?;

        tracing::info!(
            project_id = %key.project_id,
            key_id = %key.id,
            key_type = %key.key_type,
            "Created access key"
        );

        self.audit(key_event(KeyEventType::Created, key.project_id, key.id, &key.name))
            .await;

        Ok(key)
    }

    /// Update `existing` with the name, type and secret from `payload`
    ///
    /// The payload is validated as submitted, so an `ssh` payload must carry
    /// its secret. A cloud payload without a secret keeps the stored secret
    /// byte-for-byte. Identity always comes from `existing`.
    pub async fn update(&self, existing: &AccessKey, payload: KeyPayload) -> Result<AccessKey> {
        let credential = KeyValidator::validate_payload(&payload)?;
        let (key_type, supplied) = credential.into_parts();
        let secret_replaced = supplied.is_some();

        let secret = match supplied {
            Some(supplied) => Some(SecretNormalizer::normalize(&supplied)),
            None => existing.secret.clone(),
        };

        let updated = AccessKey {
            name: payload.name,
            key_type,
            secret,
            ..existing.clone()
        };
        self.keys.update(&updated).await?;

        tracing::info!(
            project_id = %existing.project_id,
            key_id = %existing.id,
            key_type = %updated.key_type,
            secret_replaced,
            "Updated access key"
        );

        self.audit(key_event(
            KeyEventType::Updated,
            existing.project_id,
            existing.id,
            &updated.name,
        ))
        .await;

        Ok(updated)
    }

    /// Remove a key
    ///
    /// A hard delete of a referenced key fails with `Error::KeyInUse` and
    /// leaves the key intact, so the caller can offer a soft delete instead.
    pub async fn delete(&self, key: &AccessKey, mode: DeleteMode) -> Result<()> {
        match mode {
            DeleteMode::Soft => self.keys.soft_delete(key.project_id, key.id).await?,
            DeleteMode::Hard => {
                if let Err(err) = self.keys.hard_delete(key.project_id, key.id).await {
                    if err.in_use() {
                        tracing::warn!(
                            project_id = %key.project_id,
                            key_id = %key.id,
                            "Refused hard delete of access key still in use"
                        );
                    }
                    return Err(err);
                }
            }
        }

        tracing::info!(
            project_id = %key.project_id,
            key_id = %key.id,
            mode = ?mode,
            "Deleted access key"
        );

        self.audit(key_event(KeyEventType::Deleted, key.project_id, key.id, &key.name))
            .await;

        Ok(())
    }

    /// Record an audit event; failures are logged and swallowed
    async fn audit(&self, event: NewEvent) {
        if let Err(err) = self.events.record(event).await {
            tracing::error!(error = %err, "Failed to record access key audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{Event, InMemoryEventStore};
    use crate::domain::keys::{
        KeyId, KeyType, KeyUsage, RetrieveQueryParams, Secret, ValidationError, KEY_OBJECT_TYPE,
    };
    use crate::error::Error;
    use crate::infrastructure::keys::InMemoryKeyRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Counts every store call and fails them all
    #[derive(Default)]
    struct RecordingKeyRepository {
        calls: AtomicUsize,
    }

    impl RecordingKeyRepository {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) -> Error {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Error::Other("unexpected store call".to_string())
        }
    }

    #[async_trait]
    impl KeyRepository for RecordingKeyRepository {
        async fn get(&self, _: ProjectId, _: KeyId) -> Result<Option<AccessKey>> {
            Err(self.hit())
        }

        async fn list(&self, _: ProjectId, _: &RetrieveQueryParams) -> Result<Vec<AccessKey>> {
            Err(self.hit())
        }

        async fn create(&self, _: NewAccessKey) -> Result<AccessKey> {
            Err(self.hit())
        }

        async fn update(&self, _: &AccessKey) -> Result<()> {
            Err(self.hit())
        }

        async fn soft_delete(&self, _: ProjectId, _: KeyId) -> Result<()> {
            Err(self.hit())
        }

        async fn hard_delete(&self, _: ProjectId, _: KeyId) -> Result<()> {
            Err(self.hit())
        }

        async fn usage(&self, _: ProjectId, _: KeyId) -> Result<KeyUsage> {
            Err(self.hit())
        }
    }

    struct FailingEventRecorder;

    #[async_trait]
    impl EventRecorder for FailingEventRecorder {
        async fn record(&self, _: NewEvent) -> Result<Event> {
            Err(Error::AuditWriteFailed("events table unavailable".to_string()))
        }

        async fn list(&self, _: ProjectId, _: Option<u32>) -> Result<Vec<Event>> {
            Ok(Vec::new())
        }
    }

    fn setup() -> (KeyLifecycleManager, Arc<InMemoryKeyRepository>, Arc<InMemoryEventStore>) {
        let keys = Arc::new(InMemoryKeyRepository::new());
        let events = Arc::new(InMemoryEventStore::new());
        let manager = KeyLifecycleManager::new(keys.clone(), events.clone());
        (manager, keys, events)
    }

    fn ssh_payload(project: i64, secret: &str) -> KeyPayload {
        KeyPayload::new("deploy", "ssh")
            .with_project(ProjectId(project))
            .with_secret(secret)
    }

    #[tokio::test]
    async fn test_create_ssh_key_normalizes_and_audits() {
        let (manager, keys, events) = setup();

        let key = manager.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();

        assert_eq!(key.key_type, KeyType::Ssh);
        assert_eq!(key.secret.as_ref().map(Secret::as_str), Some("KEY\n"));

        let stored = keys.get(ProjectId(7), key.id).await.unwrap().unwrap();
        assert_eq!(stored.secret.as_ref().map(Secret::as_str), Some("KEY\n"));

        let recorded = events.events_for(KEY_OBJECT_TYPE, key.id.0);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].description, "Access Key deploy created");
        assert_eq!(recorded[0].project_id, ProjectId(7));
    }

    #[tokio::test]
    async fn test_create_with_project_mismatch_never_touches_store() {
        let keys = Arc::new(RecordingKeyRepository::default());
        let events = Arc::new(InMemoryEventStore::new());
        let manager = KeyLifecycleManager::new(keys.clone(), events.clone());

        let err = manager.create(ProjectId(9), ssh_payload(7, "KEY")).await.unwrap_err();

        assert!(matches!(
            err,
            Error::ValidationFailed(ValidationError::ProjectMismatch { .. })
        ));
        assert_eq!(keys.calls(), 0);
        assert!(events.all_events().is_empty());
    }

    #[tokio::test]
    async fn test_create_without_project_id_is_rejected() {
        let keys = Arc::new(RecordingKeyRepository::default());
        let manager = KeyLifecycleManager::new(keys.clone(), Arc::new(InMemoryEventStore::new()));

        let payload = KeyPayload::new("deploy", "aws");
        let err = manager.create(ProjectId(7), payload).await.unwrap_err();

        assert!(err.is_user_error());
        assert_eq!(keys.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_type_never_touches_store() {
        let keys = Arc::new(RecordingKeyRepository::default());
        let manager = KeyLifecycleManager::new(keys.clone(), Arc::new(InMemoryEventStore::new()));

        let payload = KeyPayload::new("deploy", "rsa")
            .with_project(ProjectId(7))
            .with_secret("abc");
        let err = manager.create(ProjectId(7), payload).await.unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(ValidationError::InvalidType(_))));

        let existing = AccessKey {
            id: KeyId(1),
            project_id: ProjectId(7),
            name: "deploy".to_string(),
            key_type: KeyType::Aws,
            secret: None,
            removed: false,
            created: chrono::Utc::now(),
        };
        let err = manager
            .update(&existing, KeyPayload::new("deploy", "rsa").with_secret("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(ValidationError::InvalidType(_))));

        assert_eq!(keys.calls(), 0);
    }

    #[tokio::test]
    async fn test_create_ssh_without_secret_is_rejected() {
        let keys = Arc::new(RecordingKeyRepository::default());
        let manager = KeyLifecycleManager::new(keys.clone(), Arc::new(InMemoryEventStore::new()));

        for payload in [
            KeyPayload::new("deploy", "ssh").with_project(ProjectId(7)),
            ssh_payload(7, ""),
        ] {
            let err = manager.create(ProjectId(7), payload).await.unwrap_err();
            assert!(matches!(err, Error::ValidationFailed(ValidationError::EmptySecret)));
        }
        assert_eq!(keys.calls(), 0);
    }

    #[tokio::test]
    async fn test_create_cloud_key_without_secret() {
        let (manager, _, _) = setup();

        let payload = KeyPayload::new("aws-prod", "aws").with_project(ProjectId(7));
        let key = manager.create(ProjectId(7), payload).await.unwrap();

        assert_eq!(key.key_type, KeyType::Aws);
        assert!(key.secret.is_none());
    }

    #[tokio::test]
    async fn test_update_without_secret_preserves_stored_secret() {
        let (manager, keys, _) = setup();
        let payload = KeyPayload::new("cloud", "aws")
            .with_project(ProjectId(7))
            .with_secret("AKIA:secret");
        let key = manager.create(ProjectId(7), payload).await.unwrap();

        for payload in [
            KeyPayload::new("renamed", "aws"),
            KeyPayload::new("renamed", "aws").with_secret(""),
        ] {
            let updated = manager.update(&key, payload).await.unwrap();
            assert_eq!(updated.name, "renamed");
        }

        let stored = keys.get(ProjectId(7), key.id).await.unwrap().unwrap();
        assert_eq!(stored.secret, key.secret);
        assert_eq!(stored.secret.as_ref().map(Secret::as_str), Some("AKIA:secret\n"));
    }

    #[tokio::test]
    async fn test_ssh_update_without_secret_never_touches_store() {
        let keys = Arc::new(RecordingKeyRepository::default());
        let events = Arc::new(InMemoryEventStore::new());
        let manager = KeyLifecycleManager::new(keys.clone(), events.clone());

        let existing = AccessKey {
            id: KeyId(1),
            project_id: ProjectId(7),
            name: "deploy".to_string(),
            key_type: KeyType::Ssh,
            secret: Some(Secret::new("KEY\n")),
            removed: false,
            created: chrono::Utc::now(),
        };

        for payload in [
            KeyPayload::new("renamed", "ssh"),
            KeyPayload::new("renamed", "ssh").with_secret(""),
        ] {
            let err = manager.update(&existing, payload).await.unwrap_err();
            assert!(matches!(err, Error::ValidationFailed(ValidationError::EmptySecret)));
        }

        assert_eq!(keys.calls(), 0);
        assert!(events.all_events().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_whitespace_secret() {
        let (manager, keys, _) = setup();
        let key = manager.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();

        manager
            .update(&key, KeyPayload::new("deploy", "ssh").with_secret("  "))
            .await
            .unwrap();

        let stored = keys.get(ProjectId(7), key.id).await.unwrap().unwrap();
        assert_eq!(stored.secret.as_ref().map(Secret::as_str), Some("\n"));
    }

    #[tokio::test]
    async fn test_update_with_secret_normalizes_once() {
        let (manager, keys, _) = setup();
        let key = manager.create(ProjectId(7), ssh_payload(7, "OLD")).await.unwrap();

        manager
            .update(&key, KeyPayload::new("deploy", "ssh").with_secret("NEW\n"))
            .await
            .unwrap();

        let stored = keys.get(ProjectId(7), key.id).await.unwrap().unwrap();
        assert_eq!(stored.secret.as_ref().map(Secret::as_str), Some("NEW\n"));
    }

    #[tokio::test]
    async fn test_update_to_ssh_without_any_secret_is_rejected() {
        let (manager, keys, events) = setup();
        let payload = KeyPayload::new("cloud", "do").with_project(ProjectId(7));
        let key = manager.create(ProjectId(7), payload).await.unwrap();
        events.clear();

        let err = manager
            .update(&key, KeyPayload::new("cloud", "ssh"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ValidationFailed(ValidationError::EmptySecret)));
        let stored = keys.get(ProjectId(7), key.id).await.unwrap().unwrap();
        assert_eq!(stored.key_type, KeyType::DigitalOcean);
        assert!(events.all_events().is_empty());
    }

    #[tokio::test]
    async fn test_update_audits_previous_identity() {
        let (manager, _, events) = setup();
        let key = manager.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();

        manager
            .update(&key, KeyPayload::new("renamed", "ssh").with_secret("NEW"))
            .await
            .unwrap();

        let recorded = events.events_for(KEY_OBJECT_TYPE, key.id.0);
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[1].description, "Access Key renamed updated");
        assert_eq!(recorded[1].project_id, ProjectId(7));
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_record() {
        let (manager, keys, events) = setup();
        let key = manager.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();

        manager.delete(&key, DeleteMode::default()).await.unwrap();

        let stored = keys.get(ProjectId(7), key.id).await.unwrap().unwrap();
        assert!(stored.removed);
        let listed = keys.list(ProjectId(7), &RetrieveQueryParams::default()).await.unwrap();
        assert!(listed.is_empty());

        let recorded = events.events_for(KEY_OBJECT_TYPE, key.id.0);
        assert_eq!(recorded.last().unwrap().description, "Access Key deploy deleted");
    }

    #[tokio::test]
    async fn test_hard_delete_in_use_leaves_key_intact() {
        let (manager, keys, events) = setup();
        let key = manager.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();
        keys.add_reference(key.id);

        let err = manager.delete(&key, DeleteMode::Hard).await.unwrap_err();

        assert!(err.in_use());
        assert!(matches!(err, Error::KeyInUse { key_id, .. } if key_id == key.id));
        let stored = keys.get(ProjectId(7), key.id).await.unwrap().unwrap();
        assert_eq!(stored, key);
        assert_eq!(events.events_for(KEY_OBJECT_TYPE, key.id.0).len(), 1);
    }

    #[tokio::test]
    async fn test_hard_delete_removes_unreferenced_key() {
        let (manager, keys, _) = setup();
        let key = manager.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();

        manager.delete(&key, DeleteMode::Hard).await.unwrap();

        assert!(keys.get(ProjectId(7), key.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_audit_failures_never_fail_mutations() {
        let keys = Arc::new(InMemoryKeyRepository::new());
        let manager = KeyLifecycleManager::new(keys.clone(), Arc::new(FailingEventRecorder));

        let key = manager.create(ProjectId(7), ssh_payload(7, "KEY")).await.unwrap();
        let key = manager
            .update(&key, KeyPayload::new("renamed", "ssh").with_secret("NEW"))
            .await
            .unwrap();
        manager.delete(&key, DeleteMode::Soft).await.unwrap();

        let stored = keys.get(ProjectId(7), key.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "renamed");
        assert!(stored.removed);
    }
}
