//! In-memory access key repository
//!
//! Keeps keys in a process-local map. Used by tests and by callers that
//! need the lifecycle policy without a database; it should NOT be used as
//! durable storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::keys::{
    AccessKey, KeyId, KeyRepository, KeyUsage, NewAccessKey, ProjectId, RetrieveQueryParams,
    SortField,
};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    keys: BTreeMap<KeyId, AccessKey>,
    references: HashMap<KeyId, u32>,
}

/// In-memory implementation of KeyRepository
#[derive(Debug, Default)]
pub struct InMemoryKeyRepository {
    state: Mutex<State>,
}

impl InMemoryKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dependent entity referencing `key_id`
    ///
    /// References are counted as templates; they block hard deletes the
    /// same way rows in the SQLite schema do.
    pub fn add_reference(&self, key_id: KeyId) {
        *self.lock().references.entry(key_id).or_default() += 1;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    fn find_mut(&mut self, project_id: ProjectId, key_id: KeyId) -> Result<&mut AccessKey> {
        self.keys
            .get_mut(&key_id)
            .filter(|k| k.project_id == project_id)
            .ok_or(Error::KeyNotFound { project_id, key_id })
    }

    fn usage(&self, key_id: KeyId) -> KeyUsage {
        KeyUsage {
            templates: self.references.get(&key_id).copied().unwrap_or(0),
            ..Default::default()
        }
    }
}

#[async_trait]
impl KeyRepository for InMemoryKeyRepository {
    async fn get(&self, project_id: ProjectId, key_id: KeyId) -> Result<Option<AccessKey>> {
        Ok(self
            .lock()
            .keys
            .get(&key_id)
            .filter(|k| k.project_id == project_id)
            .cloned())
    }

    async fn list(&self, project_id: ProjectId, params: &RetrieveQueryParams) -> Result<Vec<AccessKey>> {
        let state = self.lock();
        let mut keys: Vec<AccessKey> = state
            .keys
            .values()
            .filter(|k| k.project_id == project_id && !k.removed)
            .map(AccessKey::redacted)
            .collect();

        match params.sort_by {
            Some(SortField::Type) => {
                keys.sort_by(|a, b| (a.key_type.as_str(), a.id).cmp(&(b.key_type.as_str(), b.id)))
            }
            Some(SortField::Name) | None => {
                keys.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)))
            }
        }
        if params.sort_inverted {
            keys.reverse();
        }

        let count = params.count.map_or(usize::MAX, |c| c as usize);
        Ok(keys
            .into_iter()
            .skip(params.offset as usize)
            .take(count)
            .collect())
    }

    async fn create(&self, key: NewAccessKey) -> Result<AccessKey> {
        let mut state = self.lock();
        state.next_id += 1;

        let (key_type, secret) = key.credential.into_parts();
        let created = AccessKey {
            id: KeyId(state.next_id),
            project_id: key.project_id,
            name: key.name,
            key_type,
            secret,
            removed: false,
            created: Utc::now(),
        };
        state.keys.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, key: &AccessKey) -> Result<()> {
        let mut state = self.lock();
        let stored = state.find_mut(key.project_id, key.id)?;
        stored.name = key.name.clone();
        stored.key_type = key.key_type;
        stored.secret = key.secret.clone();
        Ok(())
    }

    async fn soft_delete(&self, project_id: ProjectId, key_id: KeyId) -> Result<()> {
        self.lock().find_mut(project_id, key_id)?.removed = true;
        Ok(())
    }

    async fn hard_delete(&self, project_id: ProjectId, key_id: KeyId) -> Result<()> {
        let mut state = self.lock();
        state.find_mut(project_id, key_id)?;

        let usage = state.usage(key_id);
        if usage.is_in_use() {
            return Err(Error::KeyInUse { key_id, usage });
        }

        state.keys.remove(&key_id);
        Ok(())
    }

    async fn usage(&self, project_id: ProjectId, key_id: KeyId) -> Result<KeyUsage> {
        let mut state = self.lock();
        state.find_mut(project_id, key_id)?;
        Ok(state.usage(key_id))
    }
}
