//! Request-scoped key resolution
//!
//! Loads the key a single-resource operation targets, scoped to the
//! already-authorized project, before the operation runs.

use crate::error::{Error, Result};

use super::entity::{AccessKey, KeyId, ProjectId};
use super::repository::KeyRepository;

/// The project and key a single-resource operation acts on
#[derive(Debug, Clone)]
pub struct KeyContext {
    project_id: ProjectId,
    key: AccessKey,
}

impl KeyContext {
    /// Resolve `key_id` within `project_id`
    ///
    /// A key that does not exist, or exists under another project, yields
    /// `Error::KeyNotFound`.
    pub async fn resolve(
        repository: &dyn KeyRepository,
        project_id: ProjectId,
        key_id: KeyId,
    ) -> Result<Self> {
        let key = repository
            .get(project_id, key_id)
            .await?
            .filter(|k| k.project_id == project_id)
            .ok_or(Error::KeyNotFound { project_id, key_id })?;

        tracing::debug!(project_id = %project_id, key_id = %key_id, "Resolved access key");
        Ok(Self { project_id, key })
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn key(&self) -> &AccessKey {
        &self.key
    }

    pub fn into_key(self) -> AccessKey {
        self.key
    }
}
