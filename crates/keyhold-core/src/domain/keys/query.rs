//! Access key queries

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;

use super::context::KeyContext;
use super::entity::{AccessKey, ProjectId};
use super::repository::{KeyRepository, RetrieveQueryParams};

/// Result of a key query
///
/// Serializes as the bare key or the bare list, never with secrets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KeyListing {
    Single(AccessKey),
    Many(Vec<AccessKey>),
}

impl KeyListing {
    /// Number of keys in the listing
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(keys) => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into a list
    pub fn into_vec(self) -> Vec<AccessKey> {
        match self {
            Self::Single(key) => vec![key],
            Self::Many(keys) => keys,
        }
    }
}

/// Read-side service for access keys
pub struct KeyQueryService {
    keys: Arc<dyn KeyRepository>,
}

impl KeyQueryService {
    pub fn new(keys: Arc<dyn KeyRepository>) -> Self {
        Self { keys }
    }

    /// List the project's keys, or return the already resolved key
    ///
    /// When `resolved` is set the request targeted a single key and the
    /// collection query is skipped.
    pub async fn list(
        &self,
        project_id: ProjectId,
        params: &RetrieveQueryParams,
        resolved: Option<&KeyContext>,
    ) -> Result<KeyListing> {
        if let Some(context) = resolved {
            return Ok(KeyListing::Single(context.key().redacted()));
        }

        let keys = self.keys.list(project_id, params).await?;
        tracing::debug!(
            project_id = %project_id,
            count = keys.len(),
            sort_by = ?params.sort_by,
            inverted = params.sort_inverted,
            "Listed access keys"
        );

        Ok(KeyListing::Many(keys.iter().map(AccessKey::redacted).collect()))
    }
}
