//! Access key repository trait
//!
//! Defines the storage interface the lifecycle manager and query service
//! work against. Implementations live in `infrastructure::keys`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::entity::{AccessKey, KeyId, NewAccessKey, ProjectId};

/// Column a key listing can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    Type,
}

impl SortField {
    /// Parse a `sort` query value; unknown values yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(Self::Name),
            "type" => Some(Self::Type),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Type => "type",
        }
    }
}

/// Listing parameters
///
/// `sort_by: None` leaves ordering to the store default (by name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrieveQueryParams {
    pub sort_by: Option<SortField>,
    pub sort_inverted: bool,
    pub offset: u32,
    pub count: Option<u32>,
}

impl RetrieveQueryParams {
    /// Build from raw `sort` / `order` query values
    pub fn from_query(sort: Option<&str>, order: Option<&str>) -> Self {
        Self {
            sort_by: sort.and_then(SortField::parse),
            sort_inverted: order == Some("desc"),
            ..Default::default()
        }
    }

    pub fn sorted_by(mut self, field: SortField) -> Self {
        self.sort_by = Some(field);
        self
    }

    pub fn descending(mut self) -> Self {
        self.sort_inverted = true;
        self
    }

    pub fn page(mut self, offset: u32, count: u32) -> Self {
        self.offset = offset;
        self.count = Some(count);
        self
    }
}

/// How many dependent entities reference a key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUsage {
    pub inventories: u32,
    pub repositories: u32,
    pub templates: u32,
}

impl KeyUsage {
    pub fn total(&self) -> u32 {
        self.inventories + self.repositories + self.templates
    }

    pub fn is_in_use(&self) -> bool {
        self.total() > 0
    }
}

impl std::fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} inventories, {} repositories, {} templates",
            self.inventories, self.repositories, self.templates
        )
    }
}

/// Repository for access key persistence
///
/// All lookups are scoped to a project: a key id that exists under another
/// project is reported as absent.
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Get a key by id, including soft-deleted keys and the stored secret
    async fn get(&self, project_id: ProjectId, key_id: KeyId) -> Result<Option<AccessKey>>;

    /// List the project's keys that are not soft-deleted, secrets stripped
    async fn list(&self, project_id: ProjectId, params: &RetrieveQueryParams) -> Result<Vec<AccessKey>>;

    /// Insert a key and return it with its assigned id
    async fn create(&self, key: NewAccessKey) -> Result<AccessKey>;

    /// Overwrite name, type and secret of an existing key
    async fn update(&self, key: &AccessKey) -> Result<()>;

    /// Mark a key removed while keeping the record
    async fn soft_delete(&self, project_id: ProjectId, key_id: KeyId) -> Result<()>;

    /// Physically remove a key
    ///
    /// Fails with `Error::KeyInUse` and leaves the key untouched if any
    /// dependent entity references it.
    async fn hard_delete(&self, project_id: ProjectId, key_id: KeyId) -> Result<()>;

    /// Count dependent entities referencing a key
    async fn usage(&self, project_id: ProjectId, key_id: KeyId) -> Result<KeyUsage>;
}
