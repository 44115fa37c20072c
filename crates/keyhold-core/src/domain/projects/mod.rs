//! Projects
//!
//! Projects own access keys and audit events. Authorization of a caller
//! against a project happens outside this crate; the core only needs to
//! know that a project exists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::keys::ProjectId;
use crate::error::{Error, Result};

/// A project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub created: DateTime<Utc>,
}

/// Repository for projects
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Create a project
    async fn create(&self, name: &str) -> Result<Project>;

    /// Get a project by id
    async fn get(&self, project_id: ProjectId) -> Result<Option<Project>>;

    /// List all projects by name
    async fn list(&self) -> Result<Vec<Project>>;

    /// Get a project, failing with `Error::ProjectNotFound` when absent
    async fn require(&self, project_id: ProjectId) -> Result<Project> {
        self.get(project_id)
            .await?
            .ok_or(Error::ProjectNotFound(project_id))
    }
}
