//! SQLite-backed project repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::keys::ProjectId;
use crate::domain::projects::{Project, ProjectRepository};
use crate::error::{Error, Result};

/// SQLite-backed implementation of ProjectRepository
#[derive(Debug, Clone)]
pub struct SqliteProjectRepository {
    pool: SqlitePool,
}

impl SqliteProjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_project(row: SqliteRow) -> Result<Project> {
        let created: DateTime<Utc> = row.try_get("created")?;
        Ok(Project {
            id: ProjectId(row.try_get("id")?),
            name: row.try_get("name")?,
            created,
        })
    }
}

#[async_trait]
impl ProjectRepository for SqliteProjectRepository {
    async fn create(&self, name: &str) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Project name cannot be empty".to_string()));
        }

        let created = Utc::now();
        let result = sqlx::query("INSERT INTO projects (name, created) VALUES (?, ?)")
            .bind(name)
            .bind(created)
            .execute(&self.pool)
            .await?;

        tracing::info!(project_id = result.last_insert_rowid(), "Created project");

        Ok(Project {
            id: ProjectId(result.last_insert_rowid()),
            name: name.to_string(),
            created,
        })
    }

    async fn get(&self, project_id: ProjectId) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT id, name, created FROM projects WHERE id = ?")
            .bind(project_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_project).transpose()
    }

    async fn list(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT id, name, created FROM projects ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_project).collect()
    }
}
