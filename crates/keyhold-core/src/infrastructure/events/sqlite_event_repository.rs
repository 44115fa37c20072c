//! SQLite-backed audit trail

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::events::{Event, EventRecorder, NewEvent};
use crate::domain::keys::ProjectId;
use crate::error::{Error, Result};

/// SQLite-backed implementation of EventRecorder
///
/// Rows are only ever inserted.
#[derive(Debug, Clone)]
pub struct SqliteEventRepository {
    pool: SqlitePool,
}

impl SqliteEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRecorder for SqliteEventRepository {
    async fn record(&self, event: NewEvent) -> Result<Event> {
        let created = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO events (project_id, object_type, object_id, description, created)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.project_id.0)
        .bind(&event.object_type)
        .bind(event.object_id)
        .bind(&event.description)
        .bind(created)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::AuditWriteFailed(e.to_string()))?;

        Ok(Event {
            id: result.last_insert_rowid(),
            project_id: event.project_id,
            object_type: event.object_type,
            object_id: event.object_id,
            description: event.description,
            created,
        })
    }

    async fn list(&self, project_id: ProjectId, limit: Option<u32>) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, object_type, object_id, description, created
            FROM events
            WHERE project_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(project_id.0)
        .bind(limit.map_or(-1, i64::from))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<Event> {
                let created: DateTime<Utc> = row.try_get("created")?;
                Ok(Event {
                    id: row.try_get("id")?,
                    project_id: ProjectId(row.try_get("project_id")?),
                    object_type: row.try_get("object_type")?,
                    object_id: row.try_get("object_id")?,
                    description: row.try_get("description")?,
                    created,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn setup() -> (Database, SqliteEventRepository) {
        let db = Database::in_memory().await.expect("Failed to create database");
        sqlx::query("INSERT INTO projects (id, name) VALUES (1, 'one'), (2, 'two')")
            .execute(db.pool())
            .await
            .unwrap();
        let repo = SqliteEventRepository::new(db.pool().clone());
        (db, repo)
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let (_db, repo) = setup().await;

        repo.record(NewEvent::new(ProjectId(1), "Access Key a created").about("key", 1))
            .await
            .unwrap();
        repo.record(NewEvent::new(ProjectId(2), "elsewhere")).await.unwrap();
        let last = repo
            .record(NewEvent::new(ProjectId(1), "Access Key a deleted").about("key", 1))
            .await
            .unwrap();

        let events = repo.list(ProjectId(1), None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, last.id);
        assert_eq!(events[0].description, "Access Key a deleted");
        assert_eq!(events[0].object_type.as_deref(), Some("key"));
        assert_eq!(events[0].object_id, Some(1));

        let limited = repo.list(ProjectId(1), Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_record_for_missing_project_is_audit_failure() {
        let (_db, repo) = setup().await;

        let err = repo.record(NewEvent::new(ProjectId(99), "orphan")).await.unwrap_err();
        assert!(matches!(err, Error::AuditWriteFailed(_)));
    }
}
