//! SQLite-backed access key repository
//!
//! Stores access keys with parameterized queries. Secrets are only read back
//! by single-key lookups; listings never select the secret column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

use crate::domain::keys::{
    AccessKey, KeyId, KeyRepository, KeyType, KeyUsage, NewAccessKey, ProjectId,
    RetrieveQueryParams, Secret, SortField,
};
use crate::error::{Error, Result};

/// Counts references to a key from every table that can hold one
const KEY_USAGE_SQL: &str = r#"
    SELECT
        (SELECT COUNT(*) FROM inventories WHERE ssh_key_id = ? OR become_key_id = ?),
        (SELECT COUNT(*) FROM repositories WHERE ssh_key_id = ?),
        (SELECT COUNT(*) FROM templates WHERE vault_key_id = ?)
"#;

/// SQLite-backed implementation of KeyRepository
#[derive(Debug, Clone)]
pub struct SqliteKeyRepository {
    pool: SqlitePool,
}

impl SqliteKeyRepository {
    /// Create a new SQLite key repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Parse a database row into an AccessKey
    fn row_to_key(row: SqliteRow) -> Result<AccessKey> {
        let key_type: String = row.try_get("type")?;
        let key_type = key_type
            .parse::<KeyType>()
            .map_err(|_| Error::Other(format!("Invalid key type in store: {}", key_type)))?;
        let secret: Option<String> = row.try_get("secret")?;
        let created: DateTime<Utc> = row.try_get("created")?;

        Ok(AccessKey {
            id: KeyId(row.try_get("id")?),
            project_id: ProjectId(row.try_get("project_id")?),
            name: row.try_get("name")?,
            key_type,
            secret: secret.map(Secret::new),
            removed: row.try_get("removed")?,
            created,
        })
    }

    async fn count_usage<'e, E>(executor: E, key_id: KeyId) -> Result<KeyUsage>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let (inventories, repositories, templates): (i64, i64, i64) = sqlx::query_as(KEY_USAGE_SQL)
            .bind(key_id.0)
            .bind(key_id.0)
            .bind(key_id.0)
            .bind(key_id.0)
            .fetch_one(executor)
            .await?;

        Ok(KeyUsage {
            inventories: inventories as u32,
            repositories: repositories as u32,
            templates: templates as u32,
        })
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

fn order_clause(params: &RetrieveQueryParams) -> String {
    let column = match params.sort_by {
        Some(SortField::Type) => "type",
        Some(SortField::Name) | None => "name",
    };
    let direction = if params.sort_inverted { "DESC" } else { "ASC" };
    format!("ORDER BY {column} {direction}, id {direction}")
}

#[async_trait]
impl KeyRepository for SqliteKeyRepository {
    async fn get(&self, project_id: ProjectId, key_id: KeyId) -> Result<Option<AccessKey>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, name, type, secret, removed, created
            FROM access_keys
            WHERE project_id = ? AND id = ?
            "#,
        )
        .bind(project_id.0)
        .bind(key_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_key).transpose()
    }

    async fn list(&self, project_id: ProjectId, params: &RetrieveQueryParams) -> Result<Vec<AccessKey>> {
        let sql = format!(
            r#"
            SELECT id, project_id, name, type, NULL AS secret, removed, created
            FROM access_keys
            WHERE project_id = ? AND removed = 0
            {}
            LIMIT ? OFFSET ?
            "#,
            order_clause(params)
        );

        let rows = sqlx::query(&sql)
            .bind(project_id.0)
            .bind(params.count.map_or(-1, i64::from))
            .bind(i64::from(params.offset))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_key).collect()
    }

    async fn create(&self, key: NewAccessKey) -> Result<AccessKey> {
        let created = Utc::now();
        let (key_type, secret) = key.credential.into_parts();

        let result = sqlx::query(
            r#"
            INSERT INTO access_keys (project_id, name, type, secret, removed, created)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(key.project_id.0)
        .bind(&key.name)
        .bind(key_type.as_str())
        .bind(secret.as_ref().map(Secret::as_str))
        .bind(created)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                Error::ProjectNotFound(key.project_id)
            } else {
                Error::DatabaseError(e)
            }
        })?;

        Ok(AccessKey {
            id: KeyId(result.last_insert_rowid()),
            project_id: key.project_id,
            name: key.name,
            key_type,
            secret,
            removed: false,
            created,
        })
    }

    async fn update(&self, key: &AccessKey) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE access_keys
            SET name = ?, type = ?, secret = ?
            WHERE project_id = ? AND id = ?
            "#,
        )
        .bind(&key.name)
        .bind(key.key_type.as_str())
        .bind(key.secret.as_ref().map(Secret::as_str))
        .bind(key.project_id.0)
        .bind(key.id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::KeyNotFound {
                project_id: key.project_id,
                key_id: key.id,
            });
        }

        Ok(())
    }

    async fn soft_delete(&self, project_id: ProjectId, key_id: KeyId) -> Result<()> {
        let result = sqlx::query("UPDATE access_keys SET removed = 1 WHERE project_id = ? AND id = ?")
            .bind(project_id.0)
            .bind(key_id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::KeyNotFound { project_id, key_id });
        }

        Ok(())
    }

    async fn hard_delete(&self, project_id: ProjectId, key_id: KeyId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let usage = Self::count_usage(&mut *tx, key_id).await?;
        if usage.is_in_use() {
            return Err(Error::KeyInUse { key_id, usage });
        }

        let result = sqlx::query("DELETE FROM access_keys WHERE project_id = ? AND id = ?")
            .bind(project_id.0)
            .bind(key_id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A reference inserted after the count still blocks the delete
                if is_foreign_key_violation(&e) {
                    Error::KeyInUse { key_id, usage }
                } else {
                    Error::DatabaseError(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::KeyNotFound { project_id, key_id });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn usage(&self, project_id: ProjectId, key_id: KeyId) -> Result<KeyUsage> {
        if self.get(project_id, key_id).await?.is_none() {
            return Err(Error::KeyNotFound { project_id, key_id });
        }
        Self::count_usage(&self.pool, key_id).await
    }
}
