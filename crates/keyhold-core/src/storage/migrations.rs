//! Schema migrations for the key store
//!
//! Each migration runs in its own transaction together with the row that
//! records it in `_migrations`, so a failed step leaves no partial schema.

use anyhow::Context;
use sqlx::SqlitePool;

/// Latest schema version
pub const CURRENT_VERSION: i32 = 2;

const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Projects, access keys and the audit trail
const MIGRATION_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        created TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS access_keys (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        type TEXT NOT NULL CHECK (type IN ('ssh', 'aws', 'gcloud', 'do')),
        secret TEXT,
        removed INTEGER NOT NULL DEFAULT 0,
        created TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_access_keys_project_id ON access_keys(project_id);
    CREATE INDEX IF NOT EXISTS idx_access_keys_removed ON access_keys(project_id, removed);

    -- Append-only audit trail. object_id is not a foreign key: events outlive
    -- the objects they describe.
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER REFERENCES projects(id) ON DELETE CASCADE,
        object_type TEXT,
        object_id INTEGER,
        description TEXT NOT NULL,
        created TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_events_project_id ON events(project_id);
    CREATE INDEX IF NOT EXISTS idx_events_object ON events(object_type, object_id);
"#;

/// Migration 2: Entities that reference access keys
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS inventories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        ssh_key_id INTEGER REFERENCES access_keys(id),
        become_key_id INTEGER REFERENCES access_keys(id)
    );

    CREATE INDEX IF NOT EXISTS idx_inventories_ssh_key_id ON inventories(ssh_key_id);
    CREATE INDEX IF NOT EXISTS idx_inventories_become_key_id ON inventories(become_key_id);

    CREATE TABLE IF NOT EXISTS repositories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        git_url TEXT NOT NULL,
        ssh_key_id INTEGER NOT NULL REFERENCES access_keys(id)
    );

    CREATE INDEX IF NOT EXISTS idx_repositories_ssh_key_id ON repositories(ssh_key_id);

    CREATE TABLE IF NOT EXISTS templates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        playbook TEXT NOT NULL,
        vault_key_id INTEGER REFERENCES access_keys(id)
    );

    CREATE INDEX IF NOT EXISTS idx_templates_vault_key_id ON templates(vault_key_id);
"#;

/// Ordered schema steps: version, label, SQL
const MIGRATIONS: [(i32, &str, &str); 2] = [
    (1, "projects, access keys and events", MIGRATION_V1),
    (2, "key-referencing entities", MIGRATION_V2),
];

/// Highest applied schema version, 0 for a fresh database
pub async fn schema_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the stored schema version
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current = schema_version(pool).await?;
    if current >= CURRENT_VERSION {
        tracing::debug!(version = current, "Key store schema is up to date");
        return Ok(());
    }

    for (version, label, sql) in MIGRATIONS.into_iter().filter(|(v, _, _)| *v > current) {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Migration v{} ({}) failed", version, label))?;
        sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(version, label, "Applied key store migration");
    }

    Ok(())
}
