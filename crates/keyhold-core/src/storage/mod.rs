//! SQLite storage for projects, keys and the audit trail
//!
//! `Database::new` opens the pool and applies any pending migration before
//! returning, so repositories always see the current schema.
//!
//! ```ignore
//! let db = Database::new(DatabaseConfig::with_path("keyhold.db")).await?;
//! let keys = SqliteKeyRepository::new(db.pool().clone());
//! ```

pub mod database;
pub mod migrations;

pub use database::{default_database_path, Database, DatabaseConfig};
pub use migrations::{run_migrations, schema_version, CURRENT_VERSION};
