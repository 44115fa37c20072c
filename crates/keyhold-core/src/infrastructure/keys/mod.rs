//! Access key repositories

pub mod memory_key_repository;
pub mod sqlite_key_repository;

pub use memory_key_repository::InMemoryKeyRepository;
pub use sqlite_key_repository::SqliteKeyRepository;
