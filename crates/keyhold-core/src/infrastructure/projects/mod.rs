//! Project repositories

pub mod sqlite_project_repository;

pub use sqlite_project_repository::SqliteProjectRepository;
