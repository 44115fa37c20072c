//! Keyhold Core Library
//!
//! This crate provides the access key lifecycle for automation projects:
//! - Per-type key validation and secret normalization
//! - Create, update, soft delete and hard delete with usage-conflict detection
//! - Best-effort audit events for every key mutation
//! - Sorted key listings
//! - Storage (SQLite) and configuration

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod storage;

pub use error::{Error, ErrorResponse, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::events::{Event, EventRecorder, NewEvent};
    pub use crate::domain::keys::{
        AccessKey, DeleteMode, KeyContext, KeyId, KeyLifecycleManager, KeyListing, KeyPayload,
        KeyQueryService, KeyRepository, KeyType, ProjectId, RetrieveQueryParams,
    };
    pub use crate::error::{Error, Result};
}
