//! Access key domain module
//!
//! Manages the lifecycle of the credentials a project uses to reach its
//! infrastructure: SSH private keys and AWS, Google Cloud and DigitalOcean
//! API credentials.
//!
//! # Architecture
//!
//! - **Entities**: `AccessKey`, `KeyPayload`, `KeyCredential`, `Secret`
//! - **Rules**: `KeyValidator` (per-type checks), `SecretNormalizer`
//! - **Repository Trait**: `KeyRepository`
//! - **Services**: `KeyLifecycleManager` (create/update/delete),
//!   `KeyQueryService` (listing)
//! - **Context**: `KeyContext` resolves a key id within a project
//!
//! # Example
//!
//! ```ignore
//! use keyhold_core::domain::keys::{DeleteMode, KeyContext, KeyLifecycleManager, KeyPayload};
//!
//! let manager = KeyLifecycleManager::new(keys.clone(), events);
//!
//! let context = KeyContext::resolve(keys.as_ref(), project_id, key_id).await?;
//! match manager.delete(context.key(), DeleteMode::Hard).await {
//!     Err(err) if err.in_use() => manager.delete(context.key(), DeleteMode::Soft).await?,
//!     other => other?,
//! }
//! ```

pub mod context;
pub mod entity;
pub mod event;
pub mod query;
pub mod repository;
pub mod secret;
pub mod service;
pub mod validation;

pub use context::KeyContext;
pub use entity::{AccessKey, KeyCredential, KeyId, KeyPayload, KeyType, NewAccessKey, ProjectId, Secret};
pub use event::{key_event, KeyEventType, KEY_OBJECT_TYPE};
pub use query::{KeyListing, KeyQueryService};
pub use repository::{KeyRepository, KeyUsage, RetrieveQueryParams, SortField};
pub use secret::SecretNormalizer;
pub use service::{DeleteMode, KeyLifecycleManager};
pub use validation::{KeyValidator, ValidationError};
