//! Domain layer
//!
//! Contains the core business logic and domain models.

pub mod events;
pub mod keys;
pub mod projects;
