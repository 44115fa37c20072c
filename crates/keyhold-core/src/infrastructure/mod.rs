//! Infrastructure layer
//!
//! SQLite and in-memory implementations of the domain repository traits.

pub mod events;
pub mod keys;
pub mod projects;
