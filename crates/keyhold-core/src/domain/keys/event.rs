//! Access key audit events

use serde::{Deserialize, Serialize};

use crate::domain::events::NewEvent;

use super::entity::{KeyId, ProjectId};

/// Object type recorded on every key event
pub const KEY_OBJECT_TYPE: &str = "key";

/// Kind of key mutation being audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEventType {
    Created,
    Updated,
    Deleted,
}

impl KeyEventType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }

    /// Audit message for a key with the given name
    pub fn describe(&self, key_name: &str) -> String {
        format!("Access Key {} {}", key_name, self.as_str())
    }
}

impl std::fmt::Display for KeyEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the audit event for a key mutation
///
/// Note: only the name is recorded, never the secret.
pub fn key_event(event_type: KeyEventType, project_id: ProjectId, key_id: KeyId, key_name: &str) -> NewEvent {
    NewEvent::new(project_id, event_type.describe(key_name)).about(KEY_OBJECT_TYPE, key_id.0)
}
