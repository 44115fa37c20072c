//! Error types for Keyhold

use serde::Serialize;
use thiserror::Error;

use crate::domain::keys::{KeyId, KeyUsage, ProjectId, ValidationError};

/// Result type alias using Keyhold's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Keyhold error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Access key {key_id} not found in project {project_id}.")]
    KeyNotFound { project_id: ProjectId, key_id: KeyId },

    #[error("Project {0} not found. Run `keyhold projects list` to see all projects.")]
    ProjectNotFound(ProjectId),

    // Validation errors (E100-E199)
    #[error("{0}")]
    ValidationFailed(#[from] ValidationError),

    // Conflict errors (E200-E299)
    #[error("Access key {key_id} is in use by {usage}")]
    KeyInUse { key_id: KeyId, usage: KeyUsage },

    // Audit errors (E300-E399)
    #[error("Failed to record audit event: {0}")]
    AuditWriteFailed(String),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::KeyNotFound { .. } => "E001",
            Self::ProjectNotFound(_) => "E002",
            Self::ValidationFailed(ValidationError::InvalidType(_)) => "E100",
            Self::ValidationFailed(ValidationError::EmptySecret) => "E101",
            Self::ValidationFailed(ValidationError::ProjectMismatch { .. }) => "E102",
            Self::KeyInUse { .. } => "E200",
            Self::AuditWriteFailed(_) => "E300",
            Self::DatabaseError(_) => "E400",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::KeyNotFound { project_id, .. } => {
                Some(format!("keyhold keys list --project {}", project_id))
            }
            Self::ProjectNotFound(_) => Some("keyhold projects list".to_string()),
            Self::ValidationFailed(ValidationError::InvalidType(_)) => {
                Some("Use one of: ssh, aws, gcloud, do".to_string())
            }
            Self::KeyInUse { .. } => Some(
                "Remove the references first, or soft-delete by dropping --hard".to_string(),
            ),
            _ => None,
        }
    }

    /// Whether the caller supplied something the core refuses to accept
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed(_)
                | Self::KeyInUse { .. }
                | Self::InvalidInput(_)
                | Self::KeyNotFound { .. }
                | Self::ProjectNotFound(_)
        )
    }

    /// Machine-readable flag: a hard delete was blocked by a dependent reference
    pub fn in_use(&self) -> bool {
        matches!(self, Self::KeyInUse { .. })
    }

    /// Render this error as an outward response body
    pub fn to_response(&self) -> ErrorResponse {
        let error = match self {
            Self::KeyInUse { .. } => "Access key is in use by one or more inventories, repositories or templates".to_string(),
            other => other.to_string(),
        };

        ErrorResponse {
            error,
            code: self.code(),
            in_use: self.in_use().then_some(true),
        }
    }
}

/// Serializable error body for transports that sit in front of the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(rename = "inUse", skip_serializing_if = "Option::is_none")]
    pub in_use: Option<bool>,
}
