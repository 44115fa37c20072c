//! Access key validation
//!
//! Per-type structural rules a candidate key must satisfy before anything
//! is persisted. Pure functions, no I/O.

use thiserror::Error;

use super::entity::{KeyCredential, KeyPayload, KeyType, ProjectId, Secret};

/// Reasons a candidate key is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid key type")]
    InvalidType(String),

    #[error("SSH Secret empty")]
    EmptySecret,

    #[error("Project ID in body and URL must be the same")]
    ProjectMismatch {
        expected: ProjectId,
        actual: Option<ProjectId>,
    },
}

/// Validator for access key payloads
pub struct KeyValidator;

impl KeyValidator {
    /// Validate a key type together with the secret it will carry
    ///
    /// Rules:
    /// - The type must be one of `ssh`, `aws`, `gcloud`, `do`
    /// - `ssh` keys need a non-empty secret
    /// - Cloud credentials are opaque; any secret (or none) is accepted
    ///
    /// An empty secret is treated as absent.
    pub fn validate(key_type: &str, secret: Option<Secret>) -> Result<KeyCredential, ValidationError> {
        let key_type: KeyType = key_type.parse()?;
        let secret = secret.filter(|s| !s.is_empty());

        match key_type {
            KeyType::Ssh => secret
                .map(|private_key| KeyCredential::Ssh { private_key })
                .ok_or(ValidationError::EmptySecret),
            KeyType::Aws => Ok(KeyCredential::Aws { secret }),
            KeyType::GCloud => Ok(KeyCredential::GCloud { secret }),
            KeyType::DigitalOcean => Ok(KeyCredential::DigitalOcean { secret }),
        }
    }

    /// Validate a payload as submitted, using only the secret it supplies
    pub fn validate_payload(payload: &KeyPayload) -> Result<KeyCredential, ValidationError> {
        Self::validate(&payload.key_type, payload.supplied_secret().cloned())
    }

    /// Check that a create payload targets the project it is submitted under
    ///
    /// A payload without a project id never matches.
    pub fn validate_project(payload: &KeyPayload, project_id: ProjectId) -> Result<(), ValidationError> {
        match payload.project_id {
            Some(id) if id == project_id => Ok(()),
            actual => Err(ValidationError::ProjectMismatch {
                expected: project_id,
                actual,
            }),
        }
    }
}
