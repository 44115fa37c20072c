//! Secret normalization
//!
//! SSH tooling downstream is sensitive to how key material is terminated,
//! so every freshly supplied secret is stored with exactly one trailing
//! newline.

use super::entity::Secret;

/// Canonicalizes secret payloads before persistence
pub struct SecretNormalizer;

impl SecretNormalizer {
    /// Strip trailing whitespace and terminate with a single `\n`
    ///
    /// Idempotent: normalizing an already normalized secret returns it
    /// unchanged.
    pub fn normalize(secret: &Secret) -> Secret {
        if Self::is_normalized(secret) {
            return secret.clone();
        }

        let trimmed = secret.as_str().trim_end();
        let mut normalized = String::with_capacity(trimmed.len() + 1);
        normalized.push_str(trimmed);
        normalized.push('\n');
        Secret::new(normalized)
    }

    /// Whether `secret` is already in canonical form
    pub fn is_normalized(secret: &Secret) -> bool {
        let s = secret.as_str();
        s.ends_with('\n') && s.trim_end().len() + 1 == s.len()
    }
}
