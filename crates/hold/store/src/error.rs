use hold_types::{CargoKey, InvalidName, InvalidVersion, NamespaceName, SpecKey};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store-layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("namespace not found: {0}")]
    NamespaceNotFound(NamespaceName),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("in use: {0}")]
    InUse(String),

    #[error("spec {spec_key} belongs to {owner}, not to cargo {cargo_key}")]
    SpecMismatch {
        spec_key: SpecKey,
        cargo_key: CargoKey,
        owner: CargoKey,
    },

    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Only a lost optimistic race may be retried transparently.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::VersionConflict(_))
    }

    pub fn cargo_not_found(key: &CargoKey) -> Self {
        StoreError::NotFound(format!("cargo {key}"))
    }

    pub fn spec_not_found(key: &SpecKey) -> Self {
        StoreError::NotFound(format!("spec {key}"))
    }
}

impl From<InvalidName> for StoreError {
    fn from(err: InvalidName) -> Self {
        StoreError::InvalidInput(err.to_string())
    }
}

impl From<InvalidVersion> for StoreError {
    fn from(err: InvalidVersion) -> Self {
        StoreError::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_version_conflict_is_retryable() {
        assert!(StoreError::VersionConflict("lost race".into()).is_retryable());
        assert!(!StoreError::NotFound("cargo web.demo".into()).is_retryable());
        assert!(!StoreError::ForeignKeyViolation("namespace".into()).is_retryable());
    }

    #[test]
    fn test_invalid_name_maps_to_invalid_input() {
        let err: StoreError = NamespaceName::parse("").unwrap_err().into();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }
}
