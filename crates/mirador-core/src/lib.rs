//! Mirador Core
//!
//! Core types for the Mirador control plane: catalog and RBAC entities,
//! the error taxonomy shared by every crate in the workspace, deterministic
//! entity identifiers, and input validation.

pub mod catalog;
pub mod ids;
pub mod rbac;
pub mod validation;

/// Errors that can occur in control-plane operations.
///
/// The API layer maps these onto HTTP statuses: `Validation` → 400,
/// `NotFound` → 404, `Denied` → 403, `Store` → 502, `EngineUnavailable`
/// → 503. `Cache` never reaches a client; callers swallow and count it.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("access denied: {0}")]
    Denied(String),

    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Validation error pointing at a specific request field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Not-found error for an entity kind and natural key.
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// True when the error should be retried against the store.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Store(_))
    }
}

/// Result type for control-plane operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_field() {
        let err = CoreError::validation("tenant_id", "must not be empty");
        match err {
            CoreError::Validation { field, message } => {
                assert_eq!(field, "tenant_id");
                assert_eq!(message, "must not be empty");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn transient_classification() {
        assert!(CoreError::Store("timeout".into()).is_transient());
        assert!(!CoreError::not_found("metric", "cpu").is_transient());
        assert!(!CoreError::validation("name", "bad").is_transient());
    }
}
