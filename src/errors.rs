// src/errors.rs - Error taxonomy shared by detection, dismissal and merge
use thiserror::Error;

/// Errors surfaced by the dedup core.
///
/// Validation and conflict errors carry enough detail for a reviewer to act on
/// them and are never retried. Store failures are reported as transient; the
/// caller may retry the whole request.
#[derive(Debug, Error)]
pub enum DedupError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("entity not found: {id}")]
    NotFound { id: String },

    #[error("conflict on entity {id}: {reason}")]
    Conflict { id: String, reason: String },

    #[error("storage unavailable: {message}")]
    TransientStore { message: String },

    #[error("integrity violation: {message}")]
    Integrity { message: String },
}

impl DedupError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn conflict(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientStore {
            message: message.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// HTTP-style status used by the CLI and any HTTP front end.
    pub fn status_code(&self) -> u16 {
        match self {
            DedupError::Validation { .. } => 400,
            DedupError::NotFound { .. } => 404,
            DedupError::Conflict { .. } => 409,
            DedupError::TransientStore { .. } => 503,
            DedupError::Integrity { .. } => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DedupError::Validation { .. } => "validation",
            DedupError::NotFound { .. } => "not_found",
            DedupError::Conflict { .. } => "conflict",
            DedupError::TransientStore { .. } => "transient_store",
            DedupError::Integrity { .. } => "integrity",
        }
    }
}

impl From<tokio_postgres::Error> for DedupError {
    fn from(e: tokio_postgres::Error) -> Self {
        DedupError::transient(e.to_string())
    }
}

impl From<bb8::RunError<tokio_postgres::Error>> for DedupError {
    fn from(e: bb8::RunError<tokio_postgres::Error>) -> Self {
        DedupError::transient(format!("connection pool: {}", e))
    }
}

pub type DedupResult<T> = std::result::Result<T, DedupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct_per_kind() {
        assert_eq!(DedupError::validation("same id").status_code(), 400);
        assert_eq!(DedupError::not_found("e1").status_code(), 404);
        assert_eq!(DedupError::conflict("e1", "already merged").status_code(), 409);
        assert_eq!(DedupError::transient("down").status_code(), 503);
        assert_eq!(DedupError::integrity("self loop").status_code(), 500);
    }

    #[test]
    fn test_conflict_message_names_entity() {
        let err = DedupError::conflict("fig-42", "entity is already deleted");
        assert_eq!(err.to_string(), "conflict on entity fig-42: entity is already deleted");
        assert_eq!(err.kind(), "conflict");
    }
}
