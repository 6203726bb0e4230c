use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ShalaError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Class not found: {0}")]
    ClassNotFound(Uuid),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("No registration for student '{student_id}' in class {class_id}")]
    RegistrationNotFound { class_id: Uuid, student_id: String },

    #[error("Class {0} is full")]
    ClassFull(Uuid),

    #[error("Class {0} still has active registrations")]
    ClassNotEmpty(Uuid),

    /// The class scope changed between snapshot and commit.
    #[error("Concurrent update on class {0}")]
    Conflict(Uuid),

    #[error("Too many concurrent updates on class {class_id} (gave up after {attempts} attempts)")]
    ConcurrencyExhausted { class_id: Uuid, attempts: usize },
}

impl ShalaError {
    /// Returns `true` when the failed operation should be re-run from its
    /// snapshot read. Only commit conflicts qualify.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` when the caller may reasonably submit the same request
    /// again later (e.g. after a contention burst).
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::ConcurrencyExhausted { .. })
    }

    /// Returns `true` for lookup failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ClassNotFound(_) | Self::SessionNotFound(_) | Self::RegistrationNotFound { .. }
        )
    }
}

impl From<rusqlite::Error> for ShalaError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShalaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_transient() {
        let err = ShalaError::Conflict(Uuid::now_v7());
        assert!(err.is_transient());
        assert!(err.is_retriable());
    }

    #[test]
    fn test_exhausted_is_retriable_but_not_transient() {
        let err = ShalaError::ConcurrencyExhausted {
            class_id: Uuid::now_v7(),
            attempts: 10,
        };
        assert!(!err.is_transient());
        assert!(err.is_retriable());
        assert!(err.to_string().contains("10 attempts"));
    }

    #[test]
    fn test_class_full_is_permanent() {
        let err = ShalaError::ClassFull(Uuid::now_v7());
        assert!(!err.is_transient());
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_storage_error_not_transient() {
        let err = ShalaError::Storage("disk I/O error".into());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_not_found_variants() {
        assert!(ShalaError::ClassNotFound(Uuid::now_v7()).is_not_found());
        assert!(ShalaError::SessionNotFound(Uuid::now_v7()).is_not_found());
        assert!(ShalaError::RegistrationNotFound {
            class_id: Uuid::now_v7(),
            student_id: "s1".into(),
        }
        .is_not_found());
        assert!(!ShalaError::ClassNotEmpty(Uuid::now_v7()).is_not_found());
    }

    #[test]
    fn test_rusqlite_error_maps_to_storage() {
        let err: ShalaError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, ShalaError::Storage(_)));
    }
}
