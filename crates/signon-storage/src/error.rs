//! Errors from the credentials store.

use signon_core::ids::IdentityId;
use thiserror::Error;

/// Errors raised by [`crate::db::CredentialsDB`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// No identity with the given id.
    #[error("identity {0} not found")]
    NotFound(IdentityId),

    /// A persisted identity would end up with no owners and an
    /// application-id caller (spec.md I1).
    #[error("identity would have no owners")]
    OrphanIdentity,

    /// The secrets store (mounted volume) isn't available right now.
    #[error("secrets store unavailable")]
    SecretsUnavailable,

    /// The underlying file I/O failed.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    /// (De)serialising a persisted record failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for signon_core::SignonError {
    fn from(err: StorageError) -> Self {
        use signon_core::ErrorKind;
        let kind = match &err {
            StorageError::NotFound(_) => ErrorKind::IdentityNotFound,
            StorageError::OrphanIdentity => ErrorKind::StoreFailed,
            StorageError::SecretsUnavailable => ErrorKind::CredentialsNotAvailable,
            StorageError::Io(_) | StorageError::Serialization(_) => ErrorKind::InternalServer,
        };
        signon_core::SignonError::new(kind, err.to_string())
    }
}

/// Result type for credentials-store operations.
pub type StorageResult<T> = Result<T, StorageError>;
