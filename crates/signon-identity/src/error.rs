//! Errors raised by [`crate::identity::Identity`].

use signon_core::ids::IdentityId;
use signon_core::{ErrorKind, SignonError};
use thiserror::Error;

/// Errors raised by identity-handle operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The identity has been removed, or never existed.
    #[error("identity {0} not found")]
    NotFound(IdentityId),

    /// The caller is neither an owner nor the keychain widget.
    #[error("caller is not authorised to modify this identity")]
    PermissionDenied,

    /// `store` would leave the record with no owners and an application-id
    /// caller.
    #[error("store would create an orphaned identity")]
    OrphanIdentity,

    /// `request_credentials_update` was called on an identity that doesn't
    /// persist its secret.
    #[error("identity does not store a secret to update")]
    SecretNotStored,

    /// The credentials-update or verify-user dialog failed or was
    /// rejected by the user.
    #[error("credentials dialog failed: {0}")]
    DialogFailed(String),

    /// The underlying credentials store failed.
    #[error(transparent)]
    Storage(#[from] signon_storage::StorageError),

    /// The driver task ended before answering this request — only
    /// possible if it panicked, since every queue branch replies before
    /// returning.
    #[error("identity driver closed without a reply")]
    Closed,
}

impl From<IdentityError> for SignonError {
    fn from(err: IdentityError) -> Self {
        if let IdentityError::Storage(inner) = err {
            return inner.into();
        }
        let kind = match &err {
            IdentityError::NotFound(_) => ErrorKind::IdentityNotFound,
            IdentityError::PermissionDenied => ErrorKind::PermissionDenied,
            IdentityError::OrphanIdentity => ErrorKind::StoreFailed,
            IdentityError::SecretNotStored => ErrorKind::StoreFailed,
            IdentityError::DialogFailed(_) => ErrorKind::OperationFailed,
            IdentityError::Closed => ErrorKind::InternalServer,
            IdentityError::Storage(_) => unreachable!("handled above"),
        };
        SignonError::new(kind, err.to_string())
    }
}

/// Result type for identity-handle operations.
pub type IdentityResult<T> = Result<T, IdentityError>;
