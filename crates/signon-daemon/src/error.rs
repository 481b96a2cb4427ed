//! Daemon-level error type: daemon-specific failures plus transparent
//! pass-through for every component error that can surface through the
//! control surface.

use signon_core::{ErrorKind, SignonError};
use thiserror::Error;

/// Errors the daemon itself can raise, distinct from the component
/// errors it forwards.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// `getAuthSession`/`getIdentity` with `id != 0` and no ACL rights
    /// for the caller (spec.md §6).
    #[error("caller is not permitted to use identity {0}")]
    PermissionDenied(u32),
    /// A control-surface call restricted to the keychain widget
    /// (`queryIdentities`, `clear`) was made by an ordinary caller.
    #[error("operation restricted to the keychain widget")]
    KeychainWidgetOnly,
    /// `registerNewIdentity`/`getAuthSession` race: the handle named in
    /// the request was already reaped by the inactivity sweep.
    #[error("handle '{0}' is no longer registered")]
    HandleExpired(String),
    /// Daemon initialisation failed (spec.md §6 "exit code 1").
    #[error("daemon initialisation failed: {0}")]
    Init(String),
    /// `setId` would collide with an already-registered `(id, method)`
    /// session (spec.md §4.7 "rejects collisions").
    #[error("a session for identity {0} and method '{1}' is already registered")]
    SessionIdCollision(u32, String),
    /// A credentials-store error, forwarded so `?` works directly against
    /// [`signon_storage::CredentialsDB`] calls in the control surface.
    #[error(transparent)]
    Storage(#[from] signon_storage::StorageError),
    /// A component error forwarded unchanged.
    #[error(transparent)]
    Signon(#[from] SignonError),
}

impl From<DaemonError> for SignonError {
    fn from(err: DaemonError) -> Self {
        match err {
            DaemonError::PermissionDenied(_) => SignonError::permission_denied(err.to_string()),
            DaemonError::KeychainWidgetOnly => SignonError::permission_denied(err.to_string()),
            DaemonError::HandleExpired(_) => SignonError::new(ErrorKind::IdentityNotFound, err.to_string()),
            DaemonError::Init(message) => SignonError::new(ErrorKind::InternalServer, message),
            DaemonError::SessionIdCollision(..) => SignonError::new(ErrorKind::WrongState, err.to_string()),
            DaemonError::Storage(inner) => inner.into(),
            DaemonError::Signon(inner) => inner,
        }
    }
}

/// Convenience alias for daemon-surface results.
pub type DaemonResult<T> = Result<T, DaemonError>;
