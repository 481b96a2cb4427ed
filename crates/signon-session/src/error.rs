//! Errors raised directly by `signon-session` (most failures instead flow
//! through [`signon_core::SignonError`] via events, since `process`
//! outcomes are delivered asynchronously rather than returned).

use signon_core::ids::MechanismName;
use signon_core::{ErrorKind, SignonError};
use thiserror::Error;

/// Errors raised by [`crate::core::SessionCore`]/[`crate::handle::SessionHandle`]
/// synchronously, i.e. before a request is even enqueued.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The requested mechanism isn't offered by this session's plugin.
    #[error("mechanism {0:?} is not available for this method")]
    MechanismNotAvailable(MechanismName),

    /// `set_id` was called on a session whose identity is already saved.
    #[error("set_id is only valid on a session for an unsaved identity")]
    AlreadyPersisted,
}

impl From<SessionError> for SignonError {
    fn from(err: SessionError) -> Self {
        let kind = match &err {
            SessionError::MechanismNotAvailable(_) => ErrorKind::MechanismNotAvailable,
            SessionError::AlreadyPersisted => ErrorKind::WrongState,
        };
        SignonError::new(kind, err.to_string())
    }
}

/// Result type for synchronous `signon-session` operations.
pub type SessionResult<T> = Result<T, SessionError>;
