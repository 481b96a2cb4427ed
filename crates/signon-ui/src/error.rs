//! Errors raised while talking to the UI dialog process.

use signon_core::{ErrorKind, SignonError};
use thiserror::Error;

/// Failure modes for a [`crate::client::UIClient`] call.
#[derive(Debug, Error)]
pub enum UiError {
    /// The dialog process could not be reached at all.
    #[error("UI dialog process unreachable: {0}")]
    Unreachable(String),

    /// The dialog reply carried no well-known error-code field
    /// (spec.md §4.9: absence is treated as an internal error).
    #[error("UI dialog reply is missing its error-code field")]
    MissingErrorCode,

    /// The reply's error-code field was non-zero.
    #[error("UI dialog reported error code {0}")]
    DialogReported(i64),

    /// The caller cancelled before the dialog replied.
    #[error("UI dialog request was cancelled")]
    Cancelled,
}

/// Shorthand for a [`UiError`]-producing result.
pub type UiResult<T> = Result<T, UiError>;

impl From<UiError> for SignonError {
    fn from(err: UiError) -> Self {
        let kind = match &err {
            UiError::Unreachable(_) => ErrorKind::InternalCommunication,
            UiError::MissingErrorCode => ErrorKind::InternalServer,
            UiError::DialogReported(_) => ErrorKind::UserInteraction,
            UiError::Cancelled => ErrorKind::SessionCanceled,
        };
        SignonError::new(kind, err.to_string())
    }
}
