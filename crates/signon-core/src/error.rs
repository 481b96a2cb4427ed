//! The error taxonomy every `signond` component surfaces into (spec.md §7).

use thiserror::Error;

/// The kind of a `signond` error, independent of the message text.
///
/// This mirrors the `SignOn::Error` code enumeration the client library
/// and plugins already agree on; the variants are the contract, not an
/// implementation detail, so they must not be renamed casually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Catch-all for conditions with no dedicated code.
    Unknown,
    /// The daemon itself hit an unexpected internal condition.
    InternalServer,
    /// IPC to a plugin or the UI dialog broke down.
    InternalCommunication,
    /// The caller is not authorised for the requested operation.
    PermissionDenied,
    /// No plugin implements the requested method.
    MethodNotKnown,
    /// The service required for this operation isn't available right now.
    ServiceNotAvailable,
    /// The query parameters were malformed.
    InvalidQuery,
    /// The method exists but isn't usable in the current configuration.
    MethodNotAvailable,
    /// No identity exists with the given id.
    IdentityNotFound,
    /// `store` failed.
    StoreFailed,
    /// `remove` failed.
    RemoveFailed,
    /// `sign_out` failed.
    SignOutFailed,
    /// An identity-level operation was cancelled.
    IdentityOperationCanceled,
    /// Credentials are not available (secure storage locked/absent).
    CredentialsNotAvailable,
    /// The requested mechanism isn't offered by this method's plugin.
    MechanismNotAvailable,
    /// Required input parameters were missing.
    MissingData,
    /// The supplied credentials didn't check out.
    InvalidCredentials,
    /// The operation isn't valid in the object's current state.
    WrongState,
    /// The operation is recognised but not supported by this build.
    OperationNotSupported,
    /// No connection to the network/service.
    NoConnection,
    /// A network-layer failure.
    Network,
    /// A TLS/SSL failure.
    Ssl,
    /// A plugin runtime failure.
    Runtime,
    /// A queued session operation was cancelled.
    SessionCanceled,
    /// The operation timed out.
    TimedOut,
    /// User interaction was required but is disallowed by policy.
    UserInteraction,
    /// The operation failed for a reason not otherwise classified.
    OperationFailed,
    /// An encryption/decryption operation failed.
    EncryptionFailed,
    /// The terms of service were not accepted.
    TOSNotAccepted,
    /// The user asked to recover a forgotten password.
    ForgotPassword,
    /// A user-defined error in the range beginning at `USER_ERROR_OFFSET`.
    User(u32),
}

/// Offset at which user-defined error codes begin, per spec.md §7.
pub const USER_ERROR_OFFSET: u32 = 400;

impl ErrorKind {
    /// The wire code for this kind (`code:message` pairs cross the IPC
    /// boundary; this is the `code` half).
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::InternalServer => 1,
            Self::InternalCommunication => 2,
            Self::PermissionDenied => 3,
            Self::MethodNotKnown => 4,
            Self::ServiceNotAvailable => 5,
            Self::InvalidQuery => 6,
            Self::MethodNotAvailable => 7,
            Self::IdentityNotFound => 8,
            Self::StoreFailed => 9,
            Self::RemoveFailed => 10,
            Self::SignOutFailed => 11,
            Self::IdentityOperationCanceled => 12,
            Self::CredentialsNotAvailable => 13,
            Self::MechanismNotAvailable => 14,
            Self::MissingData => 15,
            Self::InvalidCredentials => 16,
            Self::WrongState => 17,
            Self::OperationNotSupported => 18,
            Self::NoConnection => 19,
            Self::Network => 20,
            Self::Ssl => 21,
            Self::Runtime => 22,
            Self::SessionCanceled => 23,
            Self::TimedOut => 24,
            Self::UserInteraction => 25,
            Self::OperationFailed => 26,
            Self::EncryptionFailed => 27,
            Self::TOSNotAccepted => 28,
            Self::ForgotPassword => 29,
            Self::User(code) => USER_ERROR_OFFSET + code,
        }
    }
}

/// A structured `signond` error: a stable `ErrorKind` plus a human-readable
/// message, the pair that crosses every daemon/client/plugin boundary.
#[derive(Debug, Clone, Error)]
#[error("{kind:?} ({code}): {message}", code = kind.code())]
pub struct SignonError {
    /// The error's kind/code.
    pub kind: ErrorKind,
    /// A human-readable description.
    pub message: String,
}

impl SignonError {
    /// Build a new error from a kind and a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`ErrorKind::IdentityNotFound`].
    #[must_use]
    pub fn identity_not_found(id: crate::ids::IdentityId) -> Self {
        Self::new(ErrorKind::IdentityNotFound, format!("no such identity: {id}"))
    }

    /// Shorthand for [`ErrorKind::PermissionDenied`].
    #[must_use]
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, reason)
    }

    /// Shorthand for [`ErrorKind::WrongState`].
    #[must_use]
    pub fn wrong_state(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::WrongState, reason)
    }
}

/// Result type used throughout `signond`.
pub type SignonResult<T> = Result<T, SignonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_error_codes_start_at_offset() {
        assert_eq!(ErrorKind::User(0).code(), USER_ERROR_OFFSET);
        assert_eq!(ErrorKind::User(5).code(), USER_ERROR_OFFSET + 5);
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = SignonError::new(ErrorKind::IdentityNotFound, "id 7 unknown");
        let text = err.to_string();
        assert!(text.contains("IdentityNotFound"));
        assert!(text.contains("id 7 unknown"));
    }
}
