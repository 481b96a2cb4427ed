//! Errors from encrypted-volume management.

use thiserror::Error;

/// Errors raised by [`crate::volume::CryptoVolume`].
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A helper command (`losetup`, `cryptsetup`, `mkfs.*`) failed.
    #[error("command `{command}` failed: {detail}")]
    CommandFailed {
        /// The command that was run.
        command: String,
        /// stderr or a synthesised description.
        detail: String,
    },

    /// A raw I/O error (creating the backing file, the mount directory, ...).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested operation is invalid for the volume's current state.
    #[error("invalid volume state: expected {expected}, was {actual}")]
    WrongState {
        /// The state required for the operation.
        expected: String,
        /// The state the volume was actually in.
        actual: String,
    },

    /// A key-slot operation failed (add/remove/probe).
    #[error("key slot operation failed: {0}")]
    KeySlot(String),

    /// The mount/unmount syscall failed.
    #[error("mount operation failed: {0}")]
    Mount(String),
}

impl From<CryptoError> for signon_core::SignonError {
    fn from(err: CryptoError) -> Self {
        signon_core::SignonError::new(signon_core::ErrorKind::EncryptionFailed, err.to_string())
    }
}

/// Result type for encrypted-volume operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
