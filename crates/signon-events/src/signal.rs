//! Signals delivered on Identity and Session handles.

use signon_core::ErrorKind;

/// The `kind` argument of an Identity handle's `infoUpdated` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoUpdatedKind {
    /// The record was stored (created or updated) by its owner.
    Stored,
    /// A per-method data blob attached to the record changed.
    DataUpdated,
    /// The record was removed. Delivered to every handle sharing the id.
    Removed,
    /// The record's per-method secrets were cleared. Delivered to every
    /// handle sharing the id.
    SignedOut,
}

/// A signal emitted on a handle. Delivery is per-handle FIFO: events from
/// the daemon to a client observe the order they were produced in.
#[derive(Debug, Clone)]
pub enum Signal {
    /// Identity handle: the record's info changed.
    InfoUpdated(InfoUpdatedKind),
    /// Identity or Session handle: the underlying resource is gone —
    /// either removed, or the daemon is shutting the handle down.
    Unregistered,
    /// Session handle: the session's authentication state machine
    /// advanced.
    StateChanged {
        /// Plugin-defined state name.
        state: String,
        /// Human-readable progress message.
        message: String,
    },
    /// Delivered to every live handle on a global fault. Global events
    /// such as removal or sign-out go to all handles, not just the
    /// handle that initiated them.
    Error {
        /// The error kind.
        kind: ErrorKind,
        /// The error message.
        message: String,
    },
    /// Session handle: the `process` operation identified by `cancel_key`
    /// completed successfully. Delivered to the handle that originally
    /// enqueued it, never broadcast.
    ProcessResult {
        /// The cancel-key returned by the original `process` call.
        cancel_key: String,
        /// The plugin's reply parameters (secret stripped unless the
        /// method is `password`).
        params: signon_core::PropertyMap,
    },
    /// Session handle: the `process` operation identified by `cancel_key`
    /// failed or was cancelled.
    ProcessError {
        /// The cancel-key returned by the original `process` call.
        cancel_key: String,
        /// The error's kind.
        kind: ErrorKind,
        /// A human-readable description.
        message: String,
    },
    /// Identity handle: `store` finished persisting the record.
    CredentialsStored {
        /// The identity's (possibly newly assigned) id.
        id: u32,
    },
    /// Identity handle: `add_reference` finished.
    ReferenceAdded {
        /// The reference name that was added.
        name: String,
    },
    /// Identity handle: `remove_reference` finished.
    ReferenceRemoved {
        /// The reference name that was removed.
        name: String,
    },
    /// Identity handle: `verify_user` finished.
    UserVerified {
        /// Whether the entered secret matched.
        matched: bool,
    },
    /// Identity handle: `verify_secret` finished.
    SecretVerified {
        /// Whether the supplied secret matched.
        matched: bool,
    },
}
