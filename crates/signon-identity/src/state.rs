//! The state machine and operation queue backing [`crate::identity::Identity`]:
//! a tagged-variant state plus a single transition function in place of
//! per-state object slots.

use signon_access::CallerContext;
use signon_core::ids::IdentityId;
use signon_core::PropertyMap;
use tokio::sync::oneshot;

use crate::error::{IdentityError, IdentityResult};

/// Lifecycle state of an [`crate::identity::Identity`] handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityState {
    /// No cached info yet; the next operation triggers a fetch.
    NeedsRegistration,
    /// A fetch of the cached info is in flight.
    PendingRegistration,
    /// Cached info is current; operations run immediately.
    Ready,
    /// The cached info is stale (e.g. another handle just updated the
    /// record) and must be refreshed before the next operation runs.
    NeedsUpdate,
    /// The identity was removed. Sticky: every subsequent operation fails
    /// with `IdentityNotFound`.
    Removed,
}

/// One queued method invocation, carrying its own reply channel so the
/// driver loop stays generic over each operation's result type — the
/// "closure-like request descriptor" the spec calls for, expressed as a
/// tagged enum rather than a boxed `FnOnce` since every variant already
/// has concrete, known shape.
pub enum QueuedOp {
    /// `store(info)`.
    Store {
        /// The candidate record to persist.
        info: signon_core::IdentityInfo,
        /// The caller attempting the store.
        caller: CallerContext,
        /// Where to deliver the assigned/confirmed id.
        reply: oneshot::Sender<IdentityResult<signon_core::ids::IdentityId>>,
    },
    /// `request_credentials_update(message)`.
    RequestCredentialsUpdate {
        /// Message shown alongside the password-capture dialog.
        message: String,
        /// The calling context (forwarded to the dialog as context only).
        caller: CallerContext,
        reply: oneshot::Sender<IdentityResult<()>>,
    },
    /// `get_info()`.
    GetInfo {
        reply: oneshot::Sender<IdentityResult<PropertyMap>>,
    },
    /// `add_reference(name)`.
    AddReference {
        name: String,
        caller: CallerContext,
        reply: oneshot::Sender<IdentityResult<()>>,
    },
    /// `remove_reference(name)`.
    RemoveReference {
        name: String,
        caller: CallerContext,
        reply: oneshot::Sender<IdentityResult<()>>,
    },
    /// `verify_user(params)`.
    VerifyUser {
        params: PropertyMap,
        caller: CallerContext,
        reply: oneshot::Sender<IdentityResult<bool>>,
    },
    /// `verify_secret(secret)`.
    VerifySecret {
        secret: String,
        reply: oneshot::Sender<IdentityResult<bool>>,
    },
    /// `remove()`.
    Remove {
        caller: CallerContext,
        reply: oneshot::Sender<IdentityResult<()>>,
    },
    /// `sign_out()`.
    SignOut {
        caller: CallerContext,
        /// Name of the handle that issued the sign-out; excluded from the
        /// broadcast `infoUpdated(SignedOut)` so it doesn't re-handle its
        /// own request.
        initiator: String,
        reply: oneshot::Sender<IdentityResult<()>>,
    },
}

impl QueuedOp {
    /// Answer a queued op with `NotFound` — used to drain the queue once
    /// the identity has transitioned to `Removed`.
    pub(crate) fn fail_not_found(self, id: IdentityId) {
        let err = IdentityError::NotFound(id);
        match self {
            QueuedOp::Store { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            QueuedOp::RequestCredentialsUpdate { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            QueuedOp::GetInfo { reply } => {
                let _ = reply.send(Err(err));
            }
            QueuedOp::AddReference { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            QueuedOp::RemoveReference { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            QueuedOp::VerifyUser { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            QueuedOp::VerifySecret { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            QueuedOp::Remove { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            QueuedOp::SignOut { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}
