//! Side-effect callbacks for the two plugin response tags that are not
//! part of a call's terminal reply (spec.md §4.4's `STATUS`/`STORE` tags).

use async_trait::async_trait;
use signon_core::PropertyMap;

/// Receives `STATUS`/`STORE` notices a plugin may emit while an operation
/// is in flight, ahead of (or instead of) its terminal
/// `RESULT`/`ERROR`/`UI`/`REFRESHED` reply. `SessionCore` implements this
/// to forward `STATUS` as a `stateChanged` signal on the owning handles
/// and to write `STORE` payloads through `signon-storage`.
#[async_trait]
pub trait PluginSideEffectSink: Send + Sync {
    /// `STATUS(state, message)`.
    async fn on_status(&self, state: u32, message: String);

    /// `STORE(params)` — persist `params` against the current
    /// `(identity, method)`.
    async fn on_store(&self, params: PropertyMap);
}

/// A sink that drops everything. Used for the startup handshake
/// (`TYPE`/`MECHANISMS` queries), where no session context exists yet to
/// route a notice to.
pub struct NullSink;

#[async_trait]
impl PluginSideEffectSink for NullSink {
    async fn on_status(&self, _state: u32, _message: String) {}
    async fn on_store(&self, _params: PropertyMap) {}
}
