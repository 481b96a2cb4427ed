//! [`SessionSinkRelay`] — breaks the construction-order cycle between a
//! [`PluginProxy`] and the [`SessionCore`] it reports `STATUS`/`STORE`
//! notices to.
//!
//! `PluginProxy::spawn` needs a live `Arc<dyn PluginSideEffectSink>`
//! before a `SessionCore` can exist to be that sink — a `SessionCore` is
//! constructed *from* an already-running proxy. The relay is handed to
//! `spawn` first, empty; once the `SessionCore` is built around the
//! returned proxy, the daemon binds the relay to it. Notices arriving in
//! the short window before binding are simply dropped, matching
//! [`NullSink`](signon_plugin::NullSink)'s treatment of the
//! startup handshake, which carries no session context either.

use std::sync::{OnceLock, Weak};

use async_trait::async_trait;
use signon_core::PropertyMap;
use signon_plugin::PluginSideEffectSink;
use signon_session::SessionCore;
use tracing::debug;

/// A `PluginSideEffectSink` that forwards to a `SessionCore` bound after
/// construction.
#[derive(Default)]
pub struct SessionSinkRelay {
    target: OnceLock<Weak<SessionCore>>,
}

impl SessionSinkRelay {
    /// A relay with no bound target yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the relay to `core`. Only the first call has any effect —
    /// a relay is bound exactly once, immediately after its
    /// `SessionCore` is constructed.
    pub fn bind(&self, core: Weak<SessionCore>) {
        let _ = self.target.set(core);
    }
}

#[async_trait]
impl PluginSideEffectSink for SessionSinkRelay {
    async fn on_status(&self, state: u32, message: String) {
        match self.target.get().and_then(Weak::upgrade) {
            Some(core) => core.on_status(state, message).await,
            None => debug!("dropping STATUS notice: relay not yet bound to a session core"),
        }
    }

    async fn on_store(&self, params: PropertyMap) {
        match self.target.get().and_then(Weak::upgrade) {
            Some(core) => core.on_store(params).await,
            None => debug!("dropping STORE notice: relay not yet bound to a session core"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unbound_relay_drops_notices_without_panicking() {
        let relay = SessionSinkRelay::new();
        relay.on_status(1, "hello".into()).await;
        relay.on_store(PropertyMap::new()).await;
    }
}
