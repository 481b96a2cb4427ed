//! [`UIClient`] — a thin async call wrapper to the external UI dialog
//! process (spec.md §4.9, C9).

use async_trait::async_trait;
use signon_core::PropertyMap;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

use crate::error::{UiError, UiResult};

/// A caller context opaque request id, matching the wire `requestId` key
/// used to correlate a dialog invocation with its eventual
/// `cancelUiRequest`.
pub type RequestId = String;

/// Three calls to the external UI dialog process (spec.md §4.9). All use
/// an effectively unbounded wait — interactive dialogs are driven by a
/// human, not a deadline; callers that want a bound wrap these in their
/// own `tokio::time::timeout`.
#[async_trait]
pub trait UIClient: Send + Sync {
    /// Show a dialog and wait for the user's reply.
    async fn query_dialog(&self, params: PropertyMap) -> UiResult<PropertyMap>;

    /// Ask an already-open dialog to refresh (e.g. a new captcha).
    async fn refresh_dialog(&self, params: PropertyMap) -> UiResult<PropertyMap>;

    /// Cancel an outstanding dialog by request id. Idempotent.
    async fn cancel_ui_request(&self, request_id: &str);
}

/// Validate a UI reply: every reply must carry the well-known error-code
/// field (spec.md §4.9: "Replies must include a well-known error-code
/// field; absence is treated as an internal error.").
pub fn require_error_code(reply: &PropertyMap) -> UiResult<()> {
    if reply.get(signon_core::keys::QUERY_ERROR_CODE).is_none() {
        return Err(UiError::MissingErrorCode);
    }
    Ok(())
}

/// A [`UIClient`] over a real dialog process transport. The transport is
/// injected as a closure so this type stays agnostic to how the daemon
/// actually talks to the dialog binary (D-Bus activation, a pipe, ...).
pub struct DialogProcessClient<F> {
    call: F,
    pending: Mutex<HashMap<RequestId, ()>>,
}

impl<F> DialogProcessClient<F>
where
    F: Fn(PropertyMap) -> UiResult<PropertyMap> + Send + Sync,
{
    /// Wrap a synchronous transport function. Production code will want
    /// an async transport; this indirection exists mainly so unit tests
    /// can supply a scripted reply without standing up a real process.
    pub fn new(call: F) -> Self {
        Self { call, pending: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl<F> UIClient for DialogProcessClient<F>
where
    F: Fn(PropertyMap) -> UiResult<PropertyMap> + Send + Sync,
{
    async fn query_dialog(&self, params: PropertyMap) -> UiResult<PropertyMap> {
        let reply = (self.call)(params)?;
        require_error_code(&reply)?;
        Ok(reply)
    }

    async fn refresh_dialog(&self, params: PropertyMap) -> UiResult<PropertyMap> {
        let reply = (self.call)(params)?;
        require_error_code(&reply)?;
        Ok(reply)
    }

    async fn cancel_ui_request(&self, request_id: &str) {
        let removed = self.pending.lock().expect("dialog client lock poisoned").remove(request_id);
        if removed.is_none() {
            warn!(request_id, "cancel_ui_request for an unknown or already-finished dialog");
        }
    }
}
