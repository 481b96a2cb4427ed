//! [`SessionHandle`] — the per-client handle onto a shared [`SessionCore`]
//! (spec.md §4.7, C7).

use std::sync::Arc;

use signon_access::CallerContext;
use signon_core::ids::{IdentityId, MechanismName};
use signon_core::PropertyMap;
use signon_events::{HandleEventBus, HandleEventReceiver};

use crate::cancel_key::CancelKey;
use crate::core::SessionCore;
use crate::error::{SessionError, SessionResult};
use crate::policy::UiPolicy;

/// A client's view onto a [`SessionCore`]. Multiple handles for the same
/// `(identity, method)` pair share one core and therefore one plugin
/// process and one request queue (spec.md §4.5 "one core per pair, many
/// handles").
pub struct SessionHandle {
    /// This handle's own name — the key events addressed to it are
    /// delivered under.
    name: String,
    core: Arc<SessionCore>,
    caller: CallerContext,
}

impl SessionHandle {
    /// Wrap `core` behind a handle named `name`, acting on behalf of
    /// `caller`.
    #[must_use]
    pub fn new(name: String, core: Arc<SessionCore>, caller: CallerContext) -> Self {
        Self { name, core, caller }
    }

    /// This handle's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The identity this handle's session currently dispatches against.
    pub async fn identity_id(&self) -> IdentityId {
        self.core.identity_id().await
    }

    /// `queryAvailableMechanisms(wanted)` (spec.md §4.7).
    #[must_use]
    pub fn query_available_mechanisms(&self, wanted: &[MechanismName]) -> Vec<MechanismName> {
        self.core.available_mechanisms(wanted)
    }

    /// `process(params, mechanism)` (spec.md §4.7, §4.5). Returns
    /// immediately with a cancel-key; the outcome arrives later as a
    /// [`signon_events::Signal::ProcessResult`] or
    /// [`signon_events::Signal::ProcessError`] on this handle.
    pub async fn process(
        &self,
        params: PropertyMap,
        mechanism: MechanismName,
        ui_policy: UiPolicy,
    ) -> SessionResult<CancelKey> {
        if !self.core.available_mechanisms(std::slice::from_ref(&mechanism)).contains(&mechanism) {
            return Err(SessionError::MechanismNotAvailable(mechanism));
        }
        Ok(self
            .core
            .enqueue(self.name.clone(), self.caller.clone(), params, mechanism, ui_policy)
            .await)
    }

    /// `cancel(cancel-key)` (spec.md §4.7, §5).
    pub async fn cancel(&self, key: CancelKey) {
        self.core.cancel(key).await;
    }

    /// `setId(identity-id)` — called once, right after a previously
    /// unsaved identity this session was opened against gets its first
    /// `store()` (spec.md §4.7, §8 scenario 4). Rekeying the daemon's
    /// unsaved-session registry entry to the new saved id is the
    /// daemon's responsibility, not this handle's.
    pub async fn set_id(&self, id: IdentityId) -> SessionResult<()> {
        if !self.core.identity_id().await.is_new() {
            return Err(SessionError::AlreadyPersisted);
        }
        self.core.set_identity_id(id).await;
        Ok(())
    }

    /// Subscribe to this handle's signal stream.
    #[must_use]
    pub fn subscribe(&self, bus: &HandleEventBus<String>) -> HandleEventReceiver {
        bus.subscribe(self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use signon_access::StrictGate;
    use signon_core::IdentityInfo;
    use signon_events::Signal;
    use signon_plugin::{PluginDriver, PluginResponse, PluginResult};
    use signon_storage::CredentialsDB;
    use signon_ui::{UIClient, UiResult};

    struct OneShotPlugin {
        method: signon_core::ids::MethodName,
        mechanisms: Vec<MechanismName>,
    }

    #[async_trait]
    impl PluginDriver for OneShotPlugin {
        fn method(&self) -> &signon_core::ids::MethodName {
            &self.method
        }

        fn mechanisms(&self) -> &[MechanismName] {
            &self.mechanisms
        }

        fn is_processing(&self) -> bool {
            false
        }

        async fn process(
            &self,
            _cancel_key: String,
            _params: PropertyMap,
            _mechanism: MechanismName,
        ) -> PluginResult<PluginResponse> {
            Ok(PluginResponse::Result(PropertyMap::new().with("UserName", "alice")))
        }

        async fn process_ui(&self, _cancel_key: String, _params: PropertyMap) -> PluginResult<PluginResponse> {
            unreachable!("this plugin never asks for UI")
        }

        async fn process_refresh(&self, _cancel_key: String, _params: PropertyMap) -> PluginResult<PluginResponse> {
            unreachable!("this plugin never asks for a refresh")
        }

        async fn cancel(&self) -> PluginResult<()> {
            Ok(())
        }

        async fn stop(&self) -> PluginResult<()> {
            Ok(())
        }
    }

    struct NullUi;

    #[async_trait]
    impl UIClient for NullUi {
        async fn query_dialog(&self, params: PropertyMap) -> UiResult<PropertyMap> {
            Ok(params)
        }

        async fn refresh_dialog(&self, params: PropertyMap) -> UiResult<PropertyMap> {
            Ok(params)
        }

        async fn cancel_ui_request(&self, _request_id: &str) {}
    }

    fn make_handle(id: IdentityId) -> (SessionHandle, Arc<HandleEventBus<String>>) {
        let plugin = Arc::new(OneShotPlugin {
            method: signon_core::ids::MethodName::from("sasl"),
            mechanisms: vec![MechanismName::from("PLAIN")],
        });
        let events = Arc::new(HandleEventBus::new());
        let core = Arc::new(SessionCore::new(
            id,
            signon_core::ids::MethodName::from("sasl"),
            plugin,
            Arc::new(CredentialsDB::in_memory()),
            Arc::new(NullUi),
            Arc::new(StrictGate),
            Arc::clone(&events),
        ));
        let handle = SessionHandle::new("handle-1".to_string(), core, CallerContext::default());
        (handle, events)
    }

    #[tokio::test]
    async fn rejects_unavailable_mechanism() {
        let (handle, _events) = make_handle(IdentityId::NEW);
        let err = handle
            .process(PropertyMap::new(), MechanismName::from("DIGEST-MD5"), UiPolicy::Default)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MechanismNotAvailable(_)));
    }

    #[tokio::test]
    async fn process_delivers_result_on_this_handles_events() {
        let (handle, events) = make_handle(IdentityId::NEW);
        let mut rx = handle.subscribe(&events);
        let key = handle
            .process(PropertyMap::new(), MechanismName::from("PLAIN"), UiPolicy::Default)
            .await
            .unwrap();

        let signal = rx.recv().await.unwrap();
        match signal {
            Signal::ProcessResult { cancel_key, .. } => assert_eq!(cancel_key, key.to_string()),
            other => panic!("expected ProcessResult, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn set_id_fails_once_already_saved() {
        let db = Arc::new(CredentialsDB::in_memory());
        let mut info = IdentityInfo::new();
        info.username = "alice".into();
        let id = db.insert(info).await.unwrap();

        let (handle, _events) = make_handle(id);
        let err = handle.set_id(IdentityId(id.0 + 1)).await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyPersisted));
    }

    #[tokio::test]
    async fn set_id_succeeds_for_an_unsaved_session() {
        let (handle, _events) = make_handle(IdentityId::NEW);
        handle.set_id(IdentityId(42)).await.unwrap();
        assert_eq!(handle.identity_id().await, IdentityId(42));
    }
}
