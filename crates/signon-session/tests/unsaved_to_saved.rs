//! End-to-end coverage for spec.md §8 scenario 4: a `process` enqueued
//! against an unsaved identity must dispatch against whatever id
//! `set_id` assigns before the plugin replies, and persist its result
//! against that id rather than against `NEW`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use signon_access::{CallerContext, StrictGate};
use signon_core::ids::{IdentityId, MechanismName, MethodName};
use signon_core::PropertyMap;
use signon_events::{HandleEventBus, Signal};
use signon_plugin::{PluginDriver, PluginResponse, PluginResult};
use signon_session::{CancelKey, SessionCore, SessionHandle, UiPolicy};
use signon_storage::CredentialsDB;
use signon_test::NullUi;

/// Replies after a short delay so the test can call `set_id` while the
/// request is still queued, mirroring the plugin taking real wall-clock
/// time to answer.
struct DelayedPlugin {
    method: MethodName,
    mechanisms: Vec<MechanismName>,
    delay: Duration,
}

#[async_trait]
impl PluginDriver for DelayedPlugin {
    fn method(&self) -> &MethodName {
        &self.method
    }

    fn mechanisms(&self) -> &[MechanismName] {
        &self.mechanisms
    }

    fn is_processing(&self) -> bool {
        false
    }

    async fn process(&self, _cancel_key: String, _params: PropertyMap, _mechanism: MechanismName) -> PluginResult<PluginResponse> {
        tokio::time::sleep(self.delay).await;
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

#[tokio::test]
async fn process_enqueued_before_store_dispatches_against_the_assigned_id() {
    let db = Arc::new(CredentialsDB::in_memory());
    let plugin = Arc::new(DelayedPlugin {
        method: MethodName::from("sasl"),
        mechanisms: vec![MechanismName::from("PLAIN")],
        delay: Duration::from_millis(60),
    });
    let events = Arc::new(HandleEventBus::new());
    let core = Arc::new(SessionCore::new(
        IdentityId::NEW,
        MethodName::from("sasl"),
        plugin,
        Arc::clone(&db),
        Arc::new(NullUi),
        Arc::new(StrictGate),
        Arc::clone(&events),
    ));
    let handle = SessionHandle::new("handle-1".to_string(), Arc::clone(&core), CallerContext::with_app_token("com.example.app"));
    let mut rx = handle.subscribe(&events);

    let key: CancelKey = handle
        .process(PropertyMap::new(), MechanismName::from("PLAIN"), UiPolicy::Default)
        .await
        .unwrap();

    // The request is in flight against the plugin's 60ms delay; store the
    // identity now, while it's still queued.
    let stored = signon_test::test_identity("com.example.app");
    let id = db.insert(stored).await.unwrap();
    handle.set_id(id).await.unwrap();

    let signal = rx.recv().await.unwrap();
    match signal {
        Signal::ProcessResult { cancel_key, .. } => assert_eq!(cancel_key, key.to_string()),
        other => panic!("expected ProcessResult, got {other:?}"),
    }

    assert_eq!(core.identity_id().await, id);
    // RESULT handling persisted against the now-saved id, not against NEW.
    let info = db.credentials(id, true).await.unwrap();
    assert!(info.validated);
}
