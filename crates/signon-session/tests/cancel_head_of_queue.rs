//! End-to-end coverage for spec.md §8 scenario 3: cancelling the
//! in-flight (head-of-queue) request forwards to the plugin and the
//! client still only observes one `SessionCanceled` event, never a
//! `RESULT` for that key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use signon_access::{CallerContext, StrictGate};
use signon_core::ids::{IdentityId, MechanismName, MethodName};
use signon_core::{ErrorKind, PropertyMap};
use signon_events::{HandleEventBus, Signal};
use signon_plugin::{PluginDriver, PluginResponse, PluginResult, CANCELED_ERROR_CODE};
use signon_session::{SessionCore, SessionHandle, UiPolicy};
use signon_storage::CredentialsDB;
use signon_test::NullUi;

/// Honors `cancel()` by making the in-flight `process()` return a
/// canceled-error reply instead of its scripted result, the way a real
/// plugin's cancellation race resolves.
struct CancelableSlowPlugin {
    method: MethodName,
    mechanisms: Vec<MechanismName>,
    canceled: AtomicBool,
}

#[async_trait]
impl PluginDriver for CancelableSlowPlugin {
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
        tokio::time::sleep(Duration::from_millis(80)).await;
        if self.canceled.load(Ordering::SeqCst) {
            Ok(PluginResponse::Error { code: CANCELED_ERROR_CODE, message: "canceled".into() })
        } else {
            Ok(PluginResponse::Result(PropertyMap::new()))
        }
    }

    async fn process_ui(&self, _cancel_key: String, _params: PropertyMap) -> PluginResult<PluginResponse> {
        unreachable!("this plugin never asks for UI")
    }

    async fn process_refresh(&self, _cancel_key: String, _params: PropertyMap) -> PluginResult<PluginResponse> {
        unreachable!("this plugin never asks for a refresh")
    }

    async fn cancel(&self) -> PluginResult<()> {
        self.canceled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> PluginResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn canceling_the_in_flight_request_yields_exactly_one_session_canceled() {
    let plugin = Arc::new(CancelableSlowPlugin {
        method: MethodName::from("sasl"),
        mechanisms: vec![MechanismName::from("PLAIN")],
        canceled: AtomicBool::new(false),
    });
    let events = Arc::new(HandleEventBus::new());
    let core = Arc::new(SessionCore::new(
        IdentityId::NEW,
        MethodName::from("sasl"),
        plugin,
        Arc::new(CredentialsDB::in_memory()),
        Arc::new(NullUi),
        Arc::new(StrictGate),
        Arc::clone(&events),
    ));
    let handle = SessionHandle::new("handle-1".to_string(), Arc::clone(&core), CallerContext::default());
    let mut rx = handle.subscribe(&events);

    let key = handle
        .process(PropertyMap::new(), MechanismName::from("PLAIN"), UiPolicy::Default)
        .await
        .unwrap();

    // Give the dispatch loop a moment to actually send PROCESS before
    // cancelling, so this exercises the head-of-queue path rather than
    // racing the enqueue.
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.cancel(key).await;

    let signal = rx.recv().await.unwrap();
    match signal {
        Signal::ProcessError { cancel_key, kind, .. } => {
            assert_eq!(cancel_key, key.to_string());
            assert_eq!(kind, ErrorKind::SessionCanceled);
        }
        other => panic!("expected ProcessError(SessionCanceled), got {other:?}"),
    }

    // Exactly one event: nothing else should follow for this key.
    assert!(tokio::time::timeout(Duration::from_millis(50), rx.recv()).await.is_err());
}
