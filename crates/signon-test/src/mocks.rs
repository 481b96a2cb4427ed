//! Test doubles for the traits crossing `signond`'s process boundaries:
//! [`UIClient`], [`PluginDriver`] and [`PluginSideEffectSink`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use signon_core::ids::{MechanismName, MethodName};
use signon_core::PropertyMap;
use signon_plugin::{PluginDriver, PluginResponse, PluginResult, PluginSideEffectSink};
use signon_ui::{UIClient, UiResult};
use tokio::sync::Mutex;

/// A [`UIClient`] that echoes back whatever params it was given — enough
/// for tests where the plugin under test never actually triggers a
/// dialog, but the type still needs a live `Arc<dyn UIClient>`.
pub struct NullUi;

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

/// A [`UIClient`] that always replies with a fixed `UserName`/`Secret`
/// pair, simulating a user who immediately enters credentials into
/// whatever dialog a plugin asks for.
pub struct PasswordUi {
    username: String,
    secret: String,
}

impl PasswordUi {
    /// A dialog double that always answers with `username`/`secret`.
    #[must_use]
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { username: username.into(), secret: secret.into() }
    }
}

#[async_trait]
impl UIClient for PasswordUi {
    async fn query_dialog(&self, _params: PropertyMap) -> UiResult<PropertyMap> {
        Ok(PropertyMap::new()
            .with(signon_core::keys::USER_NAME, self.username.clone())
            .with(signon_core::keys::SECRET, self.secret.clone())
            .with(signon_core::keys::QUERY_ERROR_CODE, 0))
    }

    async fn refresh_dialog(&self, params: PropertyMap) -> UiResult<PropertyMap> {
        Ok(params.with(signon_core::keys::QUERY_ERROR_CODE, 0))
    }

    async fn cancel_ui_request(&self, _request_id: &str) {}
}

/// A [`PluginDriver`] that replays a fixed script of responses, one per
/// call to any `process*` method, regardless of which one. Panics if the
/// script runs dry — a test that exhausts it has a shape the test itself
/// got wrong, not something the double should paper over.
pub struct ScriptedPlugin {
    method: MethodName,
    mechanisms: Vec<MechanismName>,
    script: Mutex<VecDeque<PluginResult<PluginResponse>>>,
    calls: AtomicUsize,
}

impl ScriptedPlugin {
    /// A plugin double for `method` that replies with `replies` in order.
    #[must_use]
    pub fn new(method: &str, mechanisms: &[&str], replies: Vec<PluginResult<PluginResponse>>) -> Self {
        Self {
            method: MethodName::from(method),
            mechanisms: mechanisms.iter().map(|m| MechanismName::from(*m)).collect(),
            script: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// How many `process*` calls this double has answered so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next(&self) -> PluginResult<PluginResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().await.pop_front().expect("scripted plugin ran out of replies")
    }
}

#[async_trait]
impl PluginDriver for ScriptedPlugin {
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
        self.next().await
    }

    async fn process_ui(&self, _cancel_key: String, _params: PropertyMap) -> PluginResult<PluginResponse> {
        self.next().await
    }

    async fn process_refresh(&self, _cancel_key: String, _params: PropertyMap) -> PluginResult<PluginResponse> {
        self.next().await
    }

    async fn cancel(&self) -> PluginResult<()> {
        Ok(())
    }

    async fn stop(&self) -> PluginResult<()> {
        Ok(())
    }
}

/// A [`PluginSideEffectSink`] that records every `STATUS`/`STORE` notice
/// it receives, for assertions.
#[derive(Default)]
pub struct RecordingSink {
    statuses: StdMutex<Vec<(u32, String)>>,
    stores: StdMutex<Vec<PropertyMap>>,
}

impl RecordingSink {
    /// `(state, message)` pairs recorded via `on_status`, in order.
    #[must_use]
    pub fn statuses(&self) -> Vec<(u32, String)> {
        self.statuses.lock().unwrap().clone()
    }

    /// Parameter maps recorded via `on_store`, in order.
    #[must_use]
    pub fn stores(&self) -> Vec<PropertyMap> {
        self.stores.lock().unwrap().clone()
    }
}

#[async_trait]
impl PluginSideEffectSink for RecordingSink {
    async fn on_status(&self, state: u32, message: String) {
        self.statuses.lock().unwrap().push((state, message));
    }

    async fn on_store(&self, params: PropertyMap) {
        self.stores.lock().unwrap().push(params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_plugin_replays_in_order() {
        let plugin = ScriptedPlugin::new(
            "sasl",
            &["PLAIN"],
            vec![Ok(PluginResponse::Result(PropertyMap::new().with("UserName", "alice")))],
        );
        let reply = plugin.process("k".into(), PropertyMap::new(), MechanismName::from("PLAIN")).await.unwrap();
        assert!(matches!(reply, PluginResponse::Result(_)));
        assert_eq!(plugin.call_count(), 1);
    }

    #[tokio::test]
    async fn recording_sink_captures_status_and_store() {
        let sink = RecordingSink::default();
        sink.on_status(1, "connecting".into()).await;
        sink.on_store(PropertyMap::new().with("k", "v")).await;
        assert_eq!(sink.statuses(), vec![(1, "connecting".to_string())]);
        assert_eq!(sink.stores().len(), 1);
    }
}
