//! The [`PluginDriver`] seam — lets `signon-session` depend on "something
//! that speaks the plugin protocol" without committing to a real child
//! process, so session tests can run against a scripted double instead of
//! spawning a binary.

use async_trait::async_trait;
use signon_core::ids::{MechanismName, MethodName};
use signon_core::PropertyMap;

use crate::error::PluginResult;
use crate::proxy::PluginProxy;
use crate::wire::PluginResponse;

/// Everything `SessionCore` needs from a plugin proxy.
#[async_trait]
pub trait PluginDriver: Send + Sync {
    /// The method this driver implements.
    fn method(&self) -> &MethodName;

    /// Mechanisms reported at startup.
    fn mechanisms(&self) -> &[MechanismName];

    /// Whether an operation is currently in flight.
    fn is_processing(&self) -> bool;

    /// Run an authentication step.
    async fn process(&self, cancel_key: String, params: PropertyMap, mechanism: MechanismName) -> PluginResult<PluginResponse>;

    /// Resume after a UI dialog reply.
    async fn process_ui(&self, cancel_key: String, params: PropertyMap) -> PluginResult<PluginResponse>;

    /// Resume after a refresh dialog reply.
    async fn process_refresh(&self, cancel_key: String, params: PropertyMap) -> PluginResult<PluginResponse>;

    /// Ask the plugin to cancel its in-flight operation.
    async fn cancel(&self) -> PluginResult<()>;

    /// Ask the plugin to shut down cleanly.
    async fn stop(&self) -> PluginResult<()>;
}

#[async_trait]
impl PluginDriver for PluginProxy {
    fn method(&self) -> &MethodName {
        PluginProxy::method(self)
    }

    fn mechanisms(&self) -> &[MechanismName] {
        PluginProxy::mechanisms(self)
    }

    fn is_processing(&self) -> bool {
        PluginProxy::is_processing(self)
    }

    async fn process(&self, cancel_key: String, params: PropertyMap, mechanism: MechanismName) -> PluginResult<PluginResponse> {
        PluginProxy::process(self, cancel_key, params, mechanism).await
    }

    async fn process_ui(&self, cancel_key: String, params: PropertyMap) -> PluginResult<PluginResponse> {
        PluginProxy::process_ui(self, cancel_key, params).await
    }

    async fn process_refresh(&self, cancel_key: String, params: PropertyMap) -> PluginResult<PluginResponse> {
        PluginProxy::process_refresh(self, cancel_key, params).await
    }

    async fn cancel(&self) -> PluginResult<()> {
        PluginProxy::cancel(self).await
    }

    async fn stop(&self) -> PluginResult<()> {
        PluginProxy::stop(self).await
    }
}
