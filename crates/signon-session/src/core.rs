//! [`SessionCore`] — serialises and multiplexes authentication operations
//! for one `(identity, method)` pair (spec.md §4.5, C5).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use signon_access::{AccessControlGate, CallerContext};
use signon_core::ids::{IdentityId, MechanismName, MethodName, PASSWORD_METHOD};
use signon_core::{keys, Disposable, DisposableState, ErrorKind, PropertyMap};
use signon_events::{HandleEventBus, Signal};
use signon_plugin::{PluginDriver, PluginError, PluginResponse, PluginSideEffectSink, CANCELED_ERROR_CODE};
use signon_storage::CredentialsDB;
use signon_ui::UIClient;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::cancel_key::CancelKey;
use crate::policy::UiPolicy;

/// One queued or in-flight `process` request (spec.md §3 "Session
/// operation").
#[derive(Clone)]
struct QueuedRequest {
    cancel_key: CancelKey,
    /// The handle-name `process` was called on — results and errors are
    /// delivered back to exactly this handle (spec.md §5: per-handle
    /// FIFO delivery).
    origin_handle: String,
    caller: CallerContext,
    params: PropertyMap,
    mechanism: MechanismName,
    ui_policy: UiPolicy,
}

/// What the dispatch loop should send to the plugin next: either the
/// initial `PROCESS`, or a continuation after a UI round-trip
/// (`PROCESS_UI`/`REFRESH`).
enum NextStep {
    Process(PropertyMap),
    ProcessUi(PropertyMap),
    Refresh(PropertyMap),
}

/// Serialises and multiplexes authentication operations for one
/// `(identity, method)` pair, owning exactly one [`PluginDriver`]
/// (spec.md §4.5, C5).
///
/// Shared across every [`crate::handle::SessionHandle`] for the same key,
/// per spec.md §9's "shared lifetime of SessionCore" note — the daemon's
/// registry hands out `Arc<SessionCore>` rather than this type
/// implementing any refcounting itself.
pub struct SessionCore {
    identity_id: RwLock<IdentityId>,
    method: MethodName,
    plugin: Arc<dyn PluginDriver>,
    db: Arc<CredentialsDB>,
    ui: Arc<dyn UIClient>,
    gate: Arc<dyn AccessControlGate>,
    events: Arc<HandleEventBus<String>>,
    queue: Mutex<VecDeque<QueuedRequest>>,
    /// The most recent `Secret` a UI dialog reply carried while servicing
    /// the request currently being dispatched — fed back into the stored
    /// identity on `RESULT` (spec.md §4.5 "update secret from the latest
    /// user-entered password captured during UI").
    last_dialog_secret: Mutex<Option<String>>,
    /// The origin handle of whichever request is currently dispatching,
    /// so [`PluginSideEffectSink::on_status`] has somewhere to deliver a
    /// `STATUS` notice. `None` when nothing is in flight.
    current_origin: Mutex<Option<String>>,
    disposable: DisposableState,
}

impl SessionCore {
    /// Construct a core for `(identity_id, method)`, driving `plugin`.
    #[must_use]
    pub fn new(
        identity_id: IdentityId,
        method: MethodName,
        plugin: Arc<dyn PluginDriver>,
        db: Arc<CredentialsDB>,
        ui: Arc<dyn UIClient>,
        gate: Arc<dyn AccessControlGate>,
        events: Arc<HandleEventBus<String>>,
    ) -> Self {
        Self {
            identity_id: RwLock::new(identity_id),
            method,
            plugin,
            db,
            ui,
            gate,
            events,
            queue: Mutex::new(VecDeque::new()),
            last_dialog_secret: Mutex::new(None),
            current_origin: Mutex::new(None),
            disposable: DisposableState::new(),
        }
    }

    /// The method this core serves.
    #[must_use]
    pub fn method(&self) -> &MethodName {
        &self.method
    }

    /// The embedded inactivity-GC state, for the daemon's registry sweep
    /// (`signon_core::DisposableRegistry::sweep_ready`).
    #[must_use]
    pub fn disposable_state(&self) -> &signon_core::DisposableState {
        &self.disposable
    }

    /// The identity this core currently dispatches against. `NEW` until
    /// `set_identity_id` is called (spec.md §8 scenario 4).
    pub async fn identity_id(&self) -> IdentityId {
        *self.identity_id.read().await
    }

    /// Reassign the identity this core dispatches against — called once,
    /// when an unsaved identity is first stored (spec.md §4.7 `set_id`).
    /// Updating the registry key itself (moving this core from the
    /// unsaved pool to the saved pool) is the daemon's responsibility;
    /// this only affects future parameter composition and persistence.
    pub async fn set_identity_id(&self, id: IdentityId) {
        *self.identity_id.write().await = id;
    }

    /// Mechanisms the underlying plugin supports.
    #[must_use]
    pub fn mechanisms(&self) -> &[MechanismName] {
        self.plugin.mechanisms()
    }

    /// Intersection of the plugin's mechanisms with `wanted`; an empty
    /// `wanted` means "all of them" (spec.md §4.7
    /// `query_available_mechanisms`).
    #[must_use]
    pub fn available_mechanisms(&self, wanted: &[MechanismName]) -> Vec<MechanismName> {
        if wanted.is_empty() {
            return self.plugin.mechanisms().to_vec();
        }
        self.plugin
            .mechanisms()
            .iter()
            .filter(|m| wanted.contains(m))
            .cloned()
            .collect()
    }

    /// Enqueue a `process` request, returning its cancel-key immediately.
    /// If nothing is currently in flight, spawns the dispatch loop
    /// (spec.md §4.5 "Queue semantics").
    pub async fn enqueue(
        self: &Arc<Self>,
        origin_handle: String,
        caller: CallerContext,
        params: PropertyMap,
        mechanism: MechanismName,
        ui_policy: UiPolicy,
    ) -> CancelKey {
        let cancel_key = CancelKey::new();
        let request = QueuedRequest { cancel_key, origin_handle, caller, params, mechanism, ui_policy };

        self.disposable.keep_in_use();
        self.disposable.set_auto_destruct(false);

        let mut queue = self.queue.lock().await;
        let was_idle = queue.is_empty();
        queue.push_back(request);
        drop(queue);

        if was_idle {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.drive().await });
        }
        cancel_key
    }

    /// `cancel(cancel-key)` (spec.md §4.5, §5 cancellation semantics).
    ///
    /// If `key` is the head of the queue (the in-flight request), asks
    /// the plugin to cancel and leaves it queued until the plugin
    /// acknowledges. Otherwise removes it immediately and emits exactly
    /// one `SessionCanceled` event to its origin handle (spec.md P5).
    pub async fn cancel(&self, key: CancelKey) {
        let is_head = {
            let queue = self.queue.lock().await;
            queue.front().is_some_and(|r| r.cancel_key == key)
        };
        if is_head {
            if let Err(err) = self.plugin.cancel().await {
                warn!(method = %self.method.0, error = %err, "failed to forward cancel to plugin");
            }
            return;
        }

        let removed = {
            let mut queue = self.queue.lock().await;
            queue
                .iter()
                .position(|r| r.cancel_key == key)
                .map(|pos| queue.remove(pos).expect("position just found"))
        };
        if let Some(request) = removed {
            self.events.emit(
                &request.origin_handle,
                Signal::ProcessError {
                    cancel_key: key.to_string(),
                    kind: ErrorKind::SessionCanceled,
                    message: "request cancelled before it reached the plugin".into(),
                },
            );
        }
    }

    async fn drive(self: Arc<Self>) {
        loop {
            let request = {
                let queue = self.queue.lock().await;
                queue.front().cloned()
            };
            let Some(request) = request else { break };

            self.dispatch_one(&request).await;

            let mut queue = self.queue.lock().await;
            if queue.front().is_some_and(|r| r.cancel_key == request.cancel_key) {
                queue.pop_front();
            }
            let idle = queue.is_empty();
            drop(queue);
            if idle {
                self.disposable.set_auto_destruct(true);
                break;
            }
        }
    }

    async fn dispatch_one(&self, request: &QueuedRequest) {
        *self.last_dialog_secret.lock().await = None;
        *self.current_origin.lock().await = Some(request.origin_handle.clone());
        let composed = self.compose_params(request).await;
        self.run_dispatch_loop(request, NextStep::Process(composed)).await;
        *self.current_origin.lock().await = None;
    }

    async fn run_dispatch_loop(&self, request: &QueuedRequest, first: NextStep) {
        let mut next = first;
        loop {
            let reply = match next {
                NextStep::Process(params) => {
                    self.plugin
                        .process(request.cancel_key.to_string(), params, request.mechanism.clone())
                        .await
                }
                NextStep::ProcessUi(params) => {
                    self.plugin.process_ui(request.cancel_key.to_string(), params).await
                }
                NextStep::Refresh(params) => {
                    self.plugin.process_refresh(request.cancel_key.to_string(), params).await
                }
            };

            match reply {
                Ok(PluginResponse::Result(params)) => {
                    self.on_result(request, params).await;
                    return;
                }
                Ok(PluginResponse::Error { code, message }) => {
                    self.on_error(request, code, message);
                    return;
                }
                Ok(PluginResponse::Ui(params)) | Ok(PluginResponse::Refreshed(params)) => {
                    next = self.next_ui_step(request, params).await;
                }
                Ok(other) => {
                    warn!(method = %self.method.0, reply = ?other, "protocol violation: unexpected reply to process");
                    self.on_error(request, 0, format!("unexpected plugin reply: {other:?}"));
                    return;
                }
                Err(err) => {
                    self.on_proxy_error(request, err);
                    return;
                }
            }
        }
    }

    /// Parameter composition at dispatch time (spec.md §4.5 steps 1-4).
    async fn compose_params(&self, request: &QueuedRequest) -> PropertyMap {
        let id = self.identity_id().await;
        let blob = self.db.load_data(id, &self.method).await;
        let mut params = request.params.clone().merged_over(&blob);

        if !id.is_new() {
            if let Ok(info) = self.db.credentials(id, true).await {
                if info.store_secret && !params.contains_key(keys::SECRET) {
                    params.set(keys::SECRET, info.secret.clone());
                }
                if info.validated {
                    params.set(keys::USER_NAME, info.username.clone());
                } else if !params.contains_key(keys::USER_NAME) {
                    params.set(keys::USER_NAME, info.username.clone());
                }

                let caller_id = self.gate.app_id(&request.caller);
                let tokens: Vec<String> = if self.gate.allowed_for_identity(&request.caller, &info.acl) {
                    vec![caller_id.0]
                } else {
                    Vec::new()
                };
                params.set(keys::ACL_TOKENS, tokens);
            }
        }

        if request.ui_policy.strips_cached_secret() {
            params.remove(keys::SECRET);
        }

        params
    }

    /// Decide the plugin's next `UI` tag is handled (spec.md §4.5 "UI
    /// mediation"): dispatch to [`UIClient`] unless policy forbids it,
    /// then feed the reply back as `PROCESS_UI` or `REFRESH`.
    async fn next_ui_step(&self, request: &QueuedRequest, params: PropertyMap) -> NextStep {
        if !request.ui_policy.permits_dialog(&params) {
            return NextStep::ProcessUi(forbidden_reply());
        }

        match self.ui.query_dialog(params).await {
            Ok(reply) => {
                if let Some(secret) = reply.get_str(keys::SECRET) {
                    *self.last_dialog_secret.lock().await = Some(secret.to_string());
                }
                if reply.get_bool(keys::REFRESH_REQUIRED).unwrap_or(false) {
                    NextStep::Refresh(reply)
                } else {
                    NextStep::ProcessUi(reply)
                }
            }
            Err(err) => {
                debug!(method = %self.method.0, error = %err, "UI dialog failed; sending error sentinel to plugin");
                NextStep::ProcessUi(forbidden_reply())
            }
        }
    }

    /// On `RESULT`: persist updates against a saved identity, then strip
    /// the secret from the reply unless this is the `password` method
    /// (spec.md §4.5 "Result handling").
    async fn on_result(&self, request: &QueuedRequest, mut params: PropertyMap) {
        let id = self.identity_id().await;
        if !id.is_new() {
            if let Ok(mut info) = self.db.credentials(id, true).await {
                if !info.validated {
                    if let Some(username) = params.get_str(keys::USER_NAME) {
                        if !username.is_empty() {
                            info.username = username.to_string();
                        }
                    }
                }
                if let Some(secret) = self.last_dialog_secret.lock().await.clone() {
                    info.secret = secret;
                }
                info.validated = true;
                if let Err(err) = self.db.update(info).await {
                    warn!(identity = %id, error = %err, "failed to persist session result");
                }
            }
        }

        if self.method.0 != PASSWORD_METHOD {
            params.remove(keys::SECRET);
        }

        self.events.emit(
            &request.origin_handle,
            Signal::ProcessResult { cancel_key: request.cancel_key.to_string(), params },
        );
    }

    fn on_error(&self, request: &QueuedRequest, code: u32, message: String) {
        let kind = if code == CANCELED_ERROR_CODE {
            ErrorKind::SessionCanceled
        } else {
            ErrorKind::OperationFailed
        };
        self.events.emit(
            &request.origin_handle,
            Signal::ProcessError { cancel_key: request.cancel_key.to_string(), kind, message },
        );
    }

    fn on_proxy_error(&self, request: &QueuedRequest, err: PluginError) {
        let signon_err: signon_core::SignonError = err.into();
        self.events.emit(
            &request.origin_handle,
            Signal::ProcessError {
                cancel_key: request.cancel_key.to_string(),
                kind: signon_err.kind,
                message: signon_err.message,
            },
        );
    }
}

fn forbidden_reply() -> PropertyMap {
    PropertyMap::new().with(keys::QUERY_ERROR_CODE, ErrorKind::UserInteraction.code())
}

/// Routes the two non-terminal plugin tags (spec.md §4.4) to the handle
/// whose request is currently in flight and, for `STORE`, on into
/// persistent storage.
#[async_trait]
impl PluginSideEffectSink for SessionCore {
    async fn on_status(&self, state: u32, message: String) {
        let origin = self.current_origin.lock().await.clone();
        let Some(origin) = origin else {
            debug!(state, "STATUS notice with no request in flight, dropping");
            return;
        };
        self.events.emit(
            &origin,
            Signal::StateChanged { state: state.to_string(), message },
        );
    }

    async fn on_store(&self, params: PropertyMap) {
        let id = self.identity_id().await;
        if id.is_new() {
            debug!("STORE notice for an unsaved identity, dropping");
            return;
        }
        if let Err(err) = self.db.store_data(id, self.method.clone(), params).await {
            warn!(identity = %id, error = %err, "failed to persist STORE payload");
        }
    }
}

impl Disposable for SessionCore {
    fn keep_in_use(&self) {
        self.disposable.keep_in_use();
    }

    fn set_auto_destruct(&self, enabled: bool) {
        self.disposable.set_auto_destruct(enabled);
    }

    fn is_expired(&self, max_inactivity: Duration) -> bool {
        self.disposable.is_expired(max_inactivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use signon_access::StrictGate;
    use signon_core::ids::AppToken;
    use signon_plugin::PluginResult;
    use signon_ui::UiResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    struct ScriptedPlugin {
        method: MethodName,
        mechanisms: Vec<MechanismName>,
        script: AsyncMutex<VecDeque<PluginResult<PluginResponse>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedPlugin {
        fn new(method: &str, replies: Vec<PluginResult<PluginResponse>>) -> Self {
            Self {
                method: MethodName::from(method),
                mechanisms: vec![MechanismName::from("PLAIN")],
                script: AsyncMutex::new(replies.into()),
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
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

        async fn process(
            &self,
            _cancel_key: String,
            _params: PropertyMap,
            _mechanism: MechanismName,
        ) -> PluginResult<PluginResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script.lock().await.pop_front().expect("script exhausted")
        }

        async fn process_ui(&self, _cancel_key: String, _params: PropertyMap) -> PluginResult<PluginResponse> {
            self.script.lock().await.pop_front().expect("script exhausted")
        }

        async fn process_refresh(&self, _cancel_key: String, _params: PropertyMap) -> PluginResult<PluginResponse> {
            self.script.lock().await.pop_front().expect("script exhausted")
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

    fn make_core(plugin: Arc<dyn PluginDriver>) -> (Arc<SessionCore>, Arc<HandleEventBus<String>>) {
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
        (core, events)
    }

    #[tokio::test]
    async fn successful_process_emits_process_result() {
        let plugin = Arc::new(ScriptedPlugin::new(
            "sasl",
            vec![Ok(PluginResponse::Result(PropertyMap::new().with("UserName", "alice")))],
        ));
        let (core, events) = make_core(plugin);
        let mut rx = events.subscribe("handle-1".to_string());

        core.enqueue(
            "handle-1".to_string(),
            CallerContext::with_app_token("com.example.app"),
            PropertyMap::new(),
            MechanismName::from("PLAIN"),
            UiPolicy::Default,
        )
        .await;

        let signal = rx.recv().await.unwrap();
        assert!(matches!(signal, Signal::ProcessResult { .. }));
    }

    #[tokio::test]
    async fn queue_is_fifo_and_serialised() {
        let plugin = Arc::new(
            ScriptedPlugin::new(
                "sasl",
                vec![
                    Ok(PluginResponse::Result(PropertyMap::new())),
                    Ok(PluginResponse::Result(PropertyMap::new())),
                    Ok(PluginResponse::Result(PropertyMap::new())),
                ],
            )
            .with_delay(Duration::from_millis(20)),
        );
        let (core, events) = make_core(plugin);
        let mut rx = events.subscribe("handle-1".to_string());

        let k1 = core
            .enqueue(
                "handle-1".to_string(),
                CallerContext::default(),
                PropertyMap::new(),
                MechanismName::from("PLAIN"),
                UiPolicy::Default,
            )
            .await;
        let k2 = core
            .enqueue(
                "handle-1".to_string(),
                CallerContext::default(),
                PropertyMap::new(),
                MechanismName::from("PLAIN"),
                UiPolicy::Default,
            )
            .await;
        let k3 = core
            .enqueue(
                "handle-1".to_string(),
                CallerContext::default(),
                PropertyMap::new(),
                MechanismName::from("PLAIN"),
                UiPolicy::Default,
            )
            .await;
        assert_ne!(k1, k2);
        assert_ne!(k2, k3);

        for _ in 0..3 {
            let signal = rx.recv().await.unwrap();
            assert!(matches!(signal, Signal::ProcessResult { .. }));
        }
    }

    #[tokio::test]
    async fn cancel_of_queued_non_head_request_yields_session_canceled() {
        let plugin = Arc::new(
            ScriptedPlugin::new(
                "sasl",
                vec![Ok(PluginResponse::Result(PropertyMap::new())), Ok(PluginResponse::Result(PropertyMap::new()))],
            )
            .with_delay(Duration::from_millis(50)),
        );
        let (core, events) = make_core(plugin);
        let mut rx = events.subscribe("handle-1".to_string());

        let _k1 = core
            .enqueue(
                "handle-1".to_string(),
                CallerContext::default(),
                PropertyMap::new(),
                MechanismName::from("PLAIN"),
                UiPolicy::Default,
            )
            .await;
        let k2 = core
            .enqueue(
                "handle-1".to_string(),
                CallerContext::default(),
                PropertyMap::new(),
                MechanismName::from("PLAIN"),
                UiPolicy::Default,
            )
            .await;

        core.cancel(k2).await;

        let first = rx.recv().await.unwrap();
        match first {
            Signal::ProcessError { cancel_key, kind, .. } => {
                assert_eq!(cancel_key, k2.to_string());
                assert_eq!(kind, ErrorKind::SessionCanceled);
            }
            other => panic!("expected ProcessError for k2, got {other:?}"),
        }

        let second = rx.recv().await.unwrap();
        assert!(matches!(second, Signal::ProcessResult { .. }));
    }

    #[tokio::test]
    async fn result_strips_secret_unless_method_is_password() {
        let plugin = Arc::new(ScriptedPlugin::new(
            "sasl",
            vec![Ok(PluginResponse::Result(PropertyMap::new().with("Secret", "hunter2")))],
        ));
        let (core, events) = make_core(plugin);
        let mut rx = events.subscribe("handle-1".to_string());

        core.enqueue(
            "handle-1".to_string(),
            CallerContext::default(),
            PropertyMap::new(),
            MechanismName::from("PLAIN"),
            UiPolicy::Default,
        )
        .await;

        let Signal::ProcessResult { params, .. } = rx.recv().await.unwrap() else {
            panic!("expected ProcessResult");
        };
        assert!(params.get(keys::SECRET).is_none());
    }

    #[tokio::test]
    async fn password_method_keeps_secret_in_result() {
        let plugin = Arc::new(ScriptedPlugin::new(
            "password",
            vec![Ok(PluginResponse::Result(PropertyMap::new().with("Secret", "hunter2")))],
        ));
        let events = Arc::new(HandleEventBus::new());
        let core = Arc::new(SessionCore::new(
            IdentityId::NEW,
            MethodName::from(PASSWORD_METHOD),
            plugin,
            Arc::new(CredentialsDB::in_memory()),
            Arc::new(NullUi),
            Arc::new(StrictGate),
            Arc::clone(&events),
        ));
        let mut rx = events.subscribe("handle-1".to_string());

        core.enqueue(
            "handle-1".to_string(),
            CallerContext::default(),
            PropertyMap::new(),
            MechanismName::from("PLAIN"),
            UiPolicy::Default,
        )
        .await;

        let Signal::ProcessResult { params, .. } = rx.recv().await.unwrap() else {
            panic!("expected ProcessResult");
        };
        assert_eq!(params.get_str(keys::SECRET), Some("hunter2"));
    }

    #[tokio::test]
    async fn available_mechanisms_intersects_wanted() {
        let plugin = Arc::new(ScriptedPlugin::new("sasl", vec![]));
        let (core, _events) = make_core(plugin);
        let wanted = vec![MechanismName::from("PLAIN"), MechanismName::from("DIGEST-MD5")];
        assert_eq!(core.available_mechanisms(&wanted), vec![MechanismName::from("PLAIN")]);
        assert_eq!(core.available_mechanisms(&[]), vec![MechanismName::from("PLAIN")]);
    }

    #[tokio::test]
    async fn saved_identity_propagates_new_id_to_dispatch() {
        let plugin = Arc::new(ScriptedPlugin::new(
            "sasl",
            vec![Ok(PluginResponse::Result(PropertyMap::new()))],
        ));
        let db = Arc::new(CredentialsDB::in_memory());
        let mut info = signon_core::IdentityInfo::new();
        info.username = "alice".into();
        info.owners.insert(AppToken::from("com.example.app"));
        let id = db.insert(info).await.unwrap();

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
        core.set_identity_id(id).await;
        assert_eq!(core.identity_id().await, id);
    }
}
