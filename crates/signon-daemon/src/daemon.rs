//! [`Daemon`] — the process-wide registry and control surface (spec.md
//! §4.8, C8).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use signon_access::{AccessControlGate, CallerContext};
use signon_core::ids::{IdentityId, MechanismName, MethodName};
use signon_core::{Disposable, IdentityInfo, PropertyMap};
use signon_crypto::{CryptoVolume, VolumeKey};
use signon_events::HandleEventBus;
use signon_identity::{Identity, IdentityHandle};
use signon_plugin::{discover_methods, plugin_binary_path, PluginDriver, PluginProxy, PluginSideEffectSink};
use signon_session::{SessionCore, SessionHandle};
use signon_storage::CredentialsDB;
use signon_ui::UIClient;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DaemonError, DaemonResult};
use crate::sink::SessionSinkRelay;
use crate::stats::Stats;

fn new_handle_name() -> String {
    Uuid::new_v4().to_string()
}

/// Owns the process-wide singletons (C1 the encrypted volume, C2 the
/// credentials store, C3 the access gate, C9 the UI client) and the two
/// registries every other handle is resolved through: saved records keyed
/// by their persisted [`IdentityId`], and unsaved ones keyed by a
/// generated handle-name (spec.md §4.8, §9 "shared lifetime of
/// SessionCore").
pub struct Daemon {
    db: Arc<CredentialsDB>,
    volume: Arc<AsyncMutex<CryptoVolume>>,
    gate: Arc<dyn AccessControlGate>,
    ui: Arc<dyn UIClient>,
    /// Separate from `session_events` — both are keyed by handle-name, and
    /// an identity handle and a session handle can legitimately share a
    /// generated name, so one bus per kind avoids cross-delivery.
    identity_events: Arc<HandleEventBus<String>>,
    session_events: Arc<HandleEventBus<String>>,
    plugin_dir: PathBuf,
    identity_timeout: Duration,
    authsession_timeout: Duration,
    plugin_start_timeout: Duration,
    stats: Stats,
    saved_identities: DashMap<IdentityId, Arc<Identity>>,
    unsaved_identities: DashMap<String, Arc<Identity>>,
    saved_sessions: DashMap<(IdentityId, MethodName), Arc<SessionCore>>,
    unsaved_sessions: DashMap<String, Arc<SessionCore>>,
}

impl Daemon {
    /// Assemble a daemon around its already-constructed singletons. The
    /// volume is expected to already be set up or mounted by the caller
    /// (spec.md §4.8 "C1 init" happens once, at startup, before the
    /// registries are opened for business).
    #[must_use]
    pub fn new(
        db: Arc<CredentialsDB>,
        volume: Arc<AsyncMutex<CryptoVolume>>,
        gate: Arc<dyn AccessControlGate>,
        ui: Arc<dyn UIClient>,
        plugin_dir: PathBuf,
        identity_timeout: Duration,
        authsession_timeout: Duration,
        plugin_start_timeout: Duration,
    ) -> Self {
        Self {
            db,
            volume,
            gate,
            ui,
            identity_events: Arc::new(HandleEventBus::new()),
            session_events: Arc::new(HandleEventBus::new()),
            plugin_dir,
            identity_timeout,
            authsession_timeout,
            plugin_start_timeout,
            stats: Stats::new(),
            saved_identities: DashMap::new(),
            unsaved_identities: DashMap::new(),
            saved_sessions: DashMap::new(),
            unsaved_sessions: DashMap::new(),
        }
    }

    /// The bus identity handles subscribe to.
    #[must_use]
    pub fn identity_events(&self) -> &Arc<HandleEventBus<String>> {
        &self.identity_events
    }

    /// The bus session handles subscribe to.
    #[must_use]
    pub fn session_events(&self) -> &Arc<HandleEventBus<String>> {
        &self.session_events
    }

    /// Request counters accumulated since startup.
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// `registerNewIdentity()` (spec.md §6): always succeeds, handing back
    /// a fresh, unsaved identity that only this caller can see until it's
    /// `store`d.
    pub async fn register_new_identity(&self, caller: CallerContext) -> IdentityHandle {
        let core = Arc::new(Identity::new(
            IdentityId::NEW,
            Arc::clone(&self.db),
            Arc::clone(&self.gate),
            Arc::clone(&self.ui),
            Arc::clone(&self.identity_events),
        ));
        let name = new_handle_name();
        self.unsaved_identities.insert(name.clone(), Arc::clone(&core));
        self.stats.record_identity_request();
        IdentityHandle::new(name, core, caller).await
    }

    /// `getIdentity(id)` (spec.md §6): rejected if `id != 0` and the
    /// caller's ACL doesn't cover it. Saved identities are shared — two
    /// callers asking for the same id get handles onto the same
    /// [`Identity`], matching spec.md §9's shared-lifetime note.
    pub async fn get_identity(&self, id: IdentityId, caller: CallerContext) -> DaemonResult<IdentityHandle> {
        if id.is_new() {
            return Ok(self.register_new_identity(caller).await);
        }

        let acl = self.db.acl(id).await?;
        if !self.gate.allowed_for_identity(&caller, &acl) {
            return Err(DaemonError::PermissionDenied(id.0));
        }

        let core = self
            .saved_identities
            .entry(id)
            .or_insert_with(|| {
                Arc::new(Identity::new(
                    id,
                    Arc::clone(&self.db),
                    Arc::clone(&self.gate),
                    Arc::clone(&self.ui),
                    Arc::clone(&self.identity_events),
                ))
            })
            .clone();
        core.keep_in_use();

        let name = new_handle_name();
        self.stats.record_identity_request();
        Ok(IdentityHandle::new(name, core, caller).await)
    }

    /// `getAuthSession(id, method)` (spec.md §6): rejected if `id != 0` and
    /// the caller lacks ACL rights. A session opened against an unsaved
    /// identity (`id == 0`) gets its own, independent [`SessionCore`] —
    /// nothing identifies which future identity it belongs to until
    /// [`SessionHandle::set_id`] is called, so it cannot be shared
    /// (spec.md §9 open question, resolved this way).
    pub async fn get_auth_session(
        &self,
        id: IdentityId,
        method: MethodName,
        caller: CallerContext,
    ) -> DaemonResult<SessionHandle> {
        self.stats.record_authsession_request();
        let name = new_handle_name();

        if id.is_new() {
            let core = self.spawn_session_core(IdentityId::NEW, method).await?;
            self.unsaved_sessions.insert(name.clone(), Arc::clone(&core));
            return Ok(SessionHandle::new(name, core, caller));
        }

        let acl = self.db.acl(id).await?;
        if !self.gate.allowed_for_identity(&caller, &acl) {
            return Err(DaemonError::PermissionDenied(id.0));
        }

        let key = (id, method.clone());
        if let Some(existing) = self.saved_sessions.get(&key) {
            existing.keep_in_use();
            return Ok(SessionHandle::new(name, Arc::clone(existing.value()), caller));
        }

        let core = self.spawn_session_core(id, method.clone()).await?;
        self.saved_sessions.insert(key, Arc::clone(&core));
        Ok(SessionHandle::new(name, core, caller))
    }

    async fn spawn_session_core(&self, identity_id: IdentityId, method: MethodName) -> DaemonResult<Arc<SessionCore>> {
        let binary_path = plugin_binary_path(&self.plugin_dir, &method);
        let relay = Arc::new(SessionSinkRelay::new());
        let proxy = PluginProxy::spawn(
            method.clone(),
            binary_path,
            self.plugin_start_timeout,
            Arc::clone(&relay) as Arc<dyn PluginSideEffectSink>,
        )
        .await
        .map_err(signon_core::SignonError::from)?;

        let core = Arc::new(SessionCore::new(
            identity_id,
            method,
            Arc::new(proxy) as Arc<dyn PluginDriver>,
            Arc::clone(&self.db),
            Arc::clone(&self.ui),
            Arc::clone(&self.gate),
            Arc::clone(&self.session_events),
        ));
        relay.bind(Arc::downgrade(&core));
        Ok(core)
    }

    /// Move a just-stored identity's registry entry from the unsaved pool
    /// to the saved pool, keyed by its new id. Called once
    /// [`IdentityHandle::store`] returns successfully — the handle itself
    /// has no registry to rekey (spec.md §9).
    pub fn promote_identity(&self, handle_name: &str, new_id: IdentityId) {
        if let Some((_, core)) = self.unsaved_identities.remove(handle_name) {
            self.saved_identities.entry(new_id).or_insert(core);
        }
    }

    /// Move a just-saved session's registry entry from the unsaved pool to
    /// the saved pool, keyed by `(new_id, method)`. Called once
    /// [`SessionHandle::set_id`] returns successfully (spec.md §4.7
    /// `setId`, §9). Errors instead of silently dropping the promotion
    /// if `(new_id, method)` is already registered, per `setId`'s
    /// "rejects collisions".
    pub fn promote_session(&self, handle_name: &str, new_id: IdentityId, method: MethodName) -> DaemonResult<()> {
        if self.saved_sessions.contains_key(&(new_id, method.clone())) {
            return Err(DaemonError::SessionIdCollision(new_id.0, method.0));
        }
        if let Some((_, core)) = self.unsaved_sessions.remove(handle_name) {
            self.saved_sessions.insert((new_id, method), core);
        }
        Ok(())
    }

    /// `queryMethods()` (spec.md §6): every method with a discoverable
    /// plugin binary in the configured plugin directory.
    pub fn query_methods(&self) -> DaemonResult<Vec<MethodName>> {
        discover_methods(&self.plugin_dir)
            .map_err(|e| DaemonError::Init(format!("scanning plugin directory: {e}")))
    }

    /// `queryMechanisms(method)` (spec.md §6): reuses a live session's
    /// cached mechanism list if one already exists for `method`, otherwise
    /// spawns a transient plugin process just to ask and stops it again.
    pub async fn query_mechanisms(&self, method: MethodName) -> DaemonResult<Vec<MechanismName>> {
        if let Some(core) = self
            .saved_sessions
            .iter()
            .find(|entry| entry.key().1 == method)
            .map(|entry| Arc::clone(entry.value()))
        {
            return Ok(core.mechanisms().to_vec());
        }

        let binary_path = plugin_binary_path(&self.plugin_dir, &method);
        let proxy = PluginProxy::spawn(
            method,
            binary_path,
            self.plugin_start_timeout,
            Arc::new(signon_plugin::NullSink) as Arc<dyn PluginSideEffectSink>,
        )
        .await
        .map_err(signon_core::SignonError::from)?;
        let mechanisms = proxy.mechanisms().to_vec();
        let _ = proxy.stop().await;
        Ok(mechanisms)
    }

    /// `queryIdentities(filter)` (spec.md §6): restricted to the keychain
    /// widget.
    pub async fn query_identities(&self, filter: PropertyMap, caller: CallerContext) -> DaemonResult<Vec<IdentityInfo>> {
        if !self.gate.is_keychain_widget(&caller) {
            return Err(DaemonError::KeychainWidgetOnly);
        }
        Ok(self.db.list(&filter).await?)
    }

    /// `clear()` (spec.md §6): restricted to the keychain widget. Wipes
    /// every persisted identity and blob; in-memory registries are left
    /// alone (already-open handles keep working against stale data until
    /// they're swept, matching the original's "existing sessions survive
    /// a clear" behaviour).
    pub async fn clear(&self, caller: CallerContext) -> DaemonResult<()> {
        if !self.gate.is_keychain_widget(&caller) {
            return Err(DaemonError::KeychainWidgetOnly);
        }
        self.db.clear().await?;
        Ok(())
    }

    /// Remount the encrypted volume under a new key after
    /// [`signon_crypto::CryptoVolume::add_key`]/`remove_key` rotation, and
    /// flush anything the store queued while secrets were unavailable
    /// (spec.md §8 scenario 6).
    pub async fn remount_volume(&self, key: &VolumeKey) -> DaemonResult<()> {
        let mut volume = self.volume.lock().await;
        volume.mount(key).await.map_err(signon_core::SignonError::from)?;
        drop(volume);
        self.db.set_secrets_available(true).await;
        Ok(())
    }

    /// Unmount the encrypted volume, marking secrets unavailable first so
    /// in-flight blob writes queue instead of failing (spec.md DB3).
    pub async fn unmount_volume(&self) -> DaemonResult<()> {
        self.db.set_secrets_available(false).await;
        let mut volume = self.volume.lock().await;
        volume.unmount().await.map_err(signon_core::SignonError::from)?;
        Ok(())
    }

    /// One inactivity-GC pass over all four registries (spec.md §4.10,
    /// §5 "Disposable sweep"). An entry is reclaimed only once its
    /// `DisposableState` is expired *and* the registry holds the only
    /// remaining `Arc` — any live handle keeps its target alive
    /// regardless of idle time (spec.md §9 "shared lifetime").
    pub fn sweep(&self) {
        let identity_reaped = sweep_map(&self.saved_identities, self.identity_timeout, |i| i.disposable_state())
            + sweep_map(&self.unsaved_identities, self.identity_timeout, |i| i.disposable_state());
        let session_reaped = sweep_map(&self.saved_sessions, self.authsession_timeout, |s| s.disposable_state())
            + sweep_map(&self.unsaved_sessions, self.authsession_timeout, |s| s.disposable_state());
        if identity_reaped + session_reaped > 0 {
            debug!(identity_reaped, session_reaped, "inactivity sweep reclaimed registry entries");
        }
    }

    /// Number of saved + unsaved identities currently registered, for
    /// tests and diagnostics.
    #[must_use]
    pub fn identity_count(&self) -> usize {
        self.saved_identities.len() + self.unsaved_identities.len()
    }

    /// Number of saved + unsaved sessions currently registered.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.saved_sessions.len() + self.unsaved_sessions.len()
    }
}

/// Remove every entry in `map` that's both past `timeout` and held only
/// by the registry itself, returning how many were reclaimed. A plain
/// helper rather than [`signon_core::DisposableRegistry::sweep_ready`]
/// since `DashMap` doesn't hand out the `(&K, &V)` pairs that generic
/// helper expects over a plain iterator.
fn sweep_map<K, V>(
    map: &DashMap<K, Arc<V>>,
    timeout: Duration,
    extract: impl Fn(&V) -> &signon_core::DisposableState,
) -> usize
where
    K: Eq + std::hash::Hash + Clone,
{
    let expired: Vec<K> = map
        .iter()
        .filter(|entry| Arc::strong_count(entry.value()) == 1 && extract(entry.value()).is_expired(timeout))
        .map(|entry| entry.key().clone())
        .collect();
    for key in &expired {
        map.remove(key);
    }
    expired.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use signon_access::StrictGate;
    use signon_ui::UiResult;

    struct NullProxy;

    #[async_trait]
    impl PluginDriver for NullProxy {
        fn method(&self) -> &MethodName {
            static METHOD: std::sync::OnceLock<MethodName> = std::sync::OnceLock::new();
            METHOD.get_or_init(|| MethodName::from("password"))
        }

        fn mechanisms(&self) -> &[MechanismName] {
            &[]
        }

        fn is_processing(&self) -> bool {
            false
        }

        async fn process(&self, _cancel_key: String, params: PropertyMap, _mechanism: MechanismName) -> signon_plugin::PluginResult<signon_plugin::PluginResponse> {
            Ok(signon_plugin::PluginResponse::Result(params))
        }

        async fn process_ui(&self, _cancel_key: String, params: PropertyMap) -> signon_plugin::PluginResult<signon_plugin::PluginResponse> {
            Ok(signon_plugin::PluginResponse::Result(params))
        }

        async fn process_refresh(&self, _cancel_key: String, params: PropertyMap) -> signon_plugin::PluginResult<signon_plugin::PluginResponse> {
            Ok(signon_plugin::PluginResponse::Result(params))
        }

        async fn cancel(&self) -> signon_plugin::PluginResult<()> {
            Ok(())
        }

        async fn stop(&self) -> signon_plugin::PluginResult<()> {
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

    async fn make_daemon() -> Daemon {
        Daemon::new(
            Arc::new(CredentialsDB::in_memory()),
            Arc::new(AsyncMutex::new(CryptoVolume::new("/tmp/signon-daemon-test.db", "/tmp/signon-daemon-test-mnt", signon_crypto::FsType::Ext4))),
            Arc::new(StrictGate),
            Arc::new(NullUi),
            PathBuf::from("/no/such/plugin/dir"),
            Duration::from_secs(300),
            Duration::from_secs(300),
            Duration::from_millis(5000),
        )
    }

    #[tokio::test]
    async fn register_new_identity_is_always_allowed() {
        let daemon = make_daemon().await;
        let handle = daemon.register_new_identity(CallerContext::default()).await;
        assert!(handle.id().await.is_new());
        assert_eq!(daemon.stats().identity_requests(), 1);
        assert_eq!(daemon.identity_count(), 1);
    }

    #[tokio::test]
    async fn get_identity_rejects_callers_outside_the_acl() {
        let daemon = make_daemon().await;
        let mut info = IdentityInfo::new();
        info.owners.insert(signon_core::ids::AppToken::from("com.example.app"));
        info.acl.insert(signon_core::ids::AppToken::from("com.example.app"));
        let id = daemon.db.insert(info).await.unwrap();

        let err = daemon
            .get_identity(id, CallerContext::with_app_token("com.mallory.app"))
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn get_identity_shares_one_core_across_callers() {
        let daemon = make_daemon().await;
        let id = daemon.db.insert(IdentityInfo::new()).await.unwrap();

        let a = daemon.get_identity(id, CallerContext::default()).await.unwrap();
        let b = daemon.get_identity(id, CallerContext::default()).await.unwrap();
        assert_eq!(daemon.saved_identities.len(), 1);
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn query_identities_requires_keychain_widget() {
        let daemon = make_daemon().await;
        let err = daemon
            .query_identities(PropertyMap::new(), CallerContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::KeychainWidgetOnly));

        let ok = daemon.query_identities(PropertyMap::new(), CallerContext::keychain_widget()).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn clear_requires_keychain_widget() {
        let daemon = make_daemon().await;
        let err = daemon.clear(CallerContext::default()).await.unwrap_err();
        assert!(matches!(err, DaemonError::KeychainWidgetOnly));
        daemon.clear(CallerContext::keychain_widget()).await.unwrap();
    }

    #[tokio::test]
    async fn sweep_leaves_referenced_entries_alone() {
        let daemon = make_daemon().await;
        let handle = daemon.register_new_identity(CallerContext::default()).await;
        daemon.sweep();
        assert_eq!(daemon.identity_count(), 1);
        drop(handle);
    }

    #[tokio::test]
    async fn promote_identity_moves_the_registry_entry() {
        let daemon = make_daemon().await;
        let handle = daemon.register_new_identity(CallerContext::default()).await;
        let name = handle.name().to_string();
        daemon.promote_identity(&name, IdentityId(42));
        assert!(daemon.unsaved_identities.get(&name).is_none());
        assert!(daemon.saved_identities.get(&IdentityId(42)).is_some());
    }

    #[tokio::test]
    async fn promote_session_rejects_an_id_method_collision() {
        let daemon = make_daemon().await;
        let method = MethodName::from("password");
        let core = Arc::new(SessionCore::new(
            IdentityId(0),
            method.clone(),
            Arc::new(NullProxy) as Arc<dyn PluginDriver>,
            Arc::clone(&daemon.db),
            Arc::clone(&daemon.ui),
            Arc::clone(&daemon.gate),
            Arc::clone(&daemon.session_events),
        ));
        daemon.unsaved_sessions.insert("pending".to_string(), Arc::clone(&core));
        daemon.saved_sessions.insert((IdentityId(7), method.clone()), Arc::clone(&core));

        let err = daemon.promote_session("pending", IdentityId(7), method).unwrap_err();
        assert!(matches!(err, DaemonError::SessionIdCollision(7, _)));
        assert!(daemon.unsaved_sessions.get("pending").is_some());
    }
}
