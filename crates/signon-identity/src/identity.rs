//! [`Identity`] — the per-record state machine and operation queue (C6).
//!
//! One `Identity` is shared by every [`crate::handle::IdentityHandle`]
//! attached to the same underlying record, the way [`signon_session::SessionCore`]
//! is shared by every `SessionHandle` for a `(identity, method)` pair: a
//! single in-process queue keeps every mutating operation serialised
//! against the one [`CredentialsDB`] record, and broadcasts go out to
//! every handle name registered as an observer.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use signon_access::{AccessControlGate, CallerContext, OwnerStatus};
use signon_core::ids::IdentityId;
use signon_core::{keys, Disposable, DisposableState, IdentityInfo, PropertyMap};
use signon_events::{HandleEventBus, InfoUpdatedKind, Signal};
use signon_storage::CredentialsDB;
use signon_ui::UIClient;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::debug;

use crate::error::{IdentityError, IdentityResult};
use crate::state::{IdentityState, QueuedOp};

/// The per-record state machine and operation queue backing every
/// attached identity handle.
pub struct Identity {
    id: RwLock<IdentityId>,
    db: Arc<CredentialsDB>,
    gate: Arc<dyn AccessControlGate>,
    ui: Arc<dyn UIClient>,
    events: Arc<HandleEventBus<String>>,
    observers: Mutex<BTreeSet<String>>,
    cached_info: RwLock<Option<IdentityInfo>>,
    state: Mutex<IdentityState>,
    queue: Mutex<VecDeque<QueuedOp>>,
    disposable: DisposableState,
}

impl Identity {
    /// Construct the identity wrapping `id`. A freshly created (not yet
    /// stored) identity starts `Ready` immediately — there's nothing to
    /// register; an already-saved one starts `NeedsRegistration` and
    /// loads its cached info on the first operation.
    #[must_use]
    pub fn new(
        id: IdentityId,
        db: Arc<CredentialsDB>,
        gate: Arc<dyn AccessControlGate>,
        ui: Arc<dyn UIClient>,
        events: Arc<HandleEventBus<String>>,
    ) -> Self {
        let state = if id.is_new() { IdentityState::Ready } else { IdentityState::NeedsRegistration };
        let cached_info = if id.is_new() { Some(IdentityInfo::new()) } else { None };
        Self {
            id: RwLock::new(id),
            db,
            gate,
            ui,
            events,
            observers: Mutex::new(BTreeSet::new()),
            cached_info: RwLock::new(cached_info),
            state: Mutex::new(state),
            queue: Mutex::new(VecDeque::new()),
            disposable: DisposableState::new(),
        }
    }

    /// The identity id this instance currently wraps (`NEW` until a
    /// `store` call assigns one).
    pub async fn id(&self) -> IdentityId {
        *self.id.read().await
    }

    /// The embedded inactivity-GC state, for the daemon's registry sweep
    /// (`signon_core::DisposableRegistry::sweep_ready`).
    #[must_use]
    pub fn disposable_state(&self) -> &signon_core::DisposableState {
        &self.disposable
    }

    /// Attach `handle_name` as an observer of this identity's broadcast
    /// signals (`credentials_stored`, `infoUpdated`, ...).
    pub async fn register_observer(&self, handle_name: String) {
        self.observers.lock().await.insert(handle_name);
    }

    /// Detach `handle_name`, e.g. once its owning handle is torn down.
    pub async fn deregister_observer(&self, handle_name: &str) {
        self.observers.lock().await.remove(handle_name);
    }

    /// Mark the cached info stale, forcing the next operation to
    /// re-query it before running (spec `NeedsUpdate` transition) —
    /// called by the daemon when it knows the record changed out from
    /// under this instance (e.g. a sibling `Identity` for the same id
    /// just stored an update).
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if *state == IdentityState::Ready {
            *state = IdentityState::NeedsUpdate;
        }
    }

    /// `store(info)`.
    pub async fn store(self: &Arc<Self>, info: IdentityInfo, caller: CallerContext) -> IdentityResult<IdentityId> {
        let (reply, rx) = oneshot::channel();
        self.push_op(QueuedOp::Store { info, caller, reply }).await;
        recv(rx).await
    }

    /// `request_credentials_update(message)`.
    pub async fn request_credentials_update(self: &Arc<Self>, message: String, caller: CallerContext) -> IdentityResult<()> {
        let (reply, rx) = oneshot::channel();
        self.push_op(QueuedOp::RequestCredentialsUpdate { message, caller, reply }).await;
        recv(rx).await
    }

    /// `get_info()`.
    pub async fn get_info(self: &Arc<Self>) -> IdentityResult<PropertyMap> {
        let (reply, rx) = oneshot::channel();
        self.push_op(QueuedOp::GetInfo { reply }).await;
        recv(rx).await
    }

    /// `add_reference(name)`.
    pub async fn add_reference(self: &Arc<Self>, name: String, caller: CallerContext) -> IdentityResult<()> {
        let (reply, rx) = oneshot::channel();
        self.push_op(QueuedOp::AddReference { name, caller, reply }).await;
        recv(rx).await
    }

    /// `remove_reference(name)`.
    pub async fn remove_reference(self: &Arc<Self>, name: String, caller: CallerContext) -> IdentityResult<()> {
        let (reply, rx) = oneshot::channel();
        self.push_op(QueuedOp::RemoveReference { name, caller, reply }).await;
        recv(rx).await
    }

    /// `verify_user(params)`.
    pub async fn verify_user(self: &Arc<Self>, params: PropertyMap, caller: CallerContext) -> IdentityResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.push_op(QueuedOp::VerifyUser { params, caller, reply }).await;
        recv(rx).await
    }

    /// `verify_secret(secret)`.
    pub async fn verify_secret(self: &Arc<Self>, secret: String) -> IdentityResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.push_op(QueuedOp::VerifySecret { secret, reply }).await;
        recv(rx).await
    }

    /// `remove()`.
    pub async fn remove(self: &Arc<Self>, caller: CallerContext) -> IdentityResult<()> {
        let (reply, rx) = oneshot::channel();
        self.push_op(QueuedOp::Remove { caller, reply }).await;
        recv(rx).await
    }

    /// `sign_out()`. `initiator` is excluded from the broadcast
    /// `infoUpdated(SignedOut)` sent to every other observer.
    pub async fn sign_out(self: &Arc<Self>, caller: CallerContext, initiator: String) -> IdentityResult<()> {
        let (reply, rx) = oneshot::channel();
        self.push_op(QueuedOp::SignOut { caller, initiator, reply }).await;
        recv(rx).await
    }

    async fn push_op(self: &Arc<Self>, op: QueuedOp) {
        self.disposable.keep_in_use();
        let mut queue = self.queue.lock().await;
        let was_idle = queue.is_empty();
        queue.push_back(op);
        drop(queue);
        if was_idle {
            self.disposable.set_auto_destruct(false);
            let this = Arc::clone(self);
            tokio::spawn(async move { this.drive().await });
        }
    }

    async fn drive(self: Arc<Self>) {
        loop {
            let state = *self.state.lock().await;
            match state {
                IdentityState::Removed => {
                    self.fail_queue_not_found().await;
                    self.disposable.set_auto_destruct(true);
                    break;
                }
                IdentityState::NeedsRegistration => {
                    *self.state.lock().await = IdentityState::PendingRegistration;
                    self.refresh_info().await;
                }
                IdentityState::PendingRegistration | IdentityState::NeedsUpdate => {
                    self.refresh_info().await;
                }
                IdentityState::Ready => {
                    let op = {
                        let mut queue = self.queue.lock().await;
                        queue.pop_front()
                    };
                    let Some(op) = op else {
                        self.disposable.set_auto_destruct(true);
                        break;
                    };
                    self.execute(op).await;
                }
            }
        }
    }

    async fn fail_queue_not_found(&self) {
        let id = self.id().await;
        let mut queue = self.queue.lock().await;
        for op in queue.drain(..) {
            op.fail_not_found(id);
        }
    }

    /// Registration (`NeedsRegistration`) and refresh (`NeedsUpdate`)
    /// both resolve to the same step: reload the record from storage and
    /// either cache it and go `Ready`, or discover it's gone and go
    /// `Removed`.
    async fn refresh_info(&self) {
        let id = self.id().await;
        if id.is_new() {
            *self.cached_info.write().await = Some(IdentityInfo::new());
            *self.state.lock().await = IdentityState::Ready;
            return;
        }
        match self.db.credentials(id, true).await {
            Ok(info) => {
                *self.cached_info.write().await = Some(info);
                *self.state.lock().await = IdentityState::Ready;
            }
            Err(err) => {
                debug!(identity = %id, error = %err, "registration found no such identity");
                *self.state.lock().await = IdentityState::Removed;
            }
        }
    }

    async fn execute(&self, op: QueuedOp) {
        match op {
            QueuedOp::Store { info, caller, reply } => {
                let _ = reply.send(self.do_store(info, caller).await);
            }
            QueuedOp::RequestCredentialsUpdate { message, caller, reply } => {
                let _ = reply.send(self.do_request_credentials_update(message, caller).await);
            }
            QueuedOp::GetInfo { reply } => {
                let _ = reply.send(self.do_get_info().await);
            }
            QueuedOp::AddReference { name, caller, reply } => {
                let _ = reply.send(self.do_add_reference(name, caller).await);
            }
            QueuedOp::RemoveReference { name, caller, reply } => {
                let _ = reply.send(self.do_remove_reference(name, caller).await);
            }
            QueuedOp::VerifyUser { params, caller, reply } => {
                let _ = reply.send(self.do_verify_user(params, caller).await);
            }
            QueuedOp::VerifySecret { secret, reply } => {
                let _ = reply.send(self.do_verify_secret(secret).await);
            }
            QueuedOp::Remove { caller, reply } => {
                let _ = reply.send(self.do_remove(caller).await);
            }
            QueuedOp::SignOut { caller, initiator, reply } => {
                let _ = reply.send(self.do_sign_out(caller, &initiator).await);
            }
        }
    }

    async fn do_store(&self, mut info: IdentityInfo, caller: CallerContext) -> IdentityResult<IdentityId> {
        let id = self.id().await;
        if !id.is_new() {
            let owners = self.db.owners(id).await?;
            if !self.gate.is_keychain_widget(&caller) && self.gate.owner_of_identity(&caller, &owners) != OwnerStatus::Owner {
                return Err(IdentityError::PermissionDenied);
            }
        }

        let caller_id = self.gate.app_id(&caller);
        if caller_id.0.is_empty() && info.owners.is_empty() {
            return Err(IdentityError::OrphanIdentity);
        }
        if !caller_id.0.is_empty() && info.owners.is_empty() {
            // signonidentity.cpp: if the owner list is empty, default it to
            // the storing application so the creator keeps modify rights (I1).
            info.owners.insert(caller_id);
        }

        info.id = id;
        let assigned_id = if id.is_new() {
            self.db.insert(info.clone()).await?
        } else {
            self.db.update(info.clone()).await?;
            id
        };
        info.id = assigned_id;
        *self.id.write().await = assigned_id;
        *self.cached_info.write().await = Some(info);
        self.broadcast(Signal::CredentialsStored { id: assigned_id.0 });
        Ok(assigned_id)
    }

    async fn do_request_credentials_update(&self, message: String, caller: CallerContext) -> IdentityResult<()> {
        let id = self.id().await;
        if id.is_new() {
            return Err(IdentityError::NotFound(id));
        }
        let mut info = self.db.credentials(id, true).await?;
        if !info.store_secret {
            return Err(IdentityError::SecretNotStored);
        }
        if !self.gate.allowed_for_identity(&caller, &info.acl) {
            return Err(IdentityError::PermissionDenied);
        }

        let dialog_params = PropertyMap::new()
            .with(keys::QUERY_MESSAGE, message)
            .with(keys::QUERY_PASSWORD, true)
            .with(keys::USER_NAME, info.username.clone());
        let reply = self
            .ui
            .query_dialog(dialog_params)
            .await
            .map_err(|err| IdentityError::DialogFailed(err.to_string()))?;
        let Some(secret) = reply.get_str(keys::SECRET) else {
            return Err(IdentityError::DialogFailed("dialog returned no secret".into()));
        };
        info.secret = secret.to_string();
        info.validated = true;
        self.db.update(info.clone()).await?;
        *self.cached_info.write().await = Some(info);
        self.broadcast(Signal::InfoUpdated(InfoUpdatedKind::DataUpdated));
        Ok(())
    }

    async fn do_get_info(&self) -> IdentityResult<PropertyMap> {
        let id = self.id().await;
        if id.is_new() {
            let info = self.cached_info.read().await.clone().unwrap_or_default();
            return Ok(info.without_secret().to_map());
        }
        let info = self.db.credentials(id, false).await?;
        *self.cached_info.write().await = Some(info.clone());
        Ok(info.to_map())
    }

    async fn do_add_reference(&self, name: String, caller: CallerContext) -> IdentityResult<()> {
        let id = self.id().await;
        if id.is_new() {
            return Err(IdentityError::NotFound(id));
        }
        let acl = self.db.acl(id).await?;
        if !self.gate.allowed_for_identity(&caller, &acl) {
            return Err(IdentityError::PermissionDenied);
        }
        let app_token = self.gate.app_id(&caller);
        self.db.add_reference(id, app_token, name.clone()).await?;
        self.broadcast(Signal::ReferenceAdded { name });
        Ok(())
    }

    async fn do_remove_reference(&self, name: String, caller: CallerContext) -> IdentityResult<()> {
        let id = self.id().await;
        if id.is_new() {
            return Err(IdentityError::NotFound(id));
        }
        let acl = self.db.acl(id).await?;
        if !self.gate.allowed_for_identity(&caller, &acl) {
            return Err(IdentityError::PermissionDenied);
        }
        let app_token = self.gate.app_id(&caller);
        self.db.remove_reference(id, &app_token, &name).await?;
        self.broadcast(Signal::ReferenceRemoved { name });
        Ok(())
    }

    async fn do_verify_user(&self, params: PropertyMap, caller: CallerContext) -> IdentityResult<bool> {
        let id = self.id().await;
        if id.is_new() {
            return Err(IdentityError::NotFound(id));
        }
        let info = self.db.credentials(id, true).await?;
        if !self.gate.allowed_for_identity(&caller, &info.acl) {
            return Err(IdentityError::PermissionDenied);
        }

        let mut dialog_params = params;
        dialog_params.set(keys::USER_NAME, info.username.clone());
        dialog_params.set(keys::CAPTION, info.caption.clone());
        dialog_params.set(keys::QUERY_PASSWORD, true);
        let reply = self
            .ui
            .query_dialog(dialog_params)
            .await
            .map_err(|err| IdentityError::DialogFailed(err.to_string()))?;

        let matched = info.store_secret && reply.get_str(keys::SECRET).unwrap_or_default() == info.secret;
        self.broadcast(Signal::UserVerified { matched });
        Ok(matched)
    }

    async fn do_verify_secret(&self, secret: String) -> IdentityResult<bool> {
        let id = self.id().await;
        if id.is_new() {
            return Err(IdentityError::NotFound(id));
        }
        let info = self.db.credentials(id, true).await?;
        let matched = info.store_secret && info.secret == secret;
        self.broadcast(Signal::SecretVerified { matched });
        Ok(matched)
    }

    async fn do_remove(&self, caller: CallerContext) -> IdentityResult<()> {
        let id = self.id().await;
        if id.is_new() {
            return Err(IdentityError::NotFound(id));
        }
        let owners = self.db.owners(id).await?;
        if !self.gate.is_keychain_widget(&caller) && self.gate.owner_of_identity(&caller, &owners) != OwnerStatus::Owner {
            return Err(IdentityError::PermissionDenied);
        }
        self.db.remove(id).await?;
        *self.cached_info.write().await = None;
        *self.state.lock().await = IdentityState::Removed;
        self.broadcast(Signal::InfoUpdated(InfoUpdatedKind::Removed));
        Ok(())
    }

    async fn do_sign_out(&self, caller: CallerContext, initiator: &str) -> IdentityResult<()> {
        let id = self.id().await;
        if id.is_new() {
            return Err(IdentityError::NotFound(id));
        }
        let acl = self.db.acl(id).await?;
        if !self.gate.allowed_for_identity(&caller, &acl) {
            return Err(IdentityError::PermissionDenied);
        }
        self.db.remove_data(id).await?;
        self.broadcast_except(initiator, Signal::InfoUpdated(InfoUpdatedKind::SignedOut));
        Ok(())
    }

    fn broadcast(&self, signal: Signal) {
        self.broadcast_except("", signal);
    }

    fn broadcast_except(&self, exclude: &str, signal: Signal) {
        // Observer membership barely ever changes mid-operation (only
        // handle attach/detach touch it) so a non-blocking lock is
        // always expected to succeed here; fall back to skipping the
        // broadcast rather than blocking the driver loop if it doesn't.
        let Ok(observers) = self.observers.try_lock() else {
            debug!("observer set busy, dropping a broadcast signal");
            return;
        };
        for name in observers.iter().filter(|n| n.as_str() != exclude) {
            self.events.emit(name, signal.clone());
        }
    }
}

impl Disposable for Identity {
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

async fn recv<T>(rx: oneshot::Receiver<IdentityResult<T>>) -> IdentityResult<T> {
    match rx.await {
        Ok(result) => result,
        Err(_) => Err(IdentityError::Closed),
    }
}
