//! [`IdentityHandle`] — a client's view onto a shared [`Identity`].

use std::sync::Arc;

use signon_access::CallerContext;
use signon_core::ids::IdentityId;
use signon_core::{IdentityInfo, PropertyMap};
use signon_events::{HandleEventBus, HandleEventReceiver};

use crate::error::IdentityResult;
use crate::identity::Identity;

/// A client's view onto a shared [`Identity`]. Registers itself as a
/// broadcast observer on construction so `infoUpdated`/`credentials_stored`
/// signals reach it; callers should `detach` before dropping the last
/// reference to a handle (`Drop` can't await the deregistration).
pub struct IdentityHandle {
    name: String,
    core: Arc<Identity>,
    caller: CallerContext,
}

impl IdentityHandle {
    /// Wrap `core` behind a handle named `name`, acting on behalf of
    /// `caller`, registering as a broadcast observer.
    pub async fn new(name: String, core: Arc<Identity>, caller: CallerContext) -> Self {
        core.register_observer(name.clone()).await;
        Self { name, core, caller }
    }

    /// This handle's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The identity id this handle currently wraps.
    pub async fn id(&self) -> IdentityId {
        self.core.id().await
    }

    /// `store(info)`.
    pub async fn store(&self, info: IdentityInfo) -> IdentityResult<IdentityId> {
        self.core.store(info, self.caller.clone()).await
    }

    /// `request_credentials_update(message)`.
    pub async fn request_credentials_update(&self, message: String) -> IdentityResult<()> {
        self.core.request_credentials_update(message, self.caller.clone()).await
    }

    /// `get_info()`.
    pub async fn get_info(&self) -> IdentityResult<PropertyMap> {
        self.core.get_info().await
    }

    /// `add_reference(name)`.
    pub async fn add_reference(&self, name: String) -> IdentityResult<()> {
        self.core.add_reference(name, self.caller.clone()).await
    }

    /// `remove_reference(name)`.
    pub async fn remove_reference(&self, name: String) -> IdentityResult<()> {
        self.core.remove_reference(name, self.caller.clone()).await
    }

    /// `verify_user(params)`.
    pub async fn verify_user(&self, params: PropertyMap) -> IdentityResult<bool> {
        self.core.verify_user(params, self.caller.clone()).await
    }

    /// `verify_secret(secret)`.
    pub async fn verify_secret(&self, secret: String) -> IdentityResult<bool> {
        self.core.verify_secret(secret).await
    }

    /// `remove()`.
    pub async fn remove(&self) -> IdentityResult<()> {
        self.core.remove(self.caller.clone()).await
    }

    /// `sign_out()`. This handle's own name is passed through as the
    /// broadcast's excluded initiator.
    pub async fn sign_out(&self) -> IdentityResult<()> {
        self.core.sign_out(self.caller.clone(), self.name.clone()).await
    }

    /// Subscribe to this handle's signal stream.
    #[must_use]
    pub fn subscribe(&self, bus: &HandleEventBus<String>) -> HandleEventReceiver {
        bus.subscribe(self.name.clone())
    }

    /// Detach from the shared identity's observer set. Must be called
    /// explicitly before the handle is dropped; `Drop` has no async
    /// counterpart to do this automatically.
    pub async fn detach(&self) {
        self.core.deregister_observer(&self.name).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use signon_access::StrictGate;
    use signon_core::ids::AppToken;
    use signon_events::{InfoUpdatedKind, Signal};
    use signon_storage::CredentialsDB;
    use signon_ui::{UIClient, UiResult};

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

    async fn make_handle(
        id: IdentityId,
        db: Arc<CredentialsDB>,
        caller: CallerContext,
        events: Arc<HandleEventBus<String>>,
    ) -> IdentityHandle {
        let core = Arc::new(Identity::new(id, db, Arc::new(StrictGate), Arc::new(NullUi), events));
        IdentityHandle::new("handle-1".to_string(), core, caller).await
    }

    #[tokio::test]
    async fn store_rejects_a_non_owner_caller() {
        let db = Arc::new(CredentialsDB::in_memory());
        let mut info = IdentityInfo::new();
        info.owners.insert(AppToken::from("com.example.app"));
        let id = db.insert(info).await.unwrap();

        let handle = make_handle(
            id,
            db,
            CallerContext::with_app_token("com.mallory.app"),
            Arc::new(HandleEventBus::new()),
        )
        .await;

        let err = handle.store(IdentityInfo { id, ..IdentityInfo::new() }).await.unwrap_err();
        assert!(matches!(err, crate::error::IdentityError::PermissionDenied));
    }

    #[tokio::test]
    async fn remove_delivers_removed_on_every_attached_handle_including_itself() {
        let db = Arc::new(CredentialsDB::in_memory());
        let mut info = IdentityInfo::new();
        info.owners.insert(AppToken::from("com.example.app"));
        let id = db.insert(info).await.unwrap();
        let events = Arc::new(HandleEventBus::new());

        let handle = make_handle(id, db, CallerContext::with_app_token("com.example.app"), Arc::clone(&events)).await;
        let mut rx = handle.subscribe(&events);

        handle.remove().await.unwrap();

        let signal = rx.recv().await.unwrap();
        assert!(matches!(signal, Signal::InfoUpdated(InfoUpdatedKind::Removed)));
    }

    #[tokio::test]
    async fn detach_stops_future_broadcasts_reaching_this_handle() {
        let db = Arc::new(CredentialsDB::in_memory());
        let mut info = IdentityInfo::new();
        info.owners.insert(AppToken::from("com.example.app"));
        let id = db.insert(info).await.unwrap();
        let events = Arc::new(HandleEventBus::new());

        let handle = make_handle(id, db, CallerContext::with_app_token("com.example.app"), Arc::clone(&events)).await;
        let mut rx = handle.subscribe(&events);
        handle.detach().await;

        handle.remove().await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
