//! The [`AccessControlGate`] trait and its default implementations
//! (spec.md §4.3, C3).

use signon_core::ids::AppToken;
use std::collections::BTreeSet;

/// Everything C3 is told about the caller of an inbound request. What
/// populates this is platform-specific (peer pid, a D-Bus unique name, a
/// TLS client cert subject, ...); the core only ever reasons about the
/// resolved [`AppToken`].
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    /// OS process id of the peer, when the transport exposes one.
    pub pid: Option<u32>,
    /// A stable platform identifier for the caller's application, if the
    /// transport already resolved one (e.g. a package/bundle id).
    pub app_token: Option<AppToken>,
    /// Whether the platform considers this caller privileged enough to
    /// be granted the wildcard `"*"` application-id.
    pub wildcard_eligible: bool,
    /// Whether this caller is the keychain/identity-management UI
    /// (spec.md §4.3 `is_keychain_widget`).
    pub keychain_widget: bool,
}

impl CallerContext {
    /// A caller context carrying just a resolved app token — the common
    /// case in tests and for transports that resolve identity upstream.
    #[must_use]
    pub fn with_app_token(token: impl Into<AppToken>) -> Self {
        Self {
            app_token: Some(token.into()),
            ..Self::default()
        }
    }

    /// The keychain widget's caller context.
    #[must_use]
    pub fn keychain_widget() -> Self {
        Self {
            keychain_widget: true,
            wildcard_eligible: true,
            ..Self::default()
        }
    }
}

/// Result of [`AccessControlGate::owner_of_identity`] — tri-valued because
/// "the identity has no recorded owners" is a distinct case from "this
/// caller isn't one of them" (an unowned identity can still be claimed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerStatus {
    /// The caller is a recorded owner.
    Owner,
    /// Owners are recorded, but this caller isn't among them.
    NotOwner,
    /// The identity has no recorded owners at all.
    NoOwnerSet,
}

/// Caller resolution and ACL/owner policy (spec.md C3).
///
/// A gate may be compiled as a no-op (see [`NoopGate`]) — the rest of the
/// core must still consult it rather than special-casing its absence.
pub trait AccessControlGate: Send + Sync {
    /// Resolve the caller to an application-id. `"*"` is only ever
    /// returned for callers the platform marked `wildcard_eligible`.
    fn app_id(&self, caller: &CallerContext) -> AppToken;

    /// Whether `caller` may *use* an identity with the given ACL: true
    /// iff the ACL is empty (private), contains `"*"`, or contains
    /// `app_id(caller)`.
    fn allowed_for_identity(&self, caller: &CallerContext, acl: &BTreeSet<AppToken>) -> bool {
        if acl.is_empty() {
            return true;
        }
        acl.contains(&AppToken::from(AppToken::WILDCARD)) || acl.contains(&self.app_id(caller))
    }

    /// Whether `caller` owns (may modify/remove) an identity with the
    /// given owners set.
    fn owner_of_identity(&self, caller: &CallerContext, owners: &BTreeSet<AppToken>) -> OwnerStatus {
        if owners.is_empty() {
            return OwnerStatus::NoOwnerSet;
        }
        let id = self.app_id(caller);
        if owners.contains(&AppToken::from(AppToken::WILDCARD)) || owners.contains(&id) {
            OwnerStatus::Owner
        } else {
            OwnerStatus::NotOwner
        }
    }

    /// Whether `caller` is the privileged identity-management UI.
    fn is_keychain_widget(&self, caller: &CallerContext) -> bool {
        caller.keychain_widget
    }

    /// Platform policy on what ACL a caller may *write*. The default
    /// policy restricts the wildcard token to privileged callers — a
    /// non-privileged application must not be able to make its own
    /// identity world-readable.
    fn acl_is_valid(&self, caller: &CallerContext, acl: &BTreeSet<AppToken>) -> bool {
        let wildcard = AppToken::from(AppToken::WILDCARD);
        !acl.contains(&wildcard) || caller.wildcard_eligible || self.is_keychain_widget(caller)
    }
}

/// The gate used when the platform has no caller-identification transport
/// at all: every caller is granted the wildcard id and every ACL is
/// accepted. Still consulted on every call, per spec.md §4.3.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGate;

impl AccessControlGate for NoopGate {
    fn app_id(&self, _caller: &CallerContext) -> AppToken {
        AppToken::from(AppToken::WILDCARD)
    }

    fn allowed_for_identity(&self, _caller: &CallerContext, _acl: &BTreeSet<AppToken>) -> bool {
        true
    }

    fn owner_of_identity(&self, _caller: &CallerContext, _owners: &BTreeSet<AppToken>) -> OwnerStatus {
        OwnerStatus::Owner
    }

    fn acl_is_valid(&self, _caller: &CallerContext, _acl: &BTreeSet<AppToken>) -> bool {
        true
    }
}

/// The default strict gate: resolves `app_id` from the caller's supplied
/// token, falling back to the wildcard only when the caller carries none
/// and is marked `wildcard_eligible` (e.g. a trusted system service).
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictGate;

impl AccessControlGate for StrictGate {
    fn app_id(&self, caller: &CallerContext) -> AppToken {
        if let Some(token) = &caller.app_token {
            return token.clone();
        }
        if caller.wildcard_eligible {
            return AppToken::from(AppToken::WILDCARD);
        }
        AppToken::from("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_acl_is_allowed_to_everyone() {
        let gate = StrictGate;
        let caller = CallerContext::with_app_token("com.example.app");
        assert!(gate.allowed_for_identity(&caller, &BTreeSet::new()));
    }

    #[test]
    fn acl_grants_only_listed_tokens() {
        let gate = StrictGate;
        let mut acl = BTreeSet::new();
        acl.insert(AppToken::from("com.example.app"));

        let allowed = CallerContext::with_app_token("com.example.app");
        let denied = CallerContext::with_app_token("com.other.app");
        assert!(gate.allowed_for_identity(&allowed, &acl));
        assert!(!gate.allowed_for_identity(&denied, &acl));
    }

    #[test]
    fn wildcard_acl_grants_every_caller() {
        let gate = StrictGate;
        let mut acl = BTreeSet::new();
        acl.insert(AppToken::from(AppToken::WILDCARD));
        let caller = CallerContext::with_app_token("com.anyone.app");
        assert!(gate.allowed_for_identity(&caller, &acl));
    }

    #[test]
    fn owner_of_identity_is_tri_valued() {
        let gate = StrictGate;
        let mut owners = BTreeSet::new();
        owners.insert(AppToken::from("com.example.app"));

        let owner = CallerContext::with_app_token("com.example.app");
        let stranger = CallerContext::with_app_token("com.other.app");
        assert_eq!(gate.owner_of_identity(&owner, &owners), OwnerStatus::Owner);
        assert_eq!(gate.owner_of_identity(&stranger, &owners), OwnerStatus::NotOwner);
        assert_eq!(
            gate.owner_of_identity(&stranger, &BTreeSet::new()),
            OwnerStatus::NoOwnerSet
        );
    }

    #[test]
    fn acl_is_valid_rejects_wildcard_from_unprivileged_caller() {
        let gate = StrictGate;
        let mut acl = BTreeSet::new();
        acl.insert(AppToken::from(AppToken::WILDCARD));

        let app = CallerContext::with_app_token("com.example.app");
        let widget = CallerContext::keychain_widget();
        assert!(!gate.acl_is_valid(&app, &acl));
        assert!(gate.acl_is_valid(&widget, &acl));
    }

    #[test]
    fn acl_is_valid_accepts_non_wildcard_acl_from_anyone() {
        let gate = StrictGate;
        let mut acl = BTreeSet::new();
        acl.insert(AppToken::from("com.example.app"));
        let caller = CallerContext::with_app_token("com.example.app");
        assert!(gate.acl_is_valid(&caller, &acl));
    }

    #[test]
    fn noop_gate_grants_everything() {
        let gate = NoopGate;
        let caller = CallerContext::default();
        let mut acl = BTreeSet::new();
        acl.insert(AppToken::from("com.example.app"));
        assert!(gate.allowed_for_identity(&caller, &acl));
        assert_eq!(gate.owner_of_identity(&caller, &BTreeSet::new()), OwnerStatus::Owner);
    }
}
