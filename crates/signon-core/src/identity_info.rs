//! [`IdentityInfo`] — the value object described in spec.md §4.11 (C11).

use crate::ids::{AppToken, IdentityId, MechanismName, MethodName};
use crate::property_map::PropertyMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The `credentials_type` enum from spec.md §3. Values are or-able on the
/// wire (a bitmask), matching the original's `CredentialsType` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsType(pub u32);

impl CredentialsType {
    /// No particular classification.
    pub const OTHER: Self = Self(0b0000);
    /// An application-scoped credential.
    pub const APPLICATION: Self = Self(0b0001);
    /// A web-login credential.
    pub const WEB: Self = Self(0b0010);
    /// A network-service credential.
    pub const NETWORK: Self = Self(0b0100);

    /// Combine two classifications (the "or-able" part of the spec).
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether `self` includes the given classification bit.
    #[must_use]
    pub fn includes(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for CredentialsType {
    fn default() -> Self {
        Self::OTHER
    }
}

/// The persistent identity record described in spec.md §3.
///
/// Invariants enforced by [`signon_storage::CredentialsDB`], not by this
/// value type: (I1) non-empty owners once persisted with an app-id caller,
/// (I2) `validated` locks `username`, (I3) `secret` is only persisted when
/// `store_secret`, (I4) `id` is assigned once and immutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityInfo {
    /// Identity id; `IdentityId::NEW` until first `insert`.
    pub id: IdentityId,
    /// Free-form display caption.
    pub caption: String,
    /// The stored username.
    pub username: String,
    /// The stored secret (password). Present only when read with secrets.
    pub secret: String,
    /// Whether the secret should be persisted at all (I3).
    pub store_secret: bool,
    /// Whether this identity has completed at least one successful
    /// authentication (I2: locks `username` once true).
    pub validated: bool,
    /// Credential classification bitmask.
    pub credentials_type: CredentialsType,
    /// Realms this identity applies to.
    pub realms: BTreeSet<String>,
    /// method name -> set of allowed mechanism names; an empty mechanism
    /// set means "any mechanism" (spec.md §3).
    pub methods: BTreeMap<MethodName, BTreeSet<MechanismName>>,
    /// Application tokens permitted to *use* this identity. Empty means
    /// private to the owner(s); containing `"*"` means any caller.
    pub acl: BTreeSet<AppToken>,
    /// Application tokens permitted to *modify*/remove this identity.
    pub owners: BTreeSet<AppToken>,
    /// app-token -> named references held against this identity. A
    /// non-empty entry here keeps the record alive even once its client
    /// handles disappear (spec.md §3 lifecycle).
    pub refs: BTreeMap<AppToken, BTreeSet<String>>,
}

impl IdentityInfo {
    /// A fresh, unsaved identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total reference count across all owning applications.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.refs.values().map(BTreeSet::len).sum()
    }

    /// Serialise to the wire property-map representation (spec.md §4.11).
    ///
    /// `secret` is only included when `store_secret` is set, matching I3 —
    /// callers that need to unconditionally strip the secret (e.g. a
    /// `getInfo()` reply) should `remove(keys::SECRET)` on the result.
    #[must_use]
    pub fn to_map(&self) -> PropertyMap {
        let mut map = PropertyMap::new()
            .with(crate::keys::CAPTION, self.caption.clone())
            .with(crate::keys::USER_NAME, self.username.clone())
            .with("StoreSecret", self.store_secret)
            .with("Validated", self.validated)
            .with("Type", self.credentials_type.0)
            .with("Realms", self.realms.iter().cloned().collect::<Vec<_>>())
            .with(
                "Methods",
                self.methods
                    .iter()
                    .map(|(m, mechs)| {
                        (
                            m.0.clone(),
                            mechs.iter().map(|mech| mech.0.clone()).collect::<Vec<_>>(),
                        )
                    })
                    .collect::<BTreeMap<_, _>>(),
            )
            .with(
                "ACL",
                self.acl.iter().map(|t| t.0.clone()).collect::<Vec<_>>(),
            )
            .with(
                "Owner",
                self.owners.iter().map(|t| t.0.clone()).collect::<Vec<_>>(),
            );
        if self.store_secret {
            map.set(crate::keys::SECRET, self.secret.clone());
        }
        map.set("Id", self.id.0);
        map
    }

    /// Parse from the wire property-map representation. Unknown/missing
    /// fields fall back to their defaults rather than erroring, matching
    /// the original's tolerant `IdentityInfoImpl::updateFromMap`.
    #[must_use]
    pub fn from_map(map: &PropertyMap) -> Self {
        let mut info = Self::new();
        info.id = IdentityId(map.get("Id").and_then(serde_json::Value::as_u64).unwrap_or(0) as u32);
        info.caption = map.get_str(crate::keys::CAPTION).unwrap_or_default().to_string();
        info.username = map.get_str(crate::keys::USER_NAME).unwrap_or_default().to_string();
        info.secret = map.get_str(crate::keys::SECRET).unwrap_or_default().to_string();
        info.store_secret = map.get_bool("StoreSecret").unwrap_or(false);
        info.validated = map.get_bool("Validated").unwrap_or(false);
        info.credentials_type = CredentialsType(
            map.get("Type").and_then(serde_json::Value::as_u64).unwrap_or(0) as u32,
        );
        if let Some(realms) = map.get("Realms").and_then(|v| v.as_array()) {
            info.realms = realms
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
        }
        if let Some(methods) = map.get("Methods").and_then(|v| v.as_object()) {
            for (method, mechs) in methods {
                let set = mechs
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().map(MechanismName::from))
                            .collect()
                    })
                    .unwrap_or_default();
                info.methods.insert(MethodName::from(method.clone()), set);
            }
        }
        if let Some(acl) = map.get("ACL").and_then(|v| v.as_array()) {
            info.acl = acl
                .iter()
                .filter_map(|v| v.as_str().map(AppToken::from))
                .collect();
        }
        if let Some(owners) = map.get("Owner").and_then(|v| v.as_array()) {
            info.owners = owners
                .iter()
                .filter_map(|v| v.as_str().map(AppToken::from))
                .collect();
        }
        info
    }

    /// A copy with the secret field cleared — used whenever an info is
    /// returned to a caller that didn't explicitly ask for the secret
    /// (spec.md DB2: "`list` never returns secrets").
    #[must_use]
    pub fn without_secret(&self) -> Self {
        let mut clone = self.clone();
        clone.secret.clear();
        clone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IdentityInfo {
        let mut info = IdentityInfo::new();
        info.id = IdentityId(7);
        info.caption = "Work account".into();
        info.username = "alice".into();
        info.secret = "hunter2".into();
        info.store_secret = true;
        info.validated = true;
        info.credentials_type = CredentialsType::WEB;
        info.realms.insert("example.com".into());
        info.methods
            .insert(MethodName::from("sasl"), BTreeSet::from([MechanismName::from("PLAIN")]));
        info.acl.insert(AppToken::from("com.example.app"));
        info.owners.insert(AppToken::from("com.example.app"));
        info
    }

    #[test]
    fn round_trips_through_property_map() {
        let info = sample();
        let map = info.to_map();
        let back = IdentityInfo::from_map(&map);
        assert_eq!(back.id, info.id);
        assert_eq!(back.username, info.username);
        assert_eq!(back.secret, info.secret);
        assert_eq!(back.realms, info.realms);
        assert_eq!(back.methods, info.methods);
        assert_eq!(back.acl, info.acl);
        assert_eq!(back.owners, info.owners);
    }

    #[test]
    fn to_map_omits_secret_when_not_stored() {
        let mut info = sample();
        info.store_secret = false;
        let map = info.to_map();
        assert!(map.get(crate::keys::SECRET).is_none());
    }

    #[test]
    fn without_secret_clears_the_field() {
        let info = sample();
        let stripped = info.without_secret();
        assert!(stripped.secret.is_empty());
        assert_eq!(stripped.username, info.username);
    }

    #[test]
    fn credentials_type_union_and_includes() {
        let t = CredentialsType::WEB.union(CredentialsType::NETWORK);
        assert!(t.includes(CredentialsType::WEB));
        assert!(t.includes(CredentialsType::NETWORK));
        assert!(!t.includes(CredentialsType::APPLICATION));
    }
}
