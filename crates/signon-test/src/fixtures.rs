//! Test fixtures for common `signond` value types.

use std::collections::BTreeSet;

use signon_core::ids::{AppToken, MechanismName, MethodName};
use signon_core::IdentityInfo;
use signon_storage::CredentialsDB;

/// A minimal valid identity owned by `owner`, with no stored secret.
#[must_use]
pub fn test_identity(owner: &str) -> IdentityInfo {
    let mut info = IdentityInfo::new();
    info.caption = "Test account".into();
    info.username = "alice".into();
    info.owners.insert(AppToken::from(owner));
    info
}

/// A test identity that also stores a secret and supports the `sasl`
/// method with the `PLAIN` mechanism — the common shape needed to spin up
/// a [`signon_session::SessionCore`] in a test.
#[must_use]
pub fn test_identity_with_secret(owner: &str, username: &str, secret: &str) -> IdentityInfo {
    let mut info = test_identity(owner);
    info.username = username.into();
    info.secret = secret.into();
    info.store_secret = true;
    info.methods.insert(
        MethodName::from("sasl"),
        BTreeSet::from([MechanismName::from("PLAIN")]),
    );
    info
}

/// An in-memory [`CredentialsDB`] pre-populated with `test_identity(owner)`,
/// returning the DB and the id it was assigned.
pub async fn seeded_db(owner: &str) -> (CredentialsDB, signon_core::ids::IdentityId) {
    let db = CredentialsDB::in_memory();
    let id = db.insert(test_identity(owner)).await.expect("seed insert cannot fail");
    (db, id)
}
