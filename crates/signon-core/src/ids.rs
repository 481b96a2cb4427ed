//! Identity and addressing primitives (spec.md §3, §6 glossary).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a persisted [`crate::IdentityInfo`] record.
///
/// `0` is the sentinel value for "new, unsaved" (spec.md §3, I4): an id is
/// assigned by the credentials store on first insertion and is immutable
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityId(pub u32);

impl IdentityId {
    /// The sentinel id for an identity that has never been persisted.
    pub const NEW: Self = Self(0);

    /// Whether this id denotes an unsaved identity.
    #[must_use]
    pub fn is_new(self) -> bool {
        self == Self::NEW
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for IdentityId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Platform-level identifier for a calling process/application
/// (spec.md glossary: "Application-id / token").
///
/// `"*"` denotes "any application" when used inside an ACL or owners set;
/// a gate may choose to grant it as the caller's own id only for callers
/// the platform considers privileged (spec.md §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppToken(pub String);

impl AppToken {
    /// The wildcard token meaning "any application".
    pub const WILDCARD: &'static str = "*";

    /// Whether this token is the wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD
    }
}

impl fmt::Display for AppToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AppToken {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for AppToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Name of an authentication method, e.g. `"sasl"` or `"password"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodName(pub String);

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MethodName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for MethodName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The literal method name `"password"`, which is exempt from the
/// secret-stripping rule in `SessionCore::on_result` (spec.md §4.5).
pub const PASSWORD_METHOD: &str = "password";

/// Name of a mechanism within a method, e.g. `"PLAIN"` within `sasl`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MechanismName(pub String);

impl fmt::Display for MechanismName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MechanismName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for MechanismName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_new() {
        assert!(IdentityId::NEW.is_new());
        assert!(IdentityId(0).is_new());
        assert!(!IdentityId(1).is_new());
    }

    #[test]
    fn wildcard_token() {
        assert!(AppToken::from("*").is_wildcard());
        assert!(!AppToken::from("com.example.app").is_wildcard());
    }
}
