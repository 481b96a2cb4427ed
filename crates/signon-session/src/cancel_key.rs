//! Opaque identifiers for a specific queued or in-flight request
//! (spec.md glossary: "Cancel-key").

use std::fmt;
use uuid::Uuid;

/// Identifies one request enqueued on a [`crate::core::SessionCore`] for
/// the purposes of `cancel()`. Opaque to clients — they only ever get one
/// back from `process()` and hand it back unchanged to `cancel()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancelKey(Uuid);

impl CancelKey {
    /// Mint a fresh, unused cancel-key.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CancelKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CancelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_key_is_distinct() {
        assert_ne!(CancelKey::new(), CancelKey::new());
    }
}
