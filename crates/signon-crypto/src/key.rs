//! Secret key material handling.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A key used to unlock the encrypted volume. Zeroized on drop so a key
/// that passes through a key-slot operation doesn't linger in memory
/// after use.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VolumeKey(Vec<u8>);

impl VolumeKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Borrow the raw bytes (for handing to a key-file or `cryptsetup`
    /// invocation).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for VolumeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("VolumeKey").field(&"<redacted>").finish()
    }
}

impl PartialEq for VolumeKey {
    fn eq(&self, other: &Self) -> bool {
        // Not constant-time: key equality here only ever short-circuits a
        // same-process `key_in_use` optimisation, not an authentication
        // decision (that's delegated to `cryptsetup` itself).
        self.0 == other.0
    }
}
