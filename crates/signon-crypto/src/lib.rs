//! Encrypted storage volume management for `signond` (spec.md §4.1, C1).
//!
//! [`CryptoVolume`] presents a decrypted directory backed by a single
//! LUKS-on-loopback image. It is a process-wide singleton owned by the
//! daemon (C8); every other component reaches secrets through
//! `signon-storage`, which requires the volume to be mounted.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod key;
pub mod state;
pub mod volume;

pub use error::{CryptoError, CryptoResult};
pub use key::VolumeKey;
pub use state::VolumeState;
pub use volume::{CryptoVolume, FsType, MAX_KEY_SLOTS};
