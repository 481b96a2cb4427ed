//! The resolved configuration shape (spec.md §6 "Environment/config").

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Storage-volume configuration: whether to use secure (encrypted)
/// storage, and where everything lives on disk (spec.md §4.1, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Whether identities and secrets live behind an encrypted volume.
    /// When `false`, `signon-storage` opens a plain on-disk directory
    /// and secrets are always available (spec.md §4.8 "open the
    /// metadata-only DB when encryption is disabled").
    pub secure: bool,
    /// Size of the backing file created on first setup, in megabytes.
    pub size_mb: u64,
    /// Filesystem to format the volume with: `ext2`, `ext3`, or `ext4`.
    pub filesystem: String,
    /// Path to the LUKS-on-loopback backing file.
    pub backing_file: PathBuf,
    /// Directory the decrypted volume is mounted at.
    pub mount_path: PathBuf,
    /// Path to the file holding the raw volume key. `None` disables
    /// secure storage regardless of `secure` (there is nothing to open
    /// the volume with).
    pub key_file: Option<PathBuf>,
}

/// Daemon-level configuration: sockets, plugin discovery, inactivity
/// timeouts (spec.md §5 "Timeouts", §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path to the daemon's client transport socket.
    pub socket_path: PathBuf,
    /// Directory scanned for `lib<method>plugin.*` files.
    pub plugin_dir: PathBuf,
    /// Identity inactivity timeout, in seconds. Overridable at runtime
    /// via `SSO_IDENTITY_TIMEOUT`.
    pub identity_timeout_secs: u64,
    /// SessionCore inactivity timeout, in seconds. Overridable at
    /// runtime via `SSO_AUTHSESSION_TIMEOUT`.
    pub authsession_timeout_secs: u64,
    /// Plugin handshake timeout, in milliseconds.
    pub plugin_start_timeout_ms: u64,
    /// Which [`signon_access::AccessControlGate`] to install at startup:
    /// `"strict"` or `"noop"`. Spec.md §9 calls for a strict-allow or
    /// strict-deny default chosen at build/config time, never silent;
    /// this is that choice, made explicit and restart-time rather than a
    /// loaded extension binary.
    pub access_policy: String,
}

/// The fully resolved configuration (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Encrypted-volume and credentials-store placement.
    pub storage: StorageConfig,
    /// Daemon-level knobs.
    pub daemon: DaemonConfig,
}
