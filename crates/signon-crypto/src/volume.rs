//! [`CryptoVolume`] — format/mount/unmount an encrypted filesystem image
//! and manage its LUKS key slots (spec.md §4.1, C1).

use crate::error::{CryptoError, CryptoResult};
use crate::key::VolumeKey;
use crate::state::VolumeState;
use rand::RngCore;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Filesystem placed on the decrypted mapper device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsType {
    /// ext2
    Ext2,
    /// ext3
    Ext3,
    /// ext4
    Ext4,
}

impl FsType {
    fn mkfs_binary(self) -> &'static str {
        match self {
            Self::Ext2 => "mkfs.ext2",
            Self::Ext3 => "mkfs.ext3",
            Self::Ext4 => "mkfs.ext4",
        }
    }
}

/// Maximum number of LUKS key slots (spec.md §4.1).
pub const MAX_KEY_SLOTS: u32 = 8;

/// Presents a decrypted directory backed by a single encrypted file
/// (spec.md §4.1). Owns exactly one volume; the daemon (C8) is the only
/// component allowed to call `setup`/`mount`/`unmount` on it
/// (spec.md §5 "shared-resource policy").
pub struct CryptoVolume {
    backing_file: PathBuf,
    mapper_name: String,
    mount_path: PathBuf,
    fs_type: FsType,
    state: VolumeState,
    loop_device: Option<PathBuf>,
}

impl CryptoVolume {
    /// Create a volume manager for the given backing file and mount path.
    /// The mapper name is derived from the backing file's basename, as the
    /// original does in `CryptoManager::setFileSystemPath`.
    #[must_use]
    pub fn new(backing_file: impl Into<PathBuf>, mount_path: impl Into<PathBuf>, fs_type: FsType) -> Self {
        let backing_file = backing_file.into();
        let mapper_name = backing_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "signond".to_string());
        Self {
            backing_file,
            mapper_name,
            mount_path: mount_path.into(),
            fs_type,
            state: VolumeState::Unmounted,
            loop_device: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> VolumeState {
        self.state
    }

    fn mapper_path(&self) -> PathBuf {
        PathBuf::from("/dev/mapper").join(&self.mapper_name)
    }

    /// Format a brand-new encrypted volume and mount it: allocate the
    /// backing file, LUKS-format it with `key` in slot 0, make a
    /// filesystem, and mount. Equivalent to spec.md §4.1 steps (1)-(7).
    pub async fn setup(&mut self, key: &VolumeKey, size_mb: u64, fstype: FsType) -> CryptoResult<()> {
        self.fs_type = fstype;
        self.reclaim_stale_mapping().await;

        if let Err(e) = self.create_backing_file(size_mb).await {
            self.unmount().await.ok();
            return Err(e);
        }

        if let Err(e) = self.attach_loop_device().await {
            self.unmount().await.ok();
            return Err(e);
        }
        self.state = VolumeState::LoopSet;

        if let Err(e) = self.luks_format(key).await {
            self.unmount().await.ok();
            return Err(e);
        }

        if let Err(e) = self.luks_open(key).await {
            self.unmount().await.ok();
            return Err(e);
        }
        self.state = VolumeState::LoopLuksOpened;

        if let Err(e) = self.mkfs().await {
            self.unmount().await.ok();
            return Err(e);
        }

        if let Err(e) = self.do_mount().await {
            self.unmount().await.ok();
            return Err(e);
        }
        self.state = VolumeState::Mounted;

        info!(path = %self.mount_path.display(), "volume set up and mounted");
        Ok(())
    }

    /// Mount an existing encrypted volume: same as `setup` but skipping
    /// the format and mkfs steps (spec.md §4.1 "mount" algorithm).
    pub async fn mount(&mut self, key: &VolumeKey) -> CryptoResult<()> {
        self.reclaim_stale_mapping().await;

        if let Err(e) = self.attach_loop_device().await {
            self.unmount().await.ok();
            return Err(e);
        }
        self.state = VolumeState::LoopSet;

        if let Err(e) = self.luks_open(key).await {
            self.unmount().await.ok();
            return Err(e);
        }
        self.state = VolumeState::LoopLuksOpened;

        if let Err(e) = self.do_mount().await {
            self.unmount().await.ok();
            return Err(e);
        }
        self.state = VolumeState::Mounted;

        info!(path = %self.mount_path.display(), "volume mounted");
        Ok(())
    }

    /// Tear the volume down through however many states were reached,
    /// leaving it `Unmounted` and secrets inaccessible (spec.md §4.1
    /// "the volume fails closed").
    pub async fn unmount(&mut self) -> CryptoResult<()> {
        if self.state >= VolumeState::Mounted {
            self.do_unmount().await;
        }
        if self.state >= VolumeState::LoopLuksOpened {
            self.luks_close().await;
        }
        if self.state >= VolumeState::LoopSet {
            self.detach_loop_device().await;
        }
        self.state = VolumeState::Unmounted;
        debug!("volume unmounted");
        Ok(())
    }

    /// Whether `relative_path` would resolve inside the mounted volume.
    #[must_use]
    pub fn contains(&self, relative_path: &Path) -> bool {
        self.state.secrets_available() && !relative_path.is_absolute()
    }

    /// Add a new key slot, authorised by an existing valid key
    /// (spec.md §4.1 "key-slot discipline").
    pub async fn add_key(&self, existing: &VolumeKey, new: &VolumeKey) -> CryptoResult<()> {
        self.require_state(VolumeState::LoopSet)?;
        let loop_dev = self.loop_device_path()?;
        let existing_file = write_keyfile(existing).await?;
        let new_file = write_keyfile(new).await?;
        run_cryptsetup(&[
            "luksAddKey",
            loop_dev.to_str().unwrap_or_default(),
            new_file.path().to_str().unwrap_or_default(),
            "--key-file",
            existing_file.path().to_str().unwrap_or_default(),
        ])
        .await
        .map_err(|e| CryptoError::KeySlot(e.to_string()))
    }

    /// Remove a key slot. `remaining` must still be a valid key once the
    /// removal completes — it authorises the removal but is never itself
    /// destroyed (spec.md §4.1).
    pub async fn remove_key(&self, victim: &VolumeKey, remaining: &VolumeKey) -> CryptoResult<()> {
        self.require_state(VolumeState::LoopSet)?;
        let loop_dev = self.loop_device_path()?;
        if !self.key_valid(&loop_dev, remaining).await {
            return Err(CryptoError::KeySlot(
                "remaining key does not authorise this volume".into(),
            ));
        }
        let victim_file = write_keyfile(victim).await?;
        run_cryptsetup(&[
            "luksRemoveKey",
            loop_dev.to_str().unwrap_or_default(),
            victim_file.path().to_str().unwrap_or_default(),
        ])
        .await
        .map_err(|e| CryptoError::KeySlot(e.to_string()))
    }

    /// Whether `candidate` currently unlocks a key slot. Implemented by
    /// attempting to add then immediately remove a transient dummy key
    /// authorised by `candidate`; any failure means "not in use"
    /// (spec.md §4.1).
    pub async fn key_in_use(&self, candidate: &VolumeKey) -> bool {
        let Ok(loop_dev) = self.loop_device_path() else {
            return false;
        };
        let dummy = VolumeKey::new(random_probe_bytes());
        if self.add_key(candidate, &dummy).await.is_err() {
            return false;
        }
        let removed = self.remove_key(&dummy, candidate).await.is_ok();
        removed
    }

    // -- internal steps --

    fn require_state(&self, min: VolumeState) -> CryptoResult<()> {
        if self.state < min {
            return Err(CryptoError::WrongState {
                expected: format!("{min:?}"),
                actual: format!("{:?}", self.state),
            });
        }
        Ok(())
    }

    fn loop_device_path(&self) -> CryptoResult<PathBuf> {
        self.loop_device.clone().ok_or_else(|| CryptoError::WrongState {
            expected: "LoopSet".into(),
            actual: "Unmounted".into(),
        })
    }

    async fn create_backing_file(&self, size_mb: u64) -> CryptoResult<()> {
        if self.backing_file.exists() {
            return Ok(());
        }
        if let Some(parent) = self.backing_file.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&self.backing_file).await?;
        let mut rng = rand::thread_rng();
        let mut chunk = vec![0u8; 1024 * 1024];
        let total_chunks = size_mb.max(1);
        for _ in 0..total_chunks {
            rng.fill_bytes(&mut chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    /// Clean up any leftover loop device/mapper from a previous crash
    /// before (re-)setting up, per spec.md §4.1 step (2) and
    /// SPEC_FULL.md's `reclaim_stale_mapping` supplement.
    async fn reclaim_stale_mapping(&mut self) {
        let mapper = self.mapper_path();
        if mapper.exists() {
            warn!(mapper = %mapper.display(), "closing stale luks mapping from a previous run");
            let _ = run_cryptsetup(&["luksClose", &self.mapper_name]).await;
        }
        if let Ok(output) = Command::new("losetup")
            .args(["-j", &self.backing_file.to_string_lossy()])
            .output()
            .await
        {
            let text = String::from_utf8_lossy(&output.stdout);
            if let Some(dev) = text.split(':').next() {
                if !dev.is_empty() {
                    warn!(dev, "detaching stale loop device from a previous run");
                    let _ = Command::new("losetup").args(["-d", dev]).status().await;
                }
            }
        }
    }

    async fn attach_loop_device(&mut self) -> CryptoResult<()> {
        let output = Command::new("losetup")
            .args(["--find", "--show", &self.backing_file.to_string_lossy()])
            .output()
            .await?;
        if !output.status.success() {
            return Err(CryptoError::CommandFailed {
                command: "losetup --find --show".into(),
                detail: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        let dev = String::from_utf8_lossy(&output.stdout).trim().to_string();
        self.loop_device = Some(PathBuf::from(dev));
        Ok(())
    }

    async fn detach_loop_device(&mut self) {
        if let Some(dev) = self.loop_device.take() {
            let _ = Command::new("losetup").args(["-d", &dev.to_string_lossy()]).status().await;
        }
    }

    async fn luks_format(&self, key: &VolumeKey) -> CryptoResult<()> {
        let loop_dev = self.loop_device_path()?;
        let keyfile = write_keyfile(key).await?;
        run_cryptsetup(&[
            "luksFormat",
            "--type",
            "luks2",
            "--cipher",
            "aes-xts-plain64",
            "--key-size",
            "256",
            "--batch-mode",
            loop_dev.to_str().unwrap_or_default(),
            keyfile.path().to_str().unwrap_or_default(),
        ])
        .await
    }

    async fn luks_open(&self, key: &VolumeKey) -> CryptoResult<()> {
        let loop_dev = self.loop_device_path()?;
        let keyfile = write_keyfile(key).await?;
        run_cryptsetup(&[
            "luksOpen",
            loop_dev.to_str().unwrap_or_default(),
            &self.mapper_name,
            "--key-file",
            keyfile.path().to_str().unwrap_or_default(),
        ])
        .await
    }

    async fn luks_close(&mut self) {
        let _ = run_cryptsetup(&["luksClose", &self.mapper_name]).await;
    }

    async fn mkfs(&self) -> CryptoResult<()> {
        let mapper = self.mapper_path();
        let output = Command::new(self.fs_type.mkfs_binary())
            .arg("-F")
            .arg(&mapper)
            .output()
            .await?;
        if !output.status.success() {
            return Err(CryptoError::CommandFailed {
                command: self.fs_type.mkfs_binary().into(),
                detail: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    #[cfg(unix)]
    async fn do_mount(&self) -> CryptoResult<()> {
        use nix::mount::{mount, MsFlags};
        std::fs::create_dir_all(&self.mount_path)?;
        let mapper = self.mapper_path();
        let mount_path = self.mount_path.clone();
        let fstype = match self.fs_type {
            FsType::Ext2 => "ext2",
            FsType::Ext3 => "ext3",
            FsType::Ext4 => "ext4",
        };
        tokio::task::spawn_blocking(move || {
            mount(
                Some(mapper.as_path()),
                mount_path.as_path(),
                Some(fstype),
                MsFlags::MS_SYNCHRONOUS | MsFlags::MS_NOEXEC,
                None::<&str>,
            )
        })
        .await
        .map_err(|e| CryptoError::Mount(e.to_string()))?
        .map_err(|e| CryptoError::Mount(e.to_string()))
    }

    #[cfg(not(unix))]
    async fn do_mount(&self) -> CryptoResult<()> {
        Err(CryptoError::Mount("mount is only supported on unix".into()))
    }

    #[cfg(unix)]
    async fn do_unmount(&self) {
        use nix::mount::{umount2, MntFlags};
        let mount_path = self.mount_path.clone();
        let _ = tokio::task::spawn_blocking(move || umount2(mount_path.as_path(), MntFlags::MNT_DETACH)).await;
    }

    #[cfg(not(unix))]
    async fn do_unmount(&self) {}

    async fn key_valid(&self, loop_dev: &Path, key: &VolumeKey) -> bool {
        let Ok(keyfile) = write_keyfile(key).await else {
            return false;
        };
        Command::new("cryptsetup")
            .args([
                "luksOpen",
                "--test-passphrase",
                loop_dev.to_str().unwrap_or_default(),
                "--key-file",
                keyfile.path().to_str().unwrap_or_default(),
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

async fn run_cryptsetup(args: &[&str]) -> CryptoResult<()> {
    let output = Command::new("cryptsetup").args(args).output().await?;
    if !output.status.success() {
        return Err(CryptoError::CommandFailed {
            command: format!("cryptsetup {}", args.join(" ")),
            detail: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

/// Write key bytes to a private, 0600 temp file for handing to
/// `cryptsetup --key-file`, which refuses to read passphrases off argv.
async fn write_keyfile(key: &VolumeKey) -> CryptoResult<tempfile::NamedTempFile> {
    use std::io::Write;
    let file = tempfile::NamedTempFile::new()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))?;
    }
    let mut handle = file.reopen()?;
    handle.write_all(key.as_bytes())?;
    handle.flush()?;
    Ok(file)
}

fn random_probe_bytes() -> Vec<u8> {
    let mut bytes = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapper_name_derived_from_backing_file() {
        let vol = CryptoVolume::new("/var/lib/signond/signon.db", "/run/signond/mnt", FsType::Ext4);
        assert_eq!(vol.mapper_name, "signon.db");
        assert_eq!(vol.mapper_path(), PathBuf::from("/dev/mapper/signon.db"));
    }

    #[test]
    fn starts_unmounted_and_fails_closed() {
        let vol = CryptoVolume::new("/tmp/signon.db", "/tmp/signon-mnt", FsType::Ext4);
        assert_eq!(vol.state(), VolumeState::Unmounted);
        assert!(!vol.state().secrets_available());
        assert!(!vol.contains(Path::new("blobs/1")));
    }

    #[tokio::test]
    async fn add_key_requires_loop_set_state() {
        let vol = CryptoVolume::new("/tmp/signon-test.db", "/tmp/signon-test-mnt", FsType::Ext4);
        let key = VolumeKey::new(b"existing".to_vec());
        let new = VolumeKey::new(b"new".to_vec());
        let err = vol.add_key(&key, &new).await.unwrap_err();
        assert!(matches!(err, CryptoError::WrongState { .. }));
    }
}
