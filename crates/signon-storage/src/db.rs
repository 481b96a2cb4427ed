//! [`CredentialsDB`] — persisted identity records and per-method blobs
//! (spec.md §4.2, C2).
//!
//! Records live inside the directory the mounted [`signon_crypto::CryptoVolume`]
//! exposes. Metadata (everything but secrets and per-method blobs) is
//! written even when the volume is locked, matching the daemon's ability
//! to "open the metadata-only DB when encryption is disabled"
//! (spec.md §4.8); secrets and blobs require the volume mounted (DB3).

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use signon_core::ids::{AppToken, IdentityId, MethodName};
use signon_core::{IdentityInfo, PropertyMap};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const IDENTITIES_FILE: &str = "identities.json";
const BLOBS_FILE: &str = "blobs.json";

#[derive(Default, Serialize, Deserialize)]
struct OnDiskBlobs(BTreeMap<String, PropertyMap>);

fn blob_key(id: IdentityId, method: &MethodName) -> String {
    format!("{}:{}", id.0, method.0)
}

/// Persisted store of [`IdentityInfo`] records and per-(id, method) blobs.
pub struct CredentialsDB {
    root: PathBuf,
    identities: RwLock<HashMap<IdentityId, IdentityInfo>>,
    next_id: AtomicU32,
    blobs: RwLock<HashMap<(IdentityId, MethodName), PropertyMap>>,
    /// Blob writes accepted while secrets were unavailable, flushed once
    /// the volume is mounted again (spec.md DB3).
    pending_blob_writes: RwLock<HashMap<(IdentityId, MethodName), PropertyMap>>,
    secrets_available: AtomicBool,
}

impl CredentialsDB {
    /// Open (or initialise) the store rooted at `root`, which must be a
    /// directory inside the mounted volume (or, if encryption is
    /// disabled, a plain on-disk directory).
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let identities: HashMap<IdentityId, IdentityInfo> = match tokio::fs::read(root.join(IDENTITIES_FILE)).await {
            Ok(bytes) => serde_json::from_slice::<BTreeMap<u32, IdentityInfo>>(&bytes)?
                .into_iter()
                .map(|(id, info)| (IdentityId(id), info))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        let next_id = identities.keys().map(|id| id.0).max().unwrap_or(0) + 1;

        let blobs: HashMap<(IdentityId, MethodName), PropertyMap> = match tokio::fs::read(root.join(BLOBS_FILE)).await {
            Ok(bytes) => {
                let on_disk: OnDiskBlobs = serde_json::from_slice(&bytes)?;
                on_disk
                    .0
                    .into_iter()
                    .filter_map(|(key, map)| {
                        let (id, method) = key.split_once(':')?;
                        Some((
                            (IdentityId(id.parse().ok()?), MethodName::from(method.to_string())),
                            map,
                        ))
                    })
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            root,
            identities: RwLock::new(identities),
            next_id: AtomicU32::new(next_id),
            blobs: RwLock::new(blobs),
            pending_blob_writes: RwLock::new(HashMap::new()),
            secrets_available: AtomicBool::new(true),
        })
    }

    /// Open a purely in-memory store (used in tests and for `signon-test`
    /// fixtures).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            root: PathBuf::new(),
            identities: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            blobs: RwLock::new(HashMap::new()),
            pending_blob_writes: RwLock::new(HashMap::new()),
            secrets_available: AtomicBool::new(true),
        }
    }

    /// Called by the daemon when the backing [`signon_crypto::CryptoVolume`]
    /// mounts or unmounts. Flushes any pending blob writes on the
    /// unavailable→available transition (DB3).
    pub async fn set_secrets_available(&self, available: bool) {
        let was_available = self.secrets_available.swap(available, Ordering::SeqCst);
        if available && !was_available {
            let mut pending = self.pending_blob_writes.write().await;
            if !pending.is_empty() {
                debug!(count = pending.len(), "flushing queued blob writes");
                let mut blobs = self.blobs.write().await;
                for (key, value) in pending.drain() {
                    blobs.insert(key, value);
                }
                drop(blobs);
                drop(pending);
                let _ = self.persist_blobs().await;
            }
        }
    }

    fn secrets_available(&self) -> bool {
        self.secrets_available.load(Ordering::SeqCst)
    }

    async fn persist_identities(&self) -> StorageResult<()> {
        if self.root.as_os_str().is_empty() {
            return Ok(());
        }
        let identities = self.identities.read().await;
        let on_disk: BTreeMap<u32, &IdentityInfo> = identities.iter().map(|(id, info)| (id.0, info)).collect();
        let bytes = serde_json::to_vec_pretty(&on_disk)?;
        tokio::fs::write(self.root.join(IDENTITIES_FILE), bytes).await?;
        Ok(())
    }

    async fn persist_blobs(&self) -> StorageResult<()> {
        if self.root.as_os_str().is_empty() {
            return Ok(());
        }
        let blobs = self.blobs.read().await;
        let on_disk = OnDiskBlobs(
            blobs
                .iter()
                .map(|((id, method), map)| (blob_key(*id, method), map.clone()))
                .collect(),
        );
        let bytes = serde_json::to_vec_pretty(&on_disk)?;
        tokio::fs::write(self.root.join(BLOBS_FILE), bytes).await?;
        Ok(())
    }

    /// Insert a new identity, assigning it a fresh id (spec.md I4).
    pub async fn insert(&self, mut info: IdentityInfo) -> StorageResult<IdentityId> {
        self.check_owners_invariant(&info)?;
        let id = IdentityId(self.next_id.fetch_add(1, Ordering::SeqCst));
        info.id = id;
        if !info.store_secret {
            info.secret.clear();
        }
        self.identities.write().await.insert(id, info);
        self.persist_identities().await?;
        Ok(id)
    }

    /// Full overwrite of an existing identity (spec.md §4.2 `update`).
    /// On a `validated` record, `username` is locked (I2): a store that
    /// attempts to change it still succeeds (spec.md P2), just with the
    /// stored username carried over instead of the caller's.
    pub async fn update(&self, mut info: IdentityInfo) -> StorageResult<()> {
        let mut identities = self.identities.write().await;
        let existing = identities.get(&info.id).ok_or(StorageError::NotFound(info.id))?;
        if existing.validated && existing.username != info.username {
            info.username = existing.username.clone();
        }
        if !info.store_secret {
            info.secret.clear();
        }
        identities.insert(info.id, info);
        drop(identities);
        self.persist_identities().await
    }

    fn check_owners_invariant(&self, info: &IdentityInfo) -> StorageResult<()> {
        if info.owners.is_empty() && info.acl.iter().any(|t| !t.is_wildcard()) {
            // An application-scoped identity with a concrete ACL but no
            // owner would be unmodifiable forever; reject per I1. A
            // fully private record (empty ACL, no owners) is allowed —
            // it simply belongs to nobody but the keychain widget.
            return Err(StorageError::OrphanIdentity);
        }
        Ok(())
    }

    /// Remove an identity record entirely.
    pub async fn remove(&self, id: IdentityId) -> StorageResult<()> {
        let mut identities = self.identities.write().await;
        identities.remove(&id).ok_or(StorageError::NotFound(id))?;
        drop(identities);
        self.remove_data(id).await?;
        self.persist_identities().await
    }

    /// Clear only the per-method blobs for an identity (spec.md `sign_out`).
    pub async fn remove_data(&self, id: IdentityId) -> StorageResult<()> {
        let mut blobs = self.blobs.write().await;
        blobs.retain(|(bid, _), _| *bid != id);
        drop(blobs);
        let mut pending = self.pending_blob_writes.write().await;
        pending.retain(|(bid, _), _| *bid != id);
        drop(pending);
        self.persist_blobs().await
    }

    /// Wipe every identity and blob.
    pub async fn clear(&self) -> StorageResult<()> {
        self.identities.write().await.clear();
        self.blobs.write().await.clear();
        self.pending_blob_writes.write().await.clear();
        self.persist_identities().await?;
        self.persist_blobs().await
    }

    /// Fetch an identity's info. `with_secret` controls whether the
    /// secret field is populated (DB2: `list` never does, direct reads
    /// with explicit consent may).
    pub async fn credentials(&self, id: IdentityId, with_secret: bool) -> StorageResult<IdentityInfo> {
        let identities = self.identities.read().await;
        let info = identities.get(&id).ok_or(StorageError::NotFound(id))?;
        Ok(if with_secret { info.clone() } else { info.without_secret() })
    }

    /// List identities matching `filter` conjunctively (spec.md §4.2
    /// `list`). Secrets are never included (DB2).
    pub async fn list(&self, filter: &PropertyMap) -> StorageResult<Vec<IdentityInfo>> {
        let identities = self.identities.read().await;
        Ok(identities
            .values()
            .filter(|info| info.to_map().matches_filter(filter))
            .map(IdentityInfo::without_secret)
            .collect())
    }

    /// The ACL of an identity.
    pub async fn acl(&self, id: IdentityId) -> StorageResult<BTreeSet<AppToken>> {
        let identities = self.identities.read().await;
        Ok(identities.get(&id).ok_or(StorageError::NotFound(id))?.acl.clone())
    }

    /// The owners of an identity.
    pub async fn owners(&self, id: IdentityId) -> StorageResult<BTreeSet<AppToken>> {
        let identities = self.identities.read().await;
        Ok(identities.get(&id).ok_or(StorageError::NotFound(id))?.owners.clone())
    }

    /// Add a named reference held by `app_token` against `id`; identities
    /// with refs are kept alive even once client objects disappear
    /// (spec.md §3 lifecycle).
    pub async fn add_reference(&self, id: IdentityId, app_token: AppToken, name: String) -> StorageResult<()> {
        let mut identities = self.identities.write().await;
        let info = identities.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        info.refs.entry(app_token).or_default().insert(name);
        drop(identities);
        self.persist_identities().await
    }

    /// Remove a named reference.
    pub async fn remove_reference(&self, id: IdentityId, app_token: &AppToken, name: &str) -> StorageResult<()> {
        let mut identities = self.identities.write().await;
        let info = identities.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        if let Some(names) = info.refs.get_mut(app_token) {
            names.remove(name);
            if names.is_empty() {
                info.refs.remove(app_token);
            }
        }
        drop(identities);
        self.persist_identities().await
    }

    /// Store a per-(id, method) blob written by a plugin's `STORE`
    /// callback. Queued in memory if secrets are currently unavailable
    /// (DB3).
    pub async fn store_data(&self, id: IdentityId, method: MethodName, map: PropertyMap) -> StorageResult<()> {
        if !self.secrets_available() {
            self.pending_blob_writes.write().await.insert((id, method), map);
            return Ok(());
        }
        self.blobs.write().await.insert((id, method), map);
        self.persist_blobs().await
    }

    /// Load a per-(id, method) blob. Returns an empty map if secrets are
    /// unavailable (DB3), never an error — callers proceed with no
    /// cached data rather than failing the whole session.
    pub async fn load_data(&self, id: IdentityId, method: &MethodName) -> PropertyMap {
        if !self.secrets_available() {
            return PropertyMap::new();
        }
        self.blobs
            .read()
            .await
            .get(&(id, method.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Check a candidate username/secret pair against the stored record.
    pub async fn check_password(&self, id: IdentityId, username: &str, secret: &str) -> StorageResult<bool> {
        let identities = self.identities.read().await;
        let info = identities.get(&id).ok_or(StorageError::NotFound(id))?;
        Ok(info.username == username && info.store_secret && info.secret == secret)
    }
}
