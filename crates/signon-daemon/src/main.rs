//! `signond` — the binary entrypoint assembling C1-C9 into a running
//! daemon (spec.md §2, §6, §9 "global daemon state").
//!
//! Startup order matters: the encrypted volume (or plain metadata
//! directory, if secure storage is disabled) must be open before the
//! credentials store can be opened on top of it, and both must be ready
//! before the control surface accepts its first request. Any failure in
//! that sequence is fatal and exits with code 1 (spec.md §6 "Exit codes").

#![deny(unsafe_code)]
#![warn(unreachable_pub)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use signon_access::{AccessControlGate, NoopGate, StrictGate};
use signon_config::Config;
use signon_core::PropertyMap;
use signon_crypto::{CryptoVolume, FsType, VolumeKey};
use signon_daemon::{spawn_sweep_loop, Daemon};
use signon_storage::CredentialsDB;
use signon_ui::{UIClient, UiError, UiResult};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "signond", about = "Single sign-on credential daemon")]
struct Cli {
    /// Path to an explicit config file; wins over system/user config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Exercise startup (open the volume, open the store) and exit
    /// without serving requests. Useful for a systemd `ExecStartPre`
    /// health probe.
    #[arg(long)]
    check: bool,
}

/// No dialog-process transport is implemented in this core (spec.md §1:
/// the UI dialog process is an external collaborator); every interactive
/// auth flow that reaches a `UI` tag fails closed with `ServiceNotAvailable`
/// rather than hanging forever. A real deployment wires
/// [`signon_ui::DialogProcessClient`] to its platform's dialog transport
/// in its place.
struct NoDialogClient;

#[async_trait::async_trait]
impl UIClient for NoDialogClient {
    async fn query_dialog(&self, _params: PropertyMap) -> UiResult<PropertyMap> {
        Err(UiError::Unreachable("no UI dialog transport configured".into()))
    }

    async fn refresh_dialog(&self, _params: PropertyMap) -> UiResult<PropertyMap> {
        Err(UiError::Unreachable("no UI dialog transport configured".into()))
    }

    async fn cancel_ui_request(&self, _request_id: &str) {}
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn fs_type_of(name: &str) -> FsType {
    match name {
        "ext2" => FsType::Ext2,
        "ext3" => FsType::Ext3,
        _ => FsType::Ext4,
    }
}

/// `SSO_IDENTITY_TIMEOUT`/`SSO_AUTHSESSION_TIMEOUT` override the config
/// file's timeouts at runtime (spec.md §6 "Environment/config").
fn apply_env_overrides(config: &mut Config) {
    if let Ok(raw) = std::env::var("SSO_IDENTITY_TIMEOUT") {
        match raw.parse() {
            Ok(secs) => config.daemon.identity_timeout_secs = secs,
            Err(_) => warn!(value = %raw, "ignoring malformed SSO_IDENTITY_TIMEOUT"),
        }
    }
    if let Ok(raw) = std::env::var("SSO_AUTHSESSION_TIMEOUT") {
        match raw.parse() {
            Ok(secs) => config.daemon.authsession_timeout_secs = secs,
            Err(_) => warn!(value = %raw, "ignoring malformed SSO_AUTHSESSION_TIMEOUT"),
        }
    }
}

async fn load_volume_key(path: &std::path::Path) -> anyhow::Result<VolumeKey> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(VolumeKey::new(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no volume key on disk yet; generating one");
            use rand::RngCore;
            let mut bytes = vec![0u8; 64];
            rand::thread_rng().fill_bytes(&mut bytes);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, &bytes).await?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
            }
            Ok(VolumeKey::new(bytes))
        }
        Err(e) => Err(e.into()),
    }
}

/// Bring up C1 (and, through it, C2): format-and-mount a brand-new volume
/// if the backing file doesn't exist yet, otherwise just mount the
/// existing one (spec.md §4.1 `setup` vs `mount`).
async fn open_secure_storage(config: &Config) -> anyhow::Result<(CryptoVolume, CredentialsDB)> {
    let storage = &config.storage;
    let key_path = storage
        .key_file
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("storage.secure is true but no key_file is configured"))?;
    let key = load_volume_key(key_path).await?;

    let mut volume = CryptoVolume::new(storage.backing_file.clone(), storage.mount_path.clone(), fs_type_of(&storage.filesystem));
    if storage.backing_file.exists() {
        volume.mount(&key).await?;
    } else {
        volume.setup(&key, storage.size_mb, fs_type_of(&storage.filesystem)).await?;
    }

    let db = CredentialsDB::open(storage.mount_path.join("credentials")).await?;
    Ok((volume, db))
}

fn build_gate(access_policy: &str) -> Arc<dyn AccessControlGate> {
    match access_policy {
        "noop" => Arc::new(NoopGate) as Arc<dyn AccessControlGate>,
        other => {
            if other != "strict" {
                warn!(policy = other, "unknown access_policy, defaulting to strict");
            }
            Arc::new(StrictGate) as Arc<dyn AccessControlGate>
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => signon_config::load_file(path)?,
        None => signon_config::load(None)?,
    };
    apply_env_overrides(&mut config);

    info!(
        secure = config.storage.secure,
        socket = %config.daemon.socket_path.display(),
        "starting signond"
    );

    let (volume, db) = if config.storage.secure {
        open_secure_storage(&config).await?
    } else {
        info!("secure storage disabled; opening a plain metadata directory");
        let db = CredentialsDB::open(config.storage.mount_path.join("credentials")).await?;
        let volume = CryptoVolume::new(
            config.storage.backing_file.clone(),
            config.storage.mount_path.clone(),
            fs_type_of(&config.storage.filesystem),
        );
        (volume, db)
    };

    if cli.check {
        info!("startup check passed");
        return Ok(());
    }

    let gate = build_gate(&config.daemon.access_policy);
    let ui = Arc::new(NoDialogClient) as Arc<dyn UIClient>;

    let daemon = Arc::new(Daemon::new(
        Arc::new(db),
        Arc::new(AsyncMutex::new(volume)),
        gate,
        ui,
        config.daemon.plugin_dir.clone(),
        Duration::from_secs(config.daemon.identity_timeout_secs),
        Duration::from_secs(config.daemon.authsession_timeout_secs),
        Duration::from_millis(config.daemon.plugin_start_timeout_ms),
    ));

    let sweep_period = Duration::from_secs(config.daemon.identity_timeout_secs.min(config.daemon.authsession_timeout_secs).max(1) / 4).max(Duration::from_secs(1));
    let _sweep_guard = spawn_sweep_loop(Arc::clone(&daemon), sweep_period);

    match discovered_method_count(&daemon) {
        Ok(n) => info!(methods = n, dir = %config.daemon.plugin_dir.display(), "plugin directory scanned"),
        Err(e) => warn!(error = %e, "failed to scan plugin directory at startup"),
    }

    info!("{}", "signond ready".green());
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, tearing down");

    Ok(())
}

fn discovered_method_count(daemon: &Daemon) -> anyhow::Result<usize> {
    Ok(daemon.query_methods()?.len())
}

/// Every startup failure is fatal and exits 1 (spec.md §6); exit code 2
/// is reserved for a plugin child's own privilege-drop failure, observed
/// and logged by [`signon_plugin::PluginProxy`] rather than by `main`.
#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "signond initialisation failed");
            ExitCode::from(1)
        }
    }
}
