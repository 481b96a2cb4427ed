//! Background inactivity-sweep loop (spec.md §4.10, §5 "Disposable
//! sweep runs on the main task").
//!
//! [`Daemon::sweep`](crate::Daemon::sweep) is synchronous and
//! side-effect-free beyond dropping expired registry entries, so driving
//! it from a ticking interval on its own task is safe: it never blocks
//! behind a plugin or UI round-trip, and nothing it touches is shared
//! mutably outside the registries' own locking.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::daemon::Daemon;

/// Guard that aborts the sweep loop when dropped, so a daemon shutting
/// down doesn't leave a task sweeping a registry nobody can observe
/// anymore.
pub struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Spawn the periodic sweep loop. `period` should be comfortably smaller
/// than the shortest configured inactivity timeout so expired handles
/// don't linger much past their deadline; the daemon binary picks a
/// fixed fraction of the lower of `identity_timeout`/`authsession_timeout`.
#[must_use]
pub fn spawn_sweep_loop(daemon: Arc<Daemon>, period: Duration) -> AbortOnDrop {
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            debug!(
                identities = daemon.identity_count(),
                sessions = daemon.session_count(),
                "running inactivity sweep"
            );
            daemon.sweep();
        }
    });
    AbortOnDrop(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Stats;
    use signon_access::{CallerContext, StrictGate};
    use signon_crypto::{CryptoVolume, FsType};
    use signon_storage::CredentialsDB;
    use signon_ui::{UIClient, UiResult};
    use std::path::PathBuf;
    use tokio::sync::Mutex as AsyncMutex;

    struct NullUi;

    #[async_trait::async_trait]
    impl UIClient for NullUi {
        async fn query_dialog(&self, params: signon_core::PropertyMap) -> UiResult<signon_core::PropertyMap> {
            Ok(params)
        }
        async fn refresh_dialog(&self, params: signon_core::PropertyMap) -> UiResult<signon_core::PropertyMap> {
            Ok(params)
        }
        async fn cancel_ui_request(&self, _request_id: &str) {}
    }

    fn make_daemon() -> Arc<Daemon> {
        let _ = Stats::new();
        Arc::new(Daemon::new(
            Arc::new(CredentialsDB::in_memory()),
            Arc::new(AsyncMutex::new(CryptoVolume::new(
                "/tmp/signon-gc-test.db",
                "/tmp/signon-gc-test-mnt",
                FsType::Ext4,
            ))),
            Arc::new(StrictGate),
            Arc::new(NullUi),
            PathBuf::from("/no/such/plugin/dir"),
            Duration::from_millis(20),
            Duration::from_millis(20),
            Duration::from_millis(5000),
        ))
    }

    #[tokio::test]
    async fn sweep_loop_reclaims_idle_unreferenced_handles() {
        let daemon = make_daemon();
        let handle = daemon.register_new_identity(CallerContext::default()).await;
        drop(handle);
        assert_eq!(daemon.identity_count(), 1);

        let _guard = spawn_sweep_loop(Arc::clone(&daemon), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(daemon.identity_count(), 0);
    }

    #[tokio::test]
    async fn dropping_the_guard_stops_the_loop() {
        let daemon = make_daemon();
        let guard = spawn_sweep_loop(Arc::clone(&daemon), Duration::from_millis(5));
        drop(guard);
        // No observable effect beyond not panicking; the task is aborted.
    }
}
