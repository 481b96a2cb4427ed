//! Request counters (spec.md §9 supplement, grounded in the original's
//! `m_identityRequestCount`/`m_authSessionRequestCount`). Observability
//! only — nothing in the daemon branches on these values.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters of control-surface activity.
#[derive(Default)]
pub struct Stats {
    identity_requests: AtomicU64,
    authsession_requests: AtomicU64,
}

impl Stats {
    /// A fresh, zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_identity_request(&self) {
        self.identity_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_authsession_request(&self) {
        self.authsession_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Total identity-handle requests served since startup.
    #[must_use]
    pub fn identity_requests(&self) -> u64 {
        self.identity_requests.load(Ordering::Relaxed)
    }

    /// Total session-handle requests served since startup.
    #[must_use]
    pub fn authsession_requests(&self) -> u64 {
        self.authsession_requests.load(Ordering::Relaxed)
    }
}
