//! `Disposable` — the inactivity-timeout base behaviour shared by
//! [`signon_identity::Identity`] and [`signon_session::SessionCore`]
//! (spec.md §4.10, C10).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared state backing the `Disposable` behaviour.
///
/// Components that need inactivity-GC embed a `DisposableState` field and
/// delegate `keep_in_use`/`set_auto_destruct`/`is_expired` to it, the way
/// the original's `SignonDisposable` base class is inherited by
/// `SignonIdentity`, `SignonSessionCore` and `SignonAuthSession`. Using
/// atomics rather than a mutex keeps `touch()` callable from any task
/// without contending with an in-flight plugin or UI operation.
#[derive(Debug)]
pub struct DisposableState {
    created_at: Instant,
    last_used_millis: AtomicU64,
    auto_destruct: AtomicBool,
}

impl DisposableState {
    /// Create state for a freshly created object: `auto_destruct` starts
    /// `true`, `last_used` starts at "now".
    #[must_use]
    pub fn new() -> Self {
        Self {
            created_at: Instant::now(),
            last_used_millis: AtomicU64::new(0),
            auto_destruct: AtomicBool::new(true),
        }
    }

    /// Refresh `last_used` to now (spec.md §4.10 `keep_in_use`).
    pub fn keep_in_use(&self) {
        let elapsed = self.created_at.elapsed().as_millis() as u64;
        self.last_used_millis.store(elapsed, Ordering::Relaxed);
    }

    /// Suppress or re-enable GC eligibility (spec.md §4.10
    /// `set_auto_destruct`). Used while a long interactive operation
    /// (an in-flight plugin call or an open UI dialog) is outstanding.
    pub fn set_auto_destruct(&self, enabled: bool) {
        self.auto_destruct.store(enabled, Ordering::Relaxed);
    }

    /// Whether this object is currently eligible for GC at all.
    #[must_use]
    pub fn auto_destruct(&self) -> bool {
        self.auto_destruct.load(Ordering::Relaxed)
    }

    /// How long it's been since this object was last touched.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        let last = self.last_used_millis.load(Ordering::Relaxed);
        let now = self.created_at.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(last))
    }

    /// Whether this object should be destroyed by a sweep run with the
    /// given `max_inactivity` threshold.
    #[must_use]
    pub fn is_expired(&self, max_inactivity: Duration) -> bool {
        self.auto_destruct() && self.idle_for() > max_inactivity
    }
}

impl Default for DisposableState {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for objects participating in inactivity-based garbage collection.
///
/// A static sweep iterates all live instances and destroys those with
/// `auto_destruct() && idle_for() > max_inactivity` (spec.md §4.10).
/// Implementors almost always delegate straight to an embedded
/// [`DisposableState`].
pub trait Disposable {
    /// Refresh the last-used timestamp.
    fn keep_in_use(&self);

    /// Enable/disable GC eligibility.
    fn set_auto_destruct(&self, enabled: bool);

    /// Whether this instance is ready to be swept given `max_inactivity`.
    fn is_expired(&self, max_inactivity: Duration) -> bool;
}

impl Disposable for DisposableState {
    fn keep_in_use(&self) {
        self.keep_in_use();
    }

    fn set_auto_destruct(&self, enabled: bool) {
        self.set_auto_destruct(enabled);
    }

    fn is_expired(&self, max_inactivity: Duration) -> bool {
        self.is_expired(max_inactivity)
    }
}

/// A keyed collection of disposable entries plus the sweep logic the
/// daemon's registries (saved identities, unsaved identities, sessions)
/// all need. Generic over the map's value type so each registry can keep
/// its own richer entry struct; `extract` projects out the embedded
/// [`DisposableState`].
pub struct DisposableRegistry;

impl DisposableRegistry {
    /// Return the keys whose entries are expired under `max_inactivity`,
    /// leaving removal itself to the caller (who may need to check for
    /// additional non-GC'able resources, e.g. an open UI dialog, before
    /// actually dropping the entry — spec.md §5 "Disposable sweep ...
    /// must skip objects currently owning a non-GC'able resource").
    pub fn sweep_ready<'a, K, V>(
        entries: impl IntoIterator<Item = (&'a K, &'a V)>,
        max_inactivity: Duration,
        extract: impl Fn(&V) -> &DisposableState,
    ) -> Vec<K>
    where
        K: Clone + 'a,
        V: 'a,
    {
        entries
            .into_iter()
            .filter(|(_, v)| extract(v).is_expired(max_inactivity))
            .map(|(k, _)| k.clone())
            .collect()
    }
}
