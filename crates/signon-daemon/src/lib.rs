//! Registry, inactivity GC, and control surface for `signond` (spec.md
//! §4.8, C8).
//!
//! The daemon owns the process-wide singletons — the encrypted volume,
//! the credentials database, the access gate, the UI client — and hands
//! out shared handles over them. It holds two registries: saved
//! identities keyed by [`signon_core::ids::IdentityId`], and unsaved
//! identities/sessions keyed by a generated handle-name. Every externally
//! visible operation refreshes the target's `last_used` timestamp; a
//! background sweep removes anything idle past its class timeout.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod daemon;
pub mod error;
pub mod gc;
pub mod sink;
pub mod stats;

pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use gc::spawn_sweep_loop;
pub use stats::Stats;
