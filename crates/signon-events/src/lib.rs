//! Per-handle signal delivery shared by the Identity, Session, and
//! Daemon components.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod signal;

pub use bus::{HandleEventBus, HandleEventReceiver};
pub use signal::{InfoUpdatedKind, Signal};
