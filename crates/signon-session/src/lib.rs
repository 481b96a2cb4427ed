//! Per-`(identity, method)` authentication session scheduling (spec.md
//! §4.5, §4.7; C5 `SessionCore` and C7 `SessionHandle`).
//!
//! One [`SessionCore`] owns exactly one plugin process and serialises
//! every `process` request against it through a FIFO queue; any number of
//! [`SessionHandle`]s may share that core, each receiving its own signal
//! stream.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cancel_key;
pub mod core;
pub mod error;
pub mod handle;
pub mod policy;

pub use cancel_key::CancelKey;
pub use core::SessionCore;
pub use error::{SessionError, SessionResult};
pub use handle::SessionHandle;
pub use policy::UiPolicy;
