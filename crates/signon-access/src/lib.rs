//! Caller-to-application-id resolution and ACL/owner policy.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod gate;

pub use gate::{AccessControlGate, CallerContext, NoopGate, OwnerStatus, StrictGate};
