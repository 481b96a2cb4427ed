//! Signon Test - Shared test fixtures and mocks for the signond workspace.
//!
//! This crate exists so `signon-identity`, `signon-session` and
//! `signon-daemon` stop each rolling their own copy of the same test
//! doubles (`NullUi`, a scripted plugin, an in-memory `CredentialsDB`
//! seed). Add it as a dev-dependency and pull from [`fixtures`] and
//! [`mocks`].
//!
//! ```toml
//! [dev-dependencies]
//! signon-test.workspace = true
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
