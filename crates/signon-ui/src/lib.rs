//! Async call wrapper to the external sign-on UI dialog process
//! (spec.md §4.9, C9).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;

pub use client::{require_error_code, DialogProcessClient, RequestId, UIClient};
pub use error::{UiError, UiResult};
