//! Layered TOML configuration loading for signond (spec.md §6
//! "Environment/config").
//!
//! Four layers are merged, lowest precedence first: the defaults compiled
//! into the binary, `/etc/signond/config.toml`, `~/.config/signond/config.toml`,
//! and finally an explicit path passed on the command line. Any layer may
//! omit keys it doesn't care about overriding.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod loader;
mod merge;
pub mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, load_file};
pub use types::{Config, DaemonConfig, StorageConfig};
