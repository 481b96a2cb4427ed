//! Out-of-process authentication plugin management (spec.md §4.4, C4).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod discover;
pub mod driver;
pub mod error;
pub mod proxy;
pub mod sink;
pub mod wire;

pub use discover::{discover_methods, plugin_binary_path};
pub use driver::PluginDriver;
pub use error::{PluginError, PluginResult};
pub use proxy::{PluginProxy, DEFAULT_START_TIMEOUT, PLUGIN_USER};
pub use sink::{NullSink, PluginSideEffectSink};
pub use wire::{PluginRequest, PluginResponse, CANCELED_ERROR_CODE};
