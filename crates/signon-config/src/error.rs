//! Errors from loading and validating configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a [`crate::types::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file existed but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// The file that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A config file existed but did not parse as TOML.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// The file that failed to parse.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// The merged configuration failed deserialization into [`crate::types::Config`].
    #[error("configuration does not match the expected shape: {0}")]
    Shape(#[from] toml::de::Error),

    /// A validated field was out of range or otherwise nonsensical.
    #[error("invalid configuration field `{field}`: {message}")]
    Validation {
        /// Dotted path of the offending field, e.g. `storage.size_mb`.
        field: String,
        /// Human-readable description of what's wrong.
        message: String,
    },
}

/// Result type for configuration loading/validation.
pub type ConfigResult<T> = Result<T, ConfigError>;
