//! Errors from driving a plugin child process.

use thiserror::Error;

/// Errors raised by [`crate::proxy::PluginProxy`].
#[derive(Debug, Error)]
pub enum PluginError {
    /// The child process could not be spawned (includes the
    /// privilege-drop-to-`signon`-user failure spec.md §6 maps to daemon
    /// exit code 2, surfaced here as a plain spawn error since
    /// `Command::uid`/`gid` fail before `exec` rather than inside the
    /// child).
    #[error("failed to spawn plugin process for method {method}: {source}")]
    Spawn {
        /// The method the plugin implements.
        method: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// stdin/stdout I/O with an already-running child failed.
    #[error("plugin I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The child did not produce a handshake / response within the
    /// configured timeout.
    #[error("plugin did not respond within {0:?}")]
    Timeout(std::time::Duration),

    /// A frame could not be decoded as a [`crate::wire::PluginResponse`].
    #[error("malformed plugin response: {0}")]
    Protocol(String),

    /// The child exited (crashed or otherwise) while an operation was in
    /// flight, and the single allowed restart already happened once for
    /// this invocation.
    #[error("plugin process for method {0} crashed and the retry budget is exhausted")]
    CrashedTwice(String),

    /// The plugin reported an application-level error (`PLUGIN_RESPONSE_ERROR`
    /// on the wire).
    #[error("plugin error {code}: {message}")]
    PluginReported {
        /// Plugin-defined error code.
        code: u32,
        /// Plugin-defined error message.
        message: String,
    },
}

impl From<PluginError> for signon_core::SignonError {
    fn from(err: PluginError) -> Self {
        use signon_core::ErrorKind;
        let kind = match &err {
            PluginError::Spawn { .. } => ErrorKind::MethodNotAvailable,
            PluginError::Io(_) | PluginError::Protocol(_) => ErrorKind::InternalCommunication,
            PluginError::Timeout(_) => ErrorKind::TimedOut,
            PluginError::CrashedTwice(_) => ErrorKind::InternalServer,
            PluginError::PluginReported { .. } => ErrorKind::OperationFailed,
        };
        signon_core::SignonError::new(kind, err.to_string())
    }
}

/// Result type for plugin-proxy operations.
pub type PluginResult<T> = Result<T, PluginError>;
