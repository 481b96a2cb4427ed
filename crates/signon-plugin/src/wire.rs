//! The length-framed request/response protocol spoken with a plugin child
//! process over its stdin/stdout.
//!
//! The original signond plugin protocol ([`PluginOperation`]/
//! [`PluginResponse`] in `signonplugin.h`) serialises a `QDataStream` of
//! opcodes and `QVariantMap`s directly onto the pipe with no explicit
//! framing (`QDataStream` tracks its own cursor). Rust has no equivalent
//! wire-compatible serde for `QVariant`, so this keeps the same opcode
//! *values* and message shapes but frames each message as a
//! `u32` big-endian byte length followed by a JSON body — readable with
//! plain `tokio::io::AsyncRead`/`AsyncWrite` and no partial-message
//! ambiguity.

use serde::{Deserialize, Serialize};
use signon_core::ids::{MechanismName, MethodName};
use signon_core::PropertyMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{PluginError, PluginResult};

/// Maximum accepted frame size. A plugin sending more than this is
/// considered to have violated the protocol rather than made us buffer
/// unbounded attacker-controlled memory.
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// The plugin-reported error code meaning "I honoured your `CANCEL`"
/// (spec.md §4.4: "the in-flight flag is cleared only when the child
/// acknowledges (via `ERROR(canceled)` or `RESULT`)"). Plugins agree on
/// this value the same way they agree on the opcode/tag set itself.
pub const CANCELED_ERROR_CODE: u32 = 1;

/// A request sent from the daemon to a plugin child. Variant order
/// mirrors the original `PLUGIN_OP_*` opcode values (spec.md §4.4
/// grounding in `original_source/lib/plugins/SignOn/signonplugin.h`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum PluginRequest {
    /// `PLUGIN_OP_TYPE` — ask the plugin for its method name.
    Type,
    /// `PLUGIN_OP_MECHANISMS` — ask the plugin for its supported mechanisms.
    Mechanisms,
    /// `PLUGIN_OP_PROCESS` — run an authentication step.
    Process {
        /// The cancel-key of the session operation this belongs to.
        cancel_key: String,
        /// Input parameters (with `Secret` stripped when the UI policy is
        /// `RequestPasswordPolicy`, matching the original's `inDataTmp`).
        params: PropertyMap,
        /// The selected mechanism.
        mechanism: MechanismName,
    },
    /// `PLUGIN_OP_PROCESS_UI` — resume after a UI dialog reply.
    ProcessUi {
        /// The cancel-key of the session operation this belongs to.
        cancel_key: String,
        /// The UI's reply parameters.
        params: PropertyMap,
    },
    /// `PLUGIN_OP_REFRESH` — resume after a refresh-dialog reply.
    Refresh {
        /// The cancel-key of the session operation this belongs to.
        cancel_key: String,
        /// The UI's reply parameters.
        params: PropertyMap,
    },
    /// `PLUGIN_OP_CANCEL` — cancel the in-flight operation.
    Cancel,
    /// `PLUGIN_OP_STOP` — ask the plugin to shut down cleanly.
    Stop,
}

/// A response sent from a plugin child to the daemon. Variant order
/// mirrors `PLUGIN_RESPONSE_*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tag")]
pub enum PluginResponse {
    /// `PLUGIN_RESPONSE_RESULT` — the operation completed successfully.
    Result(PropertyMap),
    /// `PLUGIN_RESPONSE_ERROR` — the operation failed.
    Error {
        /// Plugin-defined error code.
        code: u32,
        /// Human-readable message.
        message: String,
    },
    /// `PLUGIN_RESPONSE_SIGNAL` — a `stateChanged` progress notice. Not a
    /// terminal reply: the proxy's read loop consumes it and keeps
    /// waiting for the operation's actual outcome.
    Status {
        /// Plugin-defined state ordinal.
        state: u32,
        /// Human-readable progress message.
        message: String,
    },
    /// `PLUGIN_RESPONSE_UI` — the plugin wants a UI dialog shown.
    Ui(PropertyMap),
    /// `PLUGIN_RESPONSE_REFRESHED` — the plugin wants a refresh dialog shown.
    Refreshed(PropertyMap),
    /// `PLUGIN_RESPONSE_STORE` — persist `params` against the current
    /// `(identity, method)`. A side-effect notice, not a terminal reply,
    /// same treatment as `Status`.
    Store(PropertyMap),
    /// Reply to [`PluginRequest::Type`].
    TypeReply(String),
    /// Reply to [`PluginRequest::Mechanisms`].
    MechanismsReply(Vec<String>),
}

/// Write one framed message to `writer`.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> PluginResult<()>
where
    W: tokio::io::AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message).map_err(|e| PluginError::Protocol(e.to_string()))?;
    let len = u32::try_from(body.len()).map_err(|_| PluginError::Protocol("frame too large".into()))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message from `reader`.
pub async fn read_frame<R, T>(reader: &mut R) -> PluginResult<T>
where
    R: tokio::io::AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_BYTES {
        return Err(PluginError::Protocol(format!("frame of {len} bytes exceeds limit")));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    serde_json::from_slice(&body).map_err(|e| PluginError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_process_request() {
        let mut buf = Vec::new();
        let request = PluginRequest::Process {
            cancel_key: "abc".into(),
            params: PropertyMap::new().with("UserName", "alice"),
            mechanism: MechanismName::from("PLAIN"),
        };
        write_frame(&mut buf, &request).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded: PluginRequest = read_frame(&mut cursor).await.unwrap();
        match decoded {
            PluginRequest::Process { cancel_key, mechanism, .. } => {
                assert_eq!(cancel_key, "abc");
                assert_eq!(mechanism, MechanismName::from("PLAIN"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_oversized_frame_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame::<_, PluginResponse>(&mut cursor).await.unwrap_err();
        assert!(matches!(err, PluginError::Protocol(_)));
    }
}
