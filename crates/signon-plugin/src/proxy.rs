//! [`PluginProxy`] — spawns, drives, and cancels one out-of-process
//! authentication plugin (spec.md §4.4, C4).

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use signon_core::ids::{MechanismName, MethodName};
use signon_core::PropertyMap;
use tokio::io::{AsyncRead, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{PluginError, PluginResult};
use crate::sink::PluginSideEffectSink;
use crate::wire::{read_frame, write_frame, PluginRequest, PluginResponse};

/// Default handshake timeout (spec.md §5: "fixed `start_timeout` (default
/// 5000ms)"), matching the original's `PLUGINPROCESS_TIMEOUT`.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_millis(5000);

/// The unprivileged user plugin children are spawned as, mirroring
/// `PluginProcess::setupChildProcess`'s `setgid`/`setuid` to `"signon"`.
pub const PLUGIN_USER: &str = "signon";

/// How many unclaimed terminal replies the reader task will buffer before
/// it starts dropping new ones. Since at most one `process*` call is ever
/// in flight per proxy, a capacity of 1 is what turns a protocol violation
/// (a second `RESULT`/`ERROR` for an operation already settled) into a
/// `try_send` failure the reader task logs and discards, rather than
/// silently handing a stale reply to the next unrelated call.
const REPLY_CHANNEL_CAPACITY: usize = 1;

struct ChildHandle {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    reader_task: tokio::task::JoinHandle<()>,
    replies: mpsc::Receiver<PluginResult<PluginResponse>>,
}

/// Exclusively owns one plugin child process and speaks the framed wire
/// protocol in [`crate::wire`] with it.
///
/// Per spec.md §5 ("one pending op per `PluginProxy`"), all operations
/// are serialised through an internal `tokio::sync::Mutex` rather than
/// requiring `&mut self` — this lets a proxy be shared behind an `Arc`
/// with `SessionCore` while still only ever having one in-flight
/// exchange with the child. A background task owns the child's stdout and
/// continuously classifies frames: `STATUS`/`STORE` are routed to the
/// injected [`PluginSideEffectSink`] as soon as they arrive (the original
/// proxy's stream-of-tagged-messages parsing, spec.md §4.4), while
/// terminal frames are handed to whichever call is currently waiting.
pub struct PluginProxy {
    method: MethodName,
    binary_path: PathBuf,
    start_timeout: Duration,
    mechanisms: Vec<MechanismName>,
    sink: Arc<dyn PluginSideEffectSink>,
    handle: Mutex<Option<ChildHandle>>,
    is_processing: AtomicBool,
    restarted: AtomicBool,
}

impl PluginProxy {
    /// Spawn a new plugin process for `method`, perform the handshake,
    /// and query its type and supported mechanisms. `sink` receives every
    /// `STATUS`/`STORE` notice the plugin emits for the lifetime of the
    /// process (across restarts).
    pub async fn spawn(
        method: MethodName,
        binary_path: PathBuf,
        start_timeout: Duration,
        sink: Arc<dyn PluginSideEffectSink>,
    ) -> PluginResult<Self> {
        let handle = spawn_child(&method, &binary_path, start_timeout, Arc::clone(&sink)).await?;

        let mut proxy = Self {
            method,
            binary_path,
            start_timeout,
            mechanisms: Vec::new(),
            sink,
            handle: Mutex::new(Some(handle)),
            is_processing: AtomicBool::new(false),
            restarted: AtomicBool::new(false),
        };

        let reported_type = proxy.query_type().await?;
        if reported_type != proxy.method.0 {
            debug!(expected = %proxy.method.0, reported = %reported_type, "plugin reported a different method name");
        }
        proxy.mechanisms = proxy.query_mechanisms().await?;
        info!(method = %proxy.method.0, mechanisms = ?proxy.mechanisms, "plugin process started");
        Ok(proxy)
    }

    /// The method name this proxy was spawned for.
    #[must_use]
    pub fn method(&self) -> &MethodName {
        &self.method
    }

    /// Mechanisms the plugin reported supporting (cached from startup).
    #[must_use]
    pub fn mechanisms(&self) -> &[MechanismName] {
        &self.mechanisms
    }

    /// Whether an operation is currently in flight.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }

    async fn query_type(&self) -> PluginResult<String> {
        let reply = self.exchange_internal(PluginRequest::Type).await?;
        match reply {
            PluginResponse::TypeReply(name) => Ok(name),
            other => Err(PluginError::Protocol(format!("expected TypeReply, got {other:?}"))),
        }
    }

    async fn query_mechanisms(&self) -> PluginResult<Vec<MechanismName>> {
        let reply = self.exchange_internal(PluginRequest::Mechanisms).await?;
        match reply {
            PluginResponse::MechanismsReply(names) => Ok(names.into_iter().map(MechanismName::from).collect()),
            other => Err(PluginError::Protocol(format!("expected MechanismsReply, got {other:?}"))),
        }
    }

    /// Start an authentication step (`PLUGIN_OP_PROCESS`). Restarts the
    /// child once, transparently, if it had previously exited.
    pub async fn process(
        &self,
        cancel_key: String,
        params: PropertyMap,
        mechanism: MechanismName,
    ) -> PluginResult<PluginResponse> {
        self.restart_if_required().await?;
        self.is_processing.store(true, Ordering::SeqCst);
        let result = self
            .exchange(PluginRequest::Process { cancel_key, params, mechanism })
            .await;
        if result.is_ok() {
            self.is_processing.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Resume after a UI dialog reply (`PLUGIN_OP_PROCESS_UI`).
    pub async fn process_ui(&self, cancel_key: String, params: PropertyMap) -> PluginResult<PluginResponse> {
        self.restart_if_required().await?;
        self.exchange(PluginRequest::ProcessUi { cancel_key, params }).await
    }

    /// Resume after a refresh dialog reply (`PLUGIN_OP_REFRESH`).
    pub async fn process_refresh(&self, cancel_key: String, params: PropertyMap) -> PluginResult<PluginResponse> {
        self.restart_if_required().await?;
        self.exchange(PluginRequest::Refresh { cancel_key, params }).await
    }

    /// Ask the plugin to cancel its in-flight operation
    /// (`PLUGIN_OP_CANCEL`). Fire-and-forget: the cancellation outcome
    /// arrives as a later `Error`/`Result` frame, matching spec.md §5's
    /// cancellation race semantics.
    pub async fn cancel(&self) -> PluginResult<()> {
        let mut guard = self.handle.lock().await;
        let Some(handle) = guard.as_mut() else {
            return Ok(());
        };
        write_frame(&mut handle.stdin, &PluginRequest::Cancel).await
    }

    /// Ask the plugin to shut down cleanly (`PLUGIN_OP_STOP`), then wait
    /// for it to exit.
    pub async fn stop(&self) -> PluginResult<()> {
        let mut guard = self.handle.lock().await;
        if let Some(mut handle) = guard.take() {
            let _ = write_frame(&mut handle.stdin, &PluginRequest::Stop).await;
            let _ = timeout(self.start_timeout, handle.child.wait()).await;
            handle.reader_task.abort();
        }
        Ok(())
    }

    async fn restart_if_required(&self) -> PluginResult<()> {
        let needs_restart = {
            let guard = self.handle.lock().await;
            guard.is_none()
        };
        if !needs_restart {
            return Ok(());
        }
        if self.restarted.swap(true, Ordering::SeqCst) {
            return Err(PluginError::CrashedTwice(self.method.0.clone()));
        }
        warn!(method = %self.method.0, "plugin process exited, restarting once");
        let handle = spawn_child(&self.method, &self.binary_path, self.start_timeout, Arc::clone(&self.sink)).await?;
        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    async fn exchange(&self, request: PluginRequest) -> PluginResult<PluginResponse> {
        let result = self.exchange_internal(request).await;
        if let Err(PluginError::Io(_)) = &result {
            // Treat an I/O failure as the child having gone away so the
            // next call attempts a restart instead of reusing a dead pipe.
            *self.handle.lock().await = None;
        }
        result
    }

    async fn exchange_internal(&self, request: PluginRequest) -> PluginResult<PluginResponse> {
        let mut guard = self.handle.lock().await;
        let handle = guard.as_mut().ok_or_else(|| PluginError::CrashedTwice(self.method.0.clone()))?;
        write_frame(&mut handle.stdin, &request).await?;
        let reply = timeout(self.start_timeout, handle.replies.recv())
            .await
            .map_err(|_| PluginError::Timeout(self.start_timeout))?
            .ok_or_else(|| PluginError::Protocol("plugin reader task ended unexpectedly".into()))?;
        reply
    }
}

impl Drop for PluginProxy {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.handle.try_lock() {
            if let Some(handle) = guard.as_mut() {
                let _ = handle.child.start_kill();
                handle.reader_task.abort();
            }
        }
    }
}

async fn spawn_child(
    method: &MethodName,
    binary_path: &PathBuf,
    start_timeout: Duration,
    sink: Arc<dyn PluginSideEffectSink>,
) -> PluginResult<ChildHandle> {
    let mut command = Command::new(binary_path);
    command
        .arg(&method.0)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    apply_privilege_drop(&mut command, method)?;

    let mut child = command.spawn().map_err(|source| PluginError::Spawn {
        method: method.0.clone(),
        source,
    })?;

    let stdin = BufWriter::new(child.stdin.take().expect("piped stdin"));
    let mut stdout = BufReader::new(child.stdout.take().expect("piped stdout"));

    // Handshake: wait for the child's first frame (its readiness ack)
    // before issuing real requests, mirroring `readOnReady` in the
    // original proxy.
    let _ack: PluginResponse = timeout(start_timeout, read_frame(&mut stdout))
        .await
        .map_err(|_| PluginError::Timeout(start_timeout))??;

    let (tx, rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
    let method_name = method.0.clone();
    let reader_task = tokio::spawn(run_reader(stdout, tx, sink, method_name));

    Ok(ChildHandle { child, stdin, reader_task, replies: rx })
}

/// Continuously parse frames from the child's stdout. `STATUS`/`STORE`
/// never reach a waiting caller directly — they're side-effect notices
/// dispatched through `sink` as soon as they're read, matching the
/// original's "multiple tagged messages may arrive per read" parsing
/// (spec.md §4.4). Everything else is a terminal reply for whichever call
/// is currently waiting; a second terminal frame arriving before the
/// first has been claimed is the "late/duplicate RESULT" protocol
/// violation spec.md §4.4 calls for discarding with a warning, which a
/// bounded channel's `try_send` gives us for free.
async fn run_reader<R>(
    mut stdout: R,
    tx: mpsc::Sender<PluginResult<PluginResponse>>,
    sink: Arc<dyn PluginSideEffectSink>,
    method: String,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = read_frame::<_, PluginResponse>(&mut stdout).await;
        match frame {
            Ok(PluginResponse::Status { state, message }) => {
                sink.on_status(state, message).await;
            }
            Ok(PluginResponse::Store(params)) => {
                sink.on_store(params).await;
            }
            Ok(terminal) => {
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(Ok(terminal)) {
                    warn!(method = %method, "discarding unclaimed terminal reply: a caller already got one for this operation");
                } else if tx.is_closed() {
                    break;
                }
            }
            Err(err) => {
                let _ = tx.try_send(Err(err));
                break;
            }
        }
    }
}

#[cfg(unix)]
fn apply_privilege_drop(command: &mut Command, method: &MethodName) -> PluginResult<()> {
    use std::os::unix::process::CommandExt;

    match nix::unistd::User::from_name(PLUGIN_USER) {
        Ok(Some(user)) => {
            command.uid(user.uid.as_raw());
            command.gid(user.gid.as_raw());
            Ok(())
        }
        Ok(None) => {
            warn!(user = PLUGIN_USER, "no such user; running plugin without privilege drop");
            Ok(())
        }
        Err(source) => Err(PluginError::Spawn {
            method: method.0.clone(),
            source: std::io::Error::from(source),
        }),
    }
}

#[cfg(not(unix))]
fn apply_privilege_drop(_command: &mut Command, _method: &MethodName) -> PluginResult<()> {
    Ok(())
}
