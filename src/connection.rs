// ABOUTME: Owns the stream to the native engine and drives its whole lifecycle
// ABOUTME: Bootstrap handshake, reader dispatch, single-writer flushing and cascade teardown

use crate::bridge::{EngineBridge, Value};
use crate::client::error::{ClientError, ClientResult};
use crate::client::types::BatchOptions;
use crate::frame::{self, FrameError};
use crate::messages::{
    Batch, BatchEntry, ClusterScan, CommandRequest, ConnectionRequest, RequestError, RequestKind,
    RequestType, Response, ResponsePayload, Route, ScriptInvocation,
};
use crate::pipeline::{self, WritePipeline};
use crate::registry::CallbackRegistry;
use bytes::{Buf, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::Cursor;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Notify, oneshot};
use thiserror::Error;

/// Reason attached to waiters when `close` is called without one.
pub const DEFAULT_CLOSE_REASON: &str = "connection closed";

/// Lifecycle of one connection. Transitions out of `Ready` are one-way.
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    /// Bootstrap handshake in progress.
    Connecting = 0,
    Ready = 1,
    /// Teardown observed; waiters are being rejected.
    Closing = 2,
    /// Socket released and every pending slot rejected.
    Closed = 3,
}

/// Failures while establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("transport bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("socket unavailable: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake timed out")]
    Timeout,

    #[error("handshake rejected: {0}")]
    Rejected(String),

    #[error("handshake protocol error: {0}")]
    Protocol(String),
}

/// A ready connection to the native engine.
///
/// Cloning is cheap and every clone drives the same underlying socket.
/// Requests are delivered to the peer in submission order; responses are
/// correlated purely through callback indices and may complete in any order.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.inner.state.load(Ordering::Relaxed))
            .finish()
    }
}

struct ConnectionInner {
    state: AtomicU8,
    registry: Mutex<CallbackRegistry>,
    pipeline: Mutex<WritePipeline>,
    wake_writer: Notify,
    shutdown: Notify,
    bridge: Arc<dyn EngineBridge>,
    close_reason: Mutex<Option<String>>,
    live_tasks: AtomicUsize,
}

impl Connection {
    /// Connect to the engine's stream endpoint, run the bootstrap handshake
    /// and spawn the driver tasks.
    pub(crate) async fn establish(
        request: &ConnectionRequest,
        timeout: Duration,
        bridge: Arc<dyn EngineBridge>,
    ) -> Result<Connection, ConnectError> {
        let path = bridge
            .start_transport()
            .map_err(|e| ConnectError::Bootstrap(e.to_string()))?;

        let mut buffer = BytesMut::with_capacity(4 * 1024);
        let handshake = async {
            let mut stream = UnixStream::connect(&path).await?;

            let mut framed = BytesMut::new();
            frame::encode(request, &mut framed)
                .map_err(|e| ConnectError::Protocol(e.to_string()))?;
            stream.write_all(&framed).await?;

            let response = read_handshake_response(&mut stream, &mut buffer).await?;
            match response.payload {
                None | Some(ResponsePayload::Ok) => Ok(stream),
                Some(ResponsePayload::RespPointer(pointer)) => {
                    // The handle must still be consumed or the native
                    // allocation leaks.
                    let _ = bridge.materialize(pointer);
                    Ok(stream)
                }
                Some(ResponsePayload::RequestError(error)) => {
                    Err(ConnectError::Rejected(error.to_string()))
                }
                Some(ResponsePayload::ClosingError(message)) => {
                    Err(ConnectError::Rejected(message))
                }
            }
        };
        let stream = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| ConnectError::Timeout)??;

        let inner = Arc::new(ConnectionInner {
            state: AtomicU8::new(ConnState::Ready.into()),
            registry: Mutex::new(CallbackRegistry::new()),
            pipeline: Mutex::new(WritePipeline::new()),
            wake_writer: Notify::new(),
            shutdown: Notify::new(),
            bridge,
            close_reason: Mutex::new(None),
            live_tasks: AtomicUsize::new(2),
        });

        let (read_half, write_half) = stream.into_split();
        tokio::spawn(read_loop(inner.clone(), read_half, buffer));
        tokio::spawn(write_loop(inner.clone(), write_half));

        Ok(Connection { inner })
    }

    /// Send one command and await its response.
    ///
    /// There is no per-request cancellation: a caller-level timeout that
    /// abandons this future leaves the callback slot allocated until the
    /// native side responds or the connection closes.
    pub async fn submit(
        &self,
        request_type: RequestType,
        args: Vec<Bytes>,
        route: Option<Route>,
    ) -> ClientResult<Value> {
        let args = pipeline::encode_args(args, self.inner.bridge.as_ref());
        self.submit_kind(RequestKind::Command { request_type, args }, route)
            .await
    }

    /// Send a pipeline or transaction. An atomic batch aborted by a
    /// conflicting `WATCH` resolves to `None`.
    pub async fn submit_batch(
        &self,
        commands: Vec<(RequestType, Vec<Bytes>)>,
        atomic: bool,
        options: BatchOptions,
    ) -> ClientResult<Option<Vec<Value>>> {
        let entries = commands
            .into_iter()
            .map(|(request_type, args)| BatchEntry {
                request_type,
                args: pipeline::encode_args(args, self.inner.bridge.as_ref()),
            })
            .collect();
        let batch = Batch {
            entries,
            is_atomic: atomic,
            raise_on_error: options.raise_on_error,
            timeout_ms: options.timeout.map(|d| d.as_millis() as u32),
        };
        match self.submit_kind(RequestKind::Batch(batch), None).await? {
            Value::Nil => Ok(None),
            Value::Array(values) => Ok(Some(values)),
            other => Ok(Some(vec![other])),
        }
    }

    /// Advance a cluster-wide scan by one step.
    pub async fn submit_cluster_scan(&self, scan: ClusterScan) -> ClientResult<Value> {
        self.submit_kind(RequestKind::ClusterScan(scan), None).await
    }

    /// Invoke a server-side script by hash.
    pub async fn submit_script(
        &self,
        script: ScriptInvocation,
        route: Option<Route>,
    ) -> ClientResult<Value> {
        self.submit_kind(RequestKind::Script(script), route).await
    }

    /// Tear the connection down, rejecting every outstanding future with
    /// `reason` (or a default). Idempotent; later calls are no-ops.
    pub fn close(&self, reason: Option<String>) {
        self.inner
            .teardown(reason.unwrap_or_else(|| DEFAULT_CLOSE_REASON.to_string()));
    }

    pub fn state(&self) -> ConnState {
        self.inner.state()
    }

    async fn submit_kind(&self, kind: RequestKind, route: Option<Route>) -> ClientResult<Value> {
        if self.inner.state() != ConnState::Ready {
            return Err(ClientError::Closing(self.inner.close_reason()));
        }

        let (sender, receiver) = oneshot::channel();
        let callback_idx = self.inner.registry.lock().expect("registry poisoned").insert(sender) as u32;
        let request = CommandRequest {
            callback_idx,
            kind,
            route,
        };

        let staged = self
            .inner
            .pipeline
            .lock()
            .expect("pipeline poisoned")
            .stage(&request);
        if let Err(e) = staged {
            let _ = self
                .inner
                .registry
                .lock()
                .expect("registry poisoned")
                .take(callback_idx as usize);
            return Err(ClientError::Request(RequestError::internal(format!(
                "failed to encode request: {e}"
            ))));
        }
        self.inner.wake_writer.notify_one();

        // A teardown may have drained the registry between the state check
        // and the insert; the slot must not outlive it.
        if self.inner.state() != ConnState::Ready
            && self
                .inner
                .registry
                .lock()
                .expect("registry poisoned")
                .take(callback_idx as usize)
                .is_some()
        {
            return Err(ClientError::Closing(self.inner.close_reason()));
        }

        // A wire-delivered error of any kind is per-request: the connection
        // stays usable. Teardown never sends on the channel; it drops the
        // sender, and the closed channel carries the cascade-reject.
        match receiver.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(ClientError::Request(error)),
            Err(_) => Err(ClientError::Closing(self.inner.close_reason())),
        }
    }
}

impl ConnectionInner {
    fn state(&self) -> ConnState {
        ConnState::try_from(self.state.load(Ordering::Acquire)).unwrap_or(ConnState::Closed)
    }

    fn close_reason(&self) -> String {
        self.close_reason
            .lock()
            .expect("close reason poisoned")
            .clone()
            .unwrap_or_else(|| DEFAULT_CLOSE_REASON.to_string())
    }

    /// First caller wins; everyone else observes `Closing`/`Closed`.
    fn teardown(&self, reason: String) {
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current >= ConnState::Closing as u8 {
                return;
            }
            if self
                .state
                .compare_exchange(
                    current,
                    ConnState::Closing as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                break;
            }
        }

        tracing::warn!(%reason, "tearing down connection");
        *self.close_reason.lock().expect("close reason poisoned") = Some(reason);

        // Dropping the senders closes every waiter's channel; each submit
        // maps the closure to the stored closing reason. The reason is
        // stored first so no awakened waiter can miss it.
        drop(self.registry.lock().expect("registry poisoned").drain());

        self.shutdown.notify_waiters();
        self.wake_writer.notify_one();
    }

    fn task_finished(&self) {
        if self.live_tasks.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state
                .store(ConnState::Closed.into(), Ordering::Release);
        }
    }

    /// Fulfil the waiter a response belongs to. Returns the teardown reason
    /// when the response is fatal for the connection.
    fn dispatch(&self, response: Response) -> Result<(), String> {
        let index = response.callback_idx as usize;
        match response.payload {
            Some(ResponsePayload::ClosingError(reason)) => Err(reason),
            payload => {
                let Some(sender) = self
                    .registry
                    .lock()
                    .expect("registry poisoned")
                    .take(index)
                else {
                    return Err(format!("response for non-live callback index {index}"));
                };
                let outcome = match payload {
                    Some(ResponsePayload::RespPointer(pointer)) => self
                        .bridge
                        .materialize(pointer)
                        .map_err(|e| RequestError::internal(e.to_string())),
                    Some(ResponsePayload::Ok) => Ok(Value::Okay),
                    Some(ResponsePayload::RequestError(error)) => Err(error),
                    // Closing errors were diverted above; no payload at all
                    // is the null value.
                    _ => Ok(Value::Nil),
                };
                let _ = sender.send(outcome);
                Ok(())
            }
        }
    }
}

async fn read_handshake_response(
    stream: &mut UnixStream,
    buffer: &mut BytesMut,
) -> Result<Response, ConnectError> {
    loop {
        {
            let mut cursor = Cursor::new(&buffer[..]);
            match frame::check(&mut cursor) {
                Ok(frame_len) => {
                    cursor.set_position(0);
                    let response = frame::parse::<Response>(&mut cursor)
                        .map_err(|e| ConnectError::Protocol(e.to_string()))?;
                    buffer.advance(frame_len);
                    return Ok(response);
                }
                Err(FrameError::Incomplete) => {}
                Err(e) => return Err(ConnectError::Protocol(e.to_string())),
            }
        }
        if stream.read_buf(buffer).await? == 0 {
            return Err(ConnectError::Protocol(
                "connection closed during handshake".to_string(),
            ));
        }
    }
}

/// Reader task: append chunks, parse complete frames off the front and
/// dispatch them. Whatever tail is left in the buffer after a pass is the
/// carry-over for the next chunk.
async fn read_loop(inner: Arc<ConnectionInner>, mut read_half: OwnedReadHalf, mut buffer: BytesMut) {
    // The handshake may have left complete frames behind it.
    if let Err(reason) = drain_frames(&inner, &mut buffer) {
        inner.teardown(reason);
    }
    loop {
        let shutdown = inner.shutdown.notified();
        if inner.state() != ConnState::Ready {
            break;
        }
        tokio::select! {
            _ = shutdown => break,
            result = read_half.read_buf(&mut buffer) => match result {
                Ok(0) => {
                    let reason = if buffer.is_empty() {
                        "connection closed by peer".to_string()
                    } else {
                        "connection reset by peer mid-frame".to_string()
                    };
                    inner.teardown(reason);
                    break;
                }
                Ok(_) => {
                    if let Err(reason) = drain_frames(&inner, &mut buffer) {
                        inner.teardown(reason);
                        break;
                    }
                }
                Err(e) => {
                    inner.teardown(format!("socket read failed: {e}"));
                    break;
                }
            }
        }
    }
    drop(read_half);
    inner.task_finished();
}

fn drain_frames(inner: &ConnectionInner, buffer: &mut BytesMut) -> Result<(), String> {
    loop {
        let (frame_len, response) = {
            let mut cursor = Cursor::new(&buffer[..]);
            match frame::check(&mut cursor) {
                Ok(frame_len) => {
                    cursor.set_position(0);
                    let response = frame::parse::<Response>(&mut cursor)
                        .map_err(|e| e.to_string())?;
                    (frame_len, response)
                }
                Err(FrameError::Incomplete) => return Ok(()),
                Err(e) => return Err(e.to_string()),
            }
        };
        buffer.advance(frame_len);
        inner.dispatch(response)?;
    }
}

/// Writer task: at most one socket write in flight. Each pass takes the
/// staged buffer wholesale; frames staged during the write are picked up by
/// the next pass.
async fn write_loop(inner: Arc<ConnectionInner>, mut write_half: OwnedWriteHalf) {
    'outer: loop {
        let wakeup = inner.wake_writer.notified();
        loop {
            let batch = {
                let mut pipeline = inner.pipeline.lock().expect("pipeline poisoned");
                pipeline.begin_flush()
            };
            let Some(batch) = batch else { break };
            let result = write_half.write_all(&batch).await;
            inner
                .pipeline
                .lock()
                .expect("pipeline poisoned")
                .end_flush();
            if let Err(e) = result {
                inner.teardown(format!("socket write failed: {e}"));
                break 'outer;
            }
        }
        if inner.state() != ConnState::Ready {
            break;
        }
        wakeup.await;
    }
    let _ = write_half.shutdown().await;
    inner.task_finished();
}
