use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_protocol::{
    codec::DecodeEvent, encode, validate, ErrorCode, FinishReason, FrameDecoder, GateStatus,
    Message, RequestId, ServerInfoPayload,
};
use bridge_provider::{InferenceProvider, Sink};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::gate::Gate;
use crate::orchestrator::RelayStatus;

/// Peer session's identity within a relay's registry (spec §4.5, §4.8).
pub type SessionId = u64;

const INFO_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
const READ_CHUNK_SIZE: usize = 4096;

/// Drives one peer's state machine on the Host: `AwaitingInfoFlush → Idle →
/// Generating(request_id) → Idle → ... → Closed` (spec §4.5).
///
/// Consumes the socket directly rather than returning a handle — the
/// orchestrator spawns this as a task and learns of its completion through
/// the task's join, not through a returned session object (spec §9's
/// "cyclic references" note: the session never owns a strong back-reference
/// to the relay).
pub async fn run_peer_session<S>(
    id: SessionId,
    socket: S,
    gate: Arc<Gate>,
    provider: Arc<dyn InferenceProvider>,
    host_name: String,
    model: String,
    status_tx: broadcast::Sender<RelayStatus>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut read_half, mut write_half) = tokio::io::split(socket);

    let info = Message::ServerInfo {
        request_id: None,
        payload: ServerInfoPayload {
            host_name,
            model: model.clone(),
            status: if gate.is_busy() {
                GateStatus::Busy
            } else {
                GateStatus::Ready
            },
        },
    };
    let info_bytes = encode(&info);
    match tokio::time::timeout(INFO_FLUSH_TIMEOUT, write_half.write_all(&info_bytes)).await {
        Ok(Ok(())) => {}
        _ => {
            warn!(session_id = id, "server_info flush timed out, destroying socket");
            return;
        }
    }

    let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = write_rx.recv().await {
            let bytes = encode(&msg);
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let active_request: Arc<Mutex<Option<RequestId>>> = Arc::new(Mutex::new(None));
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(session_id = id, error = %e, "socket read error");
                break;
            }
        };

        for event in decoder.write(&buf[..n]) {
            match event {
                DecodeEvent::BufferOverflow => {
                    warn!(session_id = id, "inbound reassembly buffer overflowed, discarded");
                }
                DecodeEvent::Frame(value) => match validate::validate(value) {
                    Ok(msg) => {
                        dispatch(
                            msg,
                            &gate,
                            &provider,
                            &model,
                            &active_request,
                            &write_tx,
                            &status_tx,
                        )
                        .await;
                    }
                    Err(e) => {
                        let _ = write_tx.send(e.to_bad_message());
                    }
                },
            }
        }
    }

    // Disconnect handling (spec §4.5): abort any in-flight generation
    // best-effort, release the gate, clear state. No frames are written —
    // the socket is already gone.
    let stale = active_request.lock().take();
    if let Some(request_id) = stale {
        provider.abort(&request_id).await;
        gate.release(&request_id);
        let _ = status_tx.send(RelayStatus::GateReleased);
    }

    drop(write_tx);
    let _ = writer.await;
}

async fn dispatch(
    msg: Message,
    gate: &Arc<Gate>,
    provider: &Arc<dyn InferenceProvider>,
    model: &str,
    active_request: &Arc<Mutex<Option<RequestId>>>,
    write_tx: &mpsc::UnboundedSender<Message>,
    status_tx: &broadcast::Sender<RelayStatus>,
) {
    match msg {
        Message::ChatStart { request_id, payload } => {
            if !gate.acquire(request_id.clone()) {
                let _ = write_tx.send(Message::error(
                    Some(request_id),
                    ErrorCode::ModelBusy,
                    "the host is already generating a response",
                ));
                return;
            }
            *active_request.lock() = Some(request_id.clone());
            let _ = status_tx.send(RelayStatus::GateAcquired {
                request_id: request_id.clone(),
            });

            let sink = SessionSink {
                request_id: request_id.clone(),
                write_tx: write_tx.clone(),
                gate: gate.clone(),
                active_request: active_request.clone(),
                status_tx: status_tx.clone(),
            };
            let provider = provider.clone();
            let model = model.to_owned();
            tokio::spawn(async move {
                let mut sink = sink;
                provider
                    .generate(request_id, model, payload.prompt, &mut sink)
                    .await;
            });
        }
        Message::Abort { request_id } => {
            let is_active = active_request.lock().as_deref() == Some(request_id.as_str());
            if !is_active {
                // Stale abort (already terminated, or never started on this
                // session): silently ignored (spec §9 open question 1).
                return;
            }
            if provider.abort(&request_id).await {
                let _ = write_tx.send(Message::chat_end(request_id.clone(), FinishReason::Abort));
                gate.release(&request_id);
                *active_request.lock() = None;
                let _ = status_tx.send(RelayStatus::GateReleased);
            }
            // If the provider returns false the generation had already
            // raced to completion; its own terminal callback will release
            // the gate and clear state.
        }
        Message::ServerInfo { .. }
        | Message::ChatChunk { .. }
        | Message::ChatEnd { .. }
        | Message::Error { .. } => {
            // Host-bound frames of these types have no handler: a peer is
            // not a peer of itself (spec §4.5).
        }
    }
}

/// Adapts provider callbacks onto outbound protocol frames and the gate
/// (spec §4.5's `sink` bullet).
struct SessionSink {
    request_id: RequestId,
    write_tx: mpsc::UnboundedSender<Message>,
    gate: Arc<Gate>,
    active_request: Arc<Mutex<Option<RequestId>>>,
    status_tx: broadcast::Sender<RelayStatus>,
}

impl SessionSink {
    fn release(&self) {
        self.gate.release(&self.request_id);
        *self.active_request.lock() = None;
        let _ = self.status_tx.send(RelayStatus::GateReleased);
    }
}

#[async_trait]
impl Sink for SessionSink {
    async fn on_chunk(&mut self, text: String) {
        let _ = self
            .write_tx
            .send(Message::chat_chunk(self.request_id.clone(), text));
    }

    async fn on_end(&mut self) {
        let _ = self
            .write_tx
            .send(Message::chat_end(self.request_id.clone(), FinishReason::Stop));
        self.release();
    }

    async fn on_error(&mut self, code: ErrorCode, message: String) {
        let escalate = code == ErrorCode::OllamaNotFound;
        let _ = self.write_tx.send(Message::error(
            Some(self.request_id.clone()),
            code,
            message.clone(),
        ));
        self.release();
        if escalate {
            let _ = self
                .status_tx
                .send(RelayStatus::ProviderUnreachable { message });
        }
    }
}
