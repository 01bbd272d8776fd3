use std::sync::Arc;
use std::time::Duration;

use bridge_protocol::{
    codec::DecodeEvent, encode, validate, ChatStartPayload, ErrorCode, FinishReason, GateStatus,
    Message, RequestId, MAX_PROMPT_BYTES,
};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long the Client waits for a `chat_chunk` on an active request before
/// surfacing a synthetic timeout (spec §4.7). Reset by any inbound chunk
/// for the active request, armed on `send_chat_start`.
const INBOUND_SILENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Local rejection reasons for `send_chat_start` (spec §4.7): checked
/// entirely client-side, before any frame is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("prompt exceeds {MAX_PROMPT_BYTES} UTF-8 bytes (got {0})")]
    PromptTooLarge(usize),
    #[error("a request is already active on this session")]
    AlreadyActive,
}

/// How a request ended, surfaced to the driver's caller (spec §4.7's
/// "surface terminal events").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    Stop,
    Abort,
    Error { code: ErrorCode, message: String },
    /// Synthetic: no `chat_chunk` arrived within the inbound silence
    /// window. The driver does not sever the transport (spec §4.7) — the
    /// caller decides whether to reconnect or just try another prompt.
    Timeout,
}

/// Inbound events the driver surfaces to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    ServerInfo {
        host_name: String,
        model: String,
        status: GateStatus,
    },
    Chunk {
        request_id: RequestId,
        text: String,
    },
    Terminal {
        request_id: RequestId,
        outcome: TerminalOutcome,
    },
}

enum Command {
    Send(Message),
}

/// A handle to a running client driver task (spec §4.7, C7). Cheap to
/// clone and share; the actual socket I/O and timer live in the task
/// spawned by [`spawn`].
#[derive(Clone)]
pub struct ClientHandle {
    active: Arc<Mutex<Option<RequestId>>>,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl ClientHandle {
    /// Validates and submits a prompt (spec §4.7). Rejects locally — no
    /// frame is written — if the trimmed prompt is empty, the UTF-8 byte
    /// length exceeds [`MAX_PROMPT_BYTES`], or a request is already active
    /// on this session.
    pub fn send_chat_start(&self, prompt: impl Into<String>) -> Result<RequestId, ClientError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(ClientError::EmptyPrompt);
        }
        if prompt.len() > MAX_PROMPT_BYTES {
            return Err(ClientError::PromptTooLarge(prompt.len()));
        }

        let mut active = self.active.lock();
        if active.is_some() {
            return Err(ClientError::AlreadyActive);
        }
        let request_id = new_request_id();
        *active = Some(request_id.clone());
        drop(active);

        let _ = self.cmd_tx.send(Command::Send(Message::ChatStart {
            request_id: request_id.clone(),
            payload: ChatStartPayload { prompt },
        }));
        Ok(request_id)
    }

    /// Writes an `abort` frame for the active request (if any) and clears
    /// local active state immediately — the driver does not wait for the
    /// Host's confirmation (spec §4.7). A terminal frame arriving for this
    /// request afterwards is treated as benign (spec §9 open question 1).
    pub fn send_abort(&self) {
        let request_id = self.active.lock().take();
        if let Some(request_id) = request_id {
            let _ = self.cmd_tx.send(Command::Send(Message::Abort { request_id }));
        }
    }

    pub fn active_request_id(&self) -> Option<RequestId> {
        self.active.lock().clone()
    }
}

fn new_request_id() -> RequestId {
    uuid::Uuid::new_v4().to_string()
}

/// Spawns the driver task over `socket` and returns a handle plus the
/// channel of surfaced [`ClientEvent`]s. Mirrors `bridge-core`'s peer
/// session (C5) from the other side: one task owns the socket outright, so
/// reads, writes, and the inbound-silence timer are never interleaved
/// across tasks (spec §5's single-writer-per-socket note applies
/// symmetrically here — there is only one writer because there is only one
/// task).
pub fn spawn<S>(socket: S) -> (ClientHandle, mpsc::UnboundedReceiver<ClientEvent>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut read_half, mut write_half) = tokio::io::split(socket);
    let active = Arc::new(Mutex::new(None));
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ClientEvent>();

    let task_active = active.clone();
    tokio::spawn(async move {
        let mut decoder = bridge_protocol::FrameDecoder::new();
        let mut buf = vec![0u8; 4096];
        let sleep = tokio::time::sleep(Duration::from_secs(u64::MAX / 2));
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                result = read_half.read(&mut buf) => {
                    match result {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            for ev in decoder.write(&buf[..n]) {
                                match ev {
                                    DecodeEvent::BufferOverflow => {
                                        warn!("inbound reassembly buffer overflowed, discarded");
                                    }
                                    DecodeEvent::Frame(value) => {
                                        if let Ok(msg) = validate::validate(value) {
                                            handle_inbound(msg, &task_active, &event_tx, sleep.as_mut());
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        None => break,
                        Some(Command::Send(msg)) => {
                            if matches!(msg, Message::ChatStart { .. }) {
                                sleep.as_mut().reset(Instant::now() + INBOUND_SILENCE_TIMEOUT);
                            }
                            if write_half.write_all(&encode(&msg)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                () = &mut sleep, if task_active.lock().is_some() => {
                    if let Some(request_id) = task_active.lock().take() {
                        let _ = event_tx.send(ClientEvent::Terminal {
                            request_id,
                            outcome: TerminalOutcome::Timeout,
                        });
                    }
                }
            }
        }

        debug!("client driver socket closed");
    });

    (ClientHandle { active, cmd_tx }, event_rx)
}

fn handle_inbound(
    msg: Message,
    active: &Arc<Mutex<Option<RequestId>>>,
    event_tx: &mpsc::UnboundedSender<ClientEvent>,
    mut sleep: std::pin::Pin<&mut tokio::time::Sleep>,
) {
    match msg {
        Message::ServerInfo { payload, .. } => {
            let _ = event_tx.send(ClientEvent::ServerInfo {
                host_name: payload.host_name,
                model: payload.model,
                status: payload.status,
            });
        }
        Message::ChatChunk { request_id, payload } => {
            if active.lock().as_deref() == Some(request_id.as_str()) {
                sleep.as_mut().reset(Instant::now() + INBOUND_SILENCE_TIMEOUT);
                let _ = event_tx.send(ClientEvent::Chunk {
                    request_id,
                    text: payload.text,
                });
            }
        }
        Message::ChatEnd { request_id, payload } => {
            let mut guard = active.lock();
            if guard.as_deref() == Some(request_id.as_str()) {
                guard.take();
                drop(guard);
                let outcome = match payload.finish_reason {
                    FinishReason::Stop => TerminalOutcome::Stop,
                    FinishReason::Abort => TerminalOutcome::Abort,
                    FinishReason::Error => TerminalOutcome::Error {
                        code: ErrorCode::GenerationFailed,
                        message: "generation ended in error".to_owned(),
                    },
                };
                let _ = event_tx.send(ClientEvent::Terminal { request_id, outcome });
            }
            // A terminal arriving for a request that is no longer active
            // (already cleared locally by `send_abort`, or already
            // terminated) is benign and ignored (spec §9 open question 1).
        }
        Message::Error { request_id, payload } => {
            let Some(request_id) = request_id else {
                // A connection-scoped error with no request_id: nothing to
                // clear, but still worth surfacing. There is no request to
                // key it on, so it is dropped here; `apps/bridge-client-cli`
                // surfaces connection-level failures via the transport
                // layer instead.
                return;
            };
            let mut guard = active.lock();
            if guard.as_deref() == Some(request_id.as_str()) {
                guard.take();
                drop(guard);
                let _ = event_tx.send(ClientEvent::Terminal {
                    request_id,
                    outcome: TerminalOutcome::Error {
                        code: payload.code,
                        message: payload.message,
                    },
                });
            }
        }
        Message::ChatStart { .. } | Message::Abort { .. } => {
            // Client-bound frames of these types have no handler: they are
            // only ever sent by a Client, never received by one.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_protocol::{ChatEndPayload, ErrorPayload, ServerInfoPayload};
    use tokio::io::duplex;

    async fn write_frame(socket: &mut tokio::io::DuplexStream, msg: &Message) {
        socket.write_all(&encode(msg)).await.unwrap();
    }

    async fn read_frame(socket: &mut tokio::io::DuplexStream) -> serde_json::Value {
        let mut decoder = bridge_protocol::FrameDecoder::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.expect("read");
            assert!(n > 0);
            for ev in decoder.write(&buf[..n]) {
                if let DecodeEvent::Frame(v) = ev {
                    return v;
                }
            }
        }
    }

    #[tokio::test]
    async fn server_info_is_surfaced() {
        let (mut peer_side, client_side) = duplex(8192);
        let (_handle, mut events) = spawn(client_side);

        write_frame(
            &mut peer_side,
            &Message::ServerInfo {
                request_id: None,
                payload: ServerInfoPayload {
                    host_name: "box".to_owned(),
                    model: "llama3".to_owned(),
                    status: GateStatus::Ready,
                },
            },
        )
        .await;

        let ev = events.recv().await.expect("event");
        assert_eq!(
            ev,
            ClientEvent::ServerInfo {
                host_name: "box".to_owned(),
                model: "llama3".to_owned(),
                status: GateStatus::Ready
            }
        );
    }

    #[tokio::test]
    async fn send_chat_start_rejects_empty_and_oversize_prompts_locally() {
        let (peer_side, client_side) = duplex(8192);
        let (handle, _events) = spawn(client_side);

        assert_eq!(handle.send_chat_start("   "), Err(ClientError::EmptyPrompt));
        assert_eq!(
            handle.send_chat_start("a".repeat(MAX_PROMPT_BYTES + 1)),
            Err(ClientError::PromptTooLarge(MAX_PROMPT_BYTES + 1))
        );
        drop(peer_side);
    }

    #[tokio::test]
    async fn send_chat_start_then_second_call_is_rejected_until_terminal() {
        let (mut peer_side, client_side) = duplex(8192);
        let (handle, mut events) = spawn(client_side);

        let r1 = handle.send_chat_start("hi").expect("first accepted");
        assert_eq!(
            handle.send_chat_start("again"),
            Err(ClientError::AlreadyActive)
        );

        let start_frame = read_frame(&mut peer_side).await;
        assert_eq!(start_frame["type"], "chat_start");
        assert_eq!(start_frame["request_id"], r1);

        write_frame(
            &mut peer_side,
            &Message::chat_end(r1.clone(), FinishReason::Stop),
        )
        .await;
        let ev = events.recv().await.unwrap();
        assert_eq!(
            ev,
            ClientEvent::Terminal {
                request_id: r1,
                outcome: TerminalOutcome::Stop
            }
        );

        let r2 = handle.send_chat_start("now it works");
        assert!(r2.is_ok());
    }

    #[tokio::test]
    async fn send_abort_clears_local_state_immediately() {
        let (mut peer_side, client_side) = duplex(8192);
        let (handle, _events) = spawn(client_side);

        let r1 = handle.send_chat_start("hi").unwrap();
        let _start = read_frame(&mut peer_side).await;

        handle.send_abort();
        assert!(handle.active_request_id().is_none());

        let abort_frame = read_frame(&mut peer_side).await;
        assert_eq!(abort_frame["type"], "abort");
        assert_eq!(abort_frame["request_id"], r1);

        // a request is immediately submittable again
        assert!(handle.send_chat_start("next").is_ok());
    }

    #[tokio::test]
    async fn late_terminal_after_local_abort_is_ignored_as_benign() {
        let (mut peer_side, client_side) = duplex(8192);
        let (handle, mut events) = spawn(client_side);

        let r1 = handle.send_chat_start("hi").unwrap();
        let _start = read_frame(&mut peer_side).await;
        handle.send_abort();
        let _abort_frame = read_frame(&mut peer_side).await;

        // Host's terminal for r1 races in after local state was cleared.
        write_frame(
            &mut peer_side,
            &Message::error(Some(r1), ErrorCode::ModelBusy, "stale"),
        )
        .await;

        // Give the task a moment to process; no event should be produced.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn error_terminal_with_code_and_message_is_surfaced() {
        let (mut peer_side, client_side) = duplex(8192);
        let (handle, mut events) = spawn(client_side);
        let r1 = handle.send_chat_start("hi").unwrap();
        let _start = read_frame(&mut peer_side).await;

        write_frame(
            &mut peer_side,
            &Message::error(Some(r1.clone()), ErrorCode::TimeoutNoResponse, "no response"),
        )
        .await;

        let ev = events.recv().await.unwrap();
        assert_eq!(
            ev,
            ClientEvent::Terminal {
                request_id: r1,
                outcome: TerminalOutcome::Error {
                    code: ErrorCode::TimeoutNoResponse,
                    message: "no response".to_owned(),
                }
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_silence_timeout_fires_without_severing_the_connection() {
        let (mut peer_side, client_side) = duplex(8192);
        let (handle, mut events) = spawn(client_side);
        let r1 = handle.send_chat_start("hi").unwrap();
        let _start = read_frame(&mut peer_side).await;

        tokio::time::advance(Duration::from_secs(31)).await;

        let ev = events.recv().await.unwrap();
        assert_eq!(
            ev,
            ClientEvent::Terminal {
                request_id: r1,
                outcome: TerminalOutcome::Timeout
            }
        );
        assert!(handle.active_request_id().is_none());

        // the socket itself is untouched: a later chat_start still works
        assert!(handle.send_chat_start("again").is_ok());
    }

    #[test]
    fn chat_end_with_finish_reason_error_maps_to_generic_error_outcome() {
        let payload = ChatEndPayload {
            finish_reason: FinishReason::Error,
        };
        assert_eq!(payload.finish_reason, FinishReason::Error);
    }
}
