use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bridge_protocol::RequestId;
use bridge_provider::{HealthStatus, InferenceProvider};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::gate::Gate;
use crate::session::{self, SessionId};

/// Gate/provider-reachability transitions the relay fans out to an
/// external observer (spec §4.6). Delivery is best-effort: a lagging
/// subscriber drops the oldest entries rather than blocking the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStatus {
    GateAcquired { request_id: RequestId },
    GateReleased,
    ProviderReachable,
    ProviderUnreachable { message: String },
    SessionAttached { session_id: SessionId },
    SessionDetached { session_id: SessionId },
}

impl std::fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GateAcquired { request_id } => write!(f, "gate acquired for {request_id}"),
            Self::GateReleased => write!(f, "gate released"),
            Self::ProviderReachable => write!(f, "provider reachable"),
            Self::ProviderUnreachable { message } => write!(f, "provider unreachable: {message}"),
            Self::SessionAttached { session_id } => write!(f, "session {session_id} attached"),
            Self::SessionDetached { session_id } => write!(f, "session {session_id} detached"),
        }
    }
}

struct SessionEntry {
    handle: JoinHandle<()>,
}

/// Owns the gate (C4), the provider handle (C3), and the session registry;
/// broadcasts status transitions (C6, spec §4.6).
///
/// Does not own the transport itself — a supervisor (C8) forwards
/// connection events into `attach`.
pub struct Relay {
    gate: Arc<Gate>,
    provider: Arc<dyn InferenceProvider>,
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    next_id: AtomicU64,
    status_tx: broadcast::Sender<RelayStatus>,
    host_name: String,
    model: parking_lot::Mutex<String>,
}

impl Relay {
    pub fn new(provider: Arc<dyn InferenceProvider>, host_name: String, model: String) -> Arc<Self> {
        let (status_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            gate: Arc::new(Gate::new()),
            provider,
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            status_tx,
            host_name,
            model: parking_lot::Mutex::new(model),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayStatus> {
        self.status_tx.subscribe()
    }

    pub fn model(&self) -> String {
        self.model.lock().clone()
    }

    /// Changes the model used by sessions attached from now on (the
    /// console's `select-model` command). Sessions already attached keep
    /// whatever model they captured at attach time — a generation in
    /// flight never switches models under it.
    pub fn set_model(&self, model: String) {
        *self.model.lock() = model;
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn active_request_id(&self) -> Option<RequestId> {
        self.gate.active()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Creates a C5 bound to this relay for `socket` and spawns its task.
    /// Uncapped — callers that must enforce a peer limit use
    /// [`Self::try_attach`] instead.
    pub async fn attach<S>(self: &Arc<Self>, socket: S) -> SessionId
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.try_attach(socket, usize::MAX)
            .await
            .unwrap_or_else(|_| unreachable!("usize::MAX cap is never reached"))
    }

    /// Atomically checks the session count against `cap` and, if there is
    /// room, registers and spawns a session for `socket` — in the same
    /// critical section over the session registry, so two sockets offered
    /// back-to-back can't both observe room and both get admitted (spec
    /// §4.8's hard cap). Returns `socket` back to the caller, unattached,
    /// if `cap` has already been reached.
    pub async fn try_attach<S>(self: &Arc<Self>, socket: S, cap: usize) -> Result<SessionId, S>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let relay = self.clone();
        let gate = self.gate.clone();
        let provider = self.provider.clone();
        let host_name = self.host_name.clone();
        let model = self.model.lock().clone();
        let status_tx = self.status_tx.clone();

        let mut sessions = self.sessions.write().await;
        if sessions.len() >= cap {
            return Err(socket);
        }

        let handle = tokio::spawn(async move {
            session::run_peer_session(id, socket, gate, provider, host_name, model, status_tx)
                .await;
            relay.detach(id).await;
        });
        sessions.insert(id, SessionEntry { handle });
        drop(sessions);

        let _ = self.status_tx.send(RelayStatus::SessionAttached { session_id: id });
        Ok(id)
    }

    /// Removes a session's registry entry once its task has finished its
    /// own disconnect handling. A no-op if the entry is already gone
    /// (e.g. `shutdown` already drained it).
    pub async fn detach(&self, id: SessionId) {
        if self.sessions.write().await.remove(&id).is_some() {
            let _ = self
                .status_tx
                .send(RelayStatus::SessionDetached { session_id: id });
        }
    }

    /// Administrative: abort whoever currently holds the gate.
    pub async fn abort_active(&self) {
        if let Some(active) = self.gate.active() {
            self.provider.abort(&active).await;
            self.gate.force_release();
            let _ = self.status_tx.send(RelayStatus::GateReleased);
        }
    }

    /// Probes the provider and reports the resulting reachability status.
    pub async fn health_check(&self) {
        match self.provider.health().await {
            HealthStatus::Ok => {
                let _ = self.status_tx.send(RelayStatus::ProviderReachable);
            }
            HealthStatus::Unreachable(message) => {
                let _ = self.status_tx.send(RelayStatus::ProviderUnreachable { message });
            }
        }
    }

    /// Aborts the active generation, then tears down every attached
    /// session. Idempotent from the caller's perspective: a second call
    /// simply finds an empty registry and an already-released gate.
    pub async fn shutdown(&self) {
        self.abort_active().await;
        let mut sessions = self.sessions.write().await;
        for (_, entry) in sessions.drain() {
            entry.handle.abort();
        }
    }
}
