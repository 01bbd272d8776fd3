use std::sync::Arc;

use bridge_core::{new_debug_logger, ConnectionSupervisor, DebugLogger, Relay};
use bridge_provider::InferenceProvider;
use bridge_transport::{PeerListener, Topic};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::HostConfig;
use crate::console;

/// Everything a running Host needs beyond the transport: the relay, the
/// supervisor fronting it, and the in-memory debug log the console drains.
pub struct Host {
    pub relay: Arc<Relay>,
    pub supervisor: Arc<ConnectionSupervisor>,
    pub debug_log: Arc<DebugLogger>,
}

impl Host {
    pub fn new(config: &HostConfig, provider: Arc<dyn InferenceProvider>) -> Self {
        let relay = Relay::new(provider, config.host_name.clone(), config.model.clone());
        let supervisor = Arc::new(ConnectionSupervisor::with_cap(relay.clone(), config.max_clients));
        let (debug_log, _rx) = new_debug_logger(512);

        let mut status_rx = relay.subscribe();
        let log_sink = debug_log.clone();
        tokio::spawn(async move {
            loop {
                match status_rx.recv().await {
                    Ok(status) => log_sink.log(status),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            relay,
            supervisor,
            debug_log,
        }
    }

    /// Accepts connections from `listener` until it closes, offering each
    /// one to the supervisor. Runs until the listener's `accept` returns
    /// `None` (transport shut down) or the supervisor is told to shut down.
    pub async fn serve(self: Arc<Self>, listener: Arc<dyn PeerListener>) {
        loop {
            if self.supervisor.is_shutting_down() {
                break;
            }
            match listener.accept().await {
                Some(socket) => {
                    let supervisor = self.supervisor.clone();
                    tokio::spawn(async move {
                        supervisor.offer(socket).await;
                    });
                }
                None => {
                    info!("transport closed, no further peers will be accepted");
                    break;
                }
            }
        }
    }

    /// Runs the stdin console loop (spec §6's admin verbs) until `stop`,
    /// `quit`, or EOF.
    pub async fn run_console(self: Arc<Self>, server_id: Topic, debug_enabled_tx: mpsc::UnboundedSender<bool>) {
        console::run(
            tokio::io::stdin(),
            self.relay.clone(),
            self.supervisor.clone(),
            server_id.to_string(),
            self.debug_log.clone(),
            debug_enabled_tx,
            false,
        )
        .await;
    }

    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }
}

/// Waits for SIGTERM or Ctrl+C.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_attach_is_reflected_in_the_debug_log() {
        let config = HostConfig {
            host_name: "test-host".to_owned(),
            model: "llama3".to_owned(),
            ollama_url: "http://localhost:11434".to_owned(),
            max_clients: bridge_core::MAX_PEERS,
            bind_topic_seed: None,
        };
        let provider = Arc::new(bridge_provider::MockProvider::new());
        let host = Host::new(&config, provider);

        let (host_side, _peer_side) = tokio::io::duplex(4096);
        host.relay.attach(host_side).await;

        for _ in 0..50 {
            if host.debug_log.entries().iter().any(|e| e.contains("attached")) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(host.debug_log.entries().iter().any(|e| e.contains("attached")));
    }
}
