use async_trait::async_trait;
use iroh::endpoint::Endpoint;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::socket::BoxedSocket;
use crate::topic::{Topic, TOPIC_BYTES};
use crate::{ConnectError, PeerConnector, PeerListener};

/// ALPN identifying this protocol during the QUIC handshake (spec §1: the
/// overlay transport is an out-of-scope collaborator; this is the one
/// detail the core's transport adapter must agree on with its peers). Not a
/// `gossip`/broadcast topic — each peer gets its own direct bidirectional
/// QUIC stream, since this protocol is a request/response-with-streaming
/// relationship between exactly two parties, not a pub-sub chat room.
pub const BRIDGE_ALPN: &[u8] = b"inference-bridge/1";

/// A direct `iroh`-backed peer listener: the Host's identity is an `iroh`
/// node keypair whose public key bytes *are* the 32-byte [`Topic`] (spec
/// §6's "Topic encoding" — the same "32-byte public key shared out-of-band"
/// identity scheme used across the pack's peer-to-peer examples).
pub struct IrohListener {
    topic: Topic,
    endpoint: Endpoint,
    incoming_rx: tokio::sync::Mutex<mpsc::Receiver<BoxedSocket>>,
}

impl IrohListener {
    /// Binds a fresh `iroh` endpoint under [`BRIDGE_ALPN`] and spawns the
    /// accept loop that turns inbound connections into [`BoxedSocket`]s.
    /// The node keypair (and therefore the [`Topic`]) is freshly generated
    /// on every call.
    pub async fn bind() -> anyhow::Result<Self> {
        Self::bind_with_seed(None).await
    }

    /// Same as [`Self::bind`], but if `seed` holds exactly [`TOPIC_BYTES`]
    /// bytes, the endpoint's keypair (and so its [`Topic`]) is derived
    /// deterministically from it instead of generated fresh. This is how an
    /// operator pins a stable Server ID across restarts of the same host
    /// (`BIND_TOPIC_SEED`); a seed of any other length is ignored.
    pub async fn bind_with_seed(seed: Option<&[u8]>) -> anyhow::Result<Self> {
        let mut builder = Endpoint::builder().alpns(vec![BRIDGE_ALPN.to_vec()]);
        if let Some(seed) = seed {
            if let Ok(bytes) = <[u8; TOPIC_BYTES]>::try_from(seed) {
                builder = builder.secret_key(iroh::SecretKey::from_bytes(&bytes));
            }
        }
        let endpoint = builder.bind().await?;
        let topic = Topic::from_bytes(*endpoint.id().as_bytes());

        let (incoming_tx, incoming_rx) = mpsc::channel(16);
        let accept_endpoint = endpoint.clone();
        tokio::spawn(async move {
            while let Some(incoming) = accept_endpoint.accept().await {
                let tx = incoming_tx.clone();
                tokio::spawn(async move {
                    match accept_one(incoming).await {
                        Ok(socket) => {
                            if tx.send(socket).await.is_err() {
                                debug!("listener shut down before a pending connection completed");
                            }
                        }
                        Err(e) => warn!(error = %e, "dropping peer connection that failed handshake"),
                    }
                });
            }
        });

        Ok(Self {
            topic,
            endpoint,
            incoming_rx: tokio::sync::Mutex::new(incoming_rx),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

async fn accept_one(incoming: iroh::endpoint::Incoming) -> anyhow::Result<BoxedSocket> {
    let connection = incoming.accept()?.await?;
    let (send, recv) = connection.accept_bi().await?;
    Ok(Box::pin(tokio::io::join(recv, send)))
}

#[async_trait]
impl PeerListener for IrohListener {
    fn topic(&self) -> Topic {
        self.topic
    }

    async fn accept(&self) -> Option<BoxedSocket> {
        self.incoming_rx.lock().await.recv().await
    }
}

/// A direct `iroh`-backed peer connector: dials the Host's `iroh` node by
/// treating the [`Topic`] bytes as its public key, opens one bidirectional
/// stream under [`BRIDGE_ALPN`], and hands the joined stream back as a
/// single duplex socket.
pub struct IrohConnector {
    endpoint: Endpoint,
}

impl IrohConnector {
    pub async fn bind() -> anyhow::Result<Self> {
        let endpoint = Endpoint::builder().bind().await?;
        Ok(Self { endpoint })
    }
}

#[async_trait]
impl PeerConnector for IrohConnector {
    async fn connect(&self, topic: Topic) -> Result<BoxedSocket, ConnectError> {
        let endpoint_id = iroh::EndpointId::from_bytes(topic.as_bytes())
            .map_err(|e| ConnectError::HostOffline(format!("invalid node id: {e}")))?;
        let connection = self
            .endpoint
            .connect(endpoint_id, BRIDGE_ALPN)
            .await
            .map_err(|e| ConnectError::HostOffline(e.to_string()))?;
        let (send, recv) = connection
            .open_bi()
            .await
            .map_err(|e| ConnectError::HostOffline(e.to_string()))?;
        Ok(Box::pin(tokio::io::join(recv, send)))
    }
}

// Kept in sync with `Topic::TOPIC_BYTES`: an `iroh` node id is exactly this
// many bytes (an Ed25519 public key), which is why `Topic` can be used
// directly as node-id storage without a conversion layer.
const _: () = assert!(TOPIC_BYTES == 32);
