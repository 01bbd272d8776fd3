use async_trait::async_trait;
use tokio::io::duplex;
use tokio::sync::mpsc;

use crate::socket::BoxedSocket;
use crate::topic::Topic;
use crate::{ConnectError, PeerConnector, PeerListener};

const DUPLEX_BUFFER: usize = 64 * 1024;

/// An in-memory duplex-pipe transport double, for unit and integration
/// tests that don't want a real QUIC handshake (spec §9 calls this kind of
/// thing out for `InferenceProvider`; the same shape applies here — the
/// core shouldn't need a network to exercise its protocol logic).
///
/// [`InMemoryListener::accept`] and [`InMemoryConnector::connect`] are two
/// ends of the same channel: every `connect` call creates a fresh
/// `tokio::io::duplex` pair, hands one half to the listener's `accept`
/// queue, and keeps the other half for the caller.
pub struct InMemoryListener {
    topic: Topic,
    accept_rx: tokio::sync::Mutex<mpsc::Receiver<BoxedSocket>>,
}

#[derive(Clone)]
pub struct InMemoryConnector {
    topic: Topic,
    connect_tx: mpsc::Sender<BoxedSocket>,
}

/// Builds a connected listener/connector pair sharing one topic, the way a
/// single Host process owns both ends of its transport.
pub fn pair(topic: Topic) -> (InMemoryListener, InMemoryConnector) {
    let (connect_tx, accept_rx) = mpsc::channel(16);
    (
        InMemoryListener {
            topic,
            accept_rx: tokio::sync::Mutex::new(accept_rx),
        },
        InMemoryConnector { topic, connect_tx },
    )
}

#[async_trait]
impl PeerListener for InMemoryListener {
    fn topic(&self) -> Topic {
        self.topic
    }

    async fn accept(&self) -> Option<BoxedSocket> {
        self.accept_rx.lock().await.recv().await
    }
}

#[async_trait]
impl PeerConnector for InMemoryConnector {
    async fn connect(&self, topic: Topic) -> Result<BoxedSocket, ConnectError> {
        if topic != self.topic {
            return Err(ConnectError::HostOffline(
                "no in-memory listener registered for that topic".to_owned(),
            ));
        }
        let (host_side, client_side) = duplex(DUPLEX_BUFFER);
        self.connect_tx
            .send(Box::pin(host_side))
            .await
            .map_err(|_| ConnectError::HostOffline("listener has shut down".to_owned()))?;
        Ok(Box::pin(client_side))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn connect_delivers_the_host_half_to_accept() {
        let topic = Topic::random();
        let (listener, connector) = pair(topic);

        let mut client_socket = connector.connect(topic).await.expect("connect");
        let mut host_socket = listener.accept().await.expect("accept");

        client_socket.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        host_socket.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn connect_to_wrong_topic_fails() {
        let (_, connector) = pair(Topic::random());
        let err = connector.connect(Topic::random()).await.unwrap_err();
        assert!(matches!(err, ConnectError::HostOffline(_)));
    }
}
