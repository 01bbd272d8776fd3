use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

/// A duplex byte stream to one peer, the narrow capability `bridge-core`'s
/// session (C5) and `bridge-client`'s driver (C7) actually depend on.
/// Blanket-implemented for anything that is already `AsyncRead + AsyncWrite
/// + Unpin + Send` — a raw TCP/QUIC stream, an `iroh` bidirectional stream
/// pair joined with [`tokio::io::join`], or an in-memory `tokio::io::duplex`
/// half used in tests.
pub trait PeerSocket: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> PeerSocket for T {}

/// A type-erased [`PeerSocket`], handed from a listener/connector to the
/// core/client crates so neither needs to know which transport produced it.
pub type BoxedSocket = Pin<Box<dyn PeerSocket>>;
