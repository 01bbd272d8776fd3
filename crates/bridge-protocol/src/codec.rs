use serde_json::Value;

use crate::message::Message;

/// Inbound reassembly buffer bound (spec §4.1, §6): 64 KiB.
pub const MAX_BUFFER_BYTES: usize = 64 * 1024;

/// Encodes a message as its JSON serialization followed by a single `\n`
/// (spec §4.1 Encode).
pub fn encode(message: &Message) -> Vec<u8> {
    let envelope = message.to_envelope();
    let mut bytes =
        serde_json::to_vec(&envelope).expect("validated messages always serialize to JSON");
    bytes.push(b'\n');
    bytes
}

/// One outcome of feeding bytes into a [`FrameDecoder`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    /// A complete, successfully-parsed JSON value delimited by `\n`.
    /// Structural/schema validation (C2) happens downstream of this.
    Frame(Value),
    /// The reassembly buffer exceeded [`MAX_BUFFER_BYTES`] before a `\n`
    /// was found. The buffer has been cleared; no resynchronization is
    /// attempted (spec §9: admitting partial-frame smuggling is worse than
    /// a clean truncation).
    BufferOverflow,
}

/// A byte-stream-safe, append-only frame decoder (spec §4.1 Decode).
///
/// `write` may be called with arbitrarily-sized chunks, including ones that
/// split a frame mid-way; the sequence of delivered [`DecodeEvent::Frame`]
/// values is identical regardless of how the same byte stream is chunked.
/// Not restartable across sessions — construct a fresh decoder per peer
/// session.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `chunk` into the decoder, returning every frame (or overflow
    /// signal) it produces, in arrival order.
    pub fn write(&mut self, chunk: &[u8]) -> Vec<DecodeEvent> {
        self.buf.extend_from_slice(chunk);

        if self.buf.len() > MAX_BUFFER_BYTES {
            self.buf.clear();
            return vec![DecodeEvent::BufferOverflow];
        }

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<Value>(line) {
                Ok(value) => events.push(DecodeEvent::Frame(value)),
                Err(_) => {
                    // Framing only: malformed JSON is discarded silently,
                    // not surfaced as an error (spec §4.1, §7).
                }
            }
        }
        events
    }

    /// Number of bytes currently buffered, awaiting a `\n`.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}
