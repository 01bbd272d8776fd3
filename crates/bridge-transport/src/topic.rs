use std::fmt;
use std::str::FromStr;

/// Byte length of a [`Topic`] (spec §3, §6): the Host's identity over the
/// overlay, presented to users as a base58 "Server ID" or QR code.
pub const TOPIC_BYTES: usize = 32;

/// A random 32-byte identifier used to rendezvous peers over the overlay
/// (spec glossary: "Topic"). Doubles as the Host's `iroh` node identity in
/// the `iroh`-backed transport (§4.1 of `iroh_transport.rs`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic([u8; TOPIC_BYTES]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("invalid base58 server id: {0}")]
    InvalidBase58(String),
    #[error("server id decodes to {0} bytes, expected {TOPIC_BYTES}")]
    WrongLength(usize),
}

impl Topic {
    /// Generates a fresh random topic (spec §3: "a random 32-byte topic").
    pub fn random() -> Self {
        let mut bytes = [0u8; TOPIC_BYTES];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; TOPIC_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TOPIC_BYTES] {
        &self.0
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({self})")
    }
}

/// Renders as base58, the "Server ID" shared out-of-band (spec §1, §6).
impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

/// Clients decode a Server ID and must reject anything that does not yield
/// exactly 32 bytes (spec §6).
impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| TopicError::InvalidBase58(e.to_string()))?;
        let bytes: [u8; TOPIC_BYTES] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| TopicError::WrongLength(v.len()))?;
        Ok(Self(bytes))
    }
}
