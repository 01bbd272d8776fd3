//! Client-side protocol driver (C7): mirrors `bridge-core`'s per-connection
//! peer session from the other end of the socket — submit prompts, collect
//! chunks, enforce the inbound chunk timeout, support user abort, and
//! surface terminal events (spec §4.7).

mod driver;

pub use driver::{spawn, ClientError, ClientEvent, ClientHandle, TerminalOutcome};
