//! Wire protocol for the inference bridge: the newline-delimited JSON frame
//! codec (C1) and the message schema/validator (C2).
//!
//! Pure data types and pure functions only — no I/O, no async runtime
//! dependency. `bridge-core` and `bridge-client` both depend on this crate
//! and drive it from their respective connection loops.

pub mod codec;
mod error_code;
mod message;
pub mod validate;

pub use codec::{encode, DecodeEvent, FrameDecoder, MAX_BUFFER_BYTES};
pub use error_code::ErrorCode;
pub use message::{
    ChatChunkPayload, ChatEndPayload, ChatStartPayload, ErrorPayload, FinishReason, GateStatus,
    Message, RawEnvelope, RequestId, ServerInfoPayload, MAX_PROMPT_BYTES,
};
pub use validate::{validate, ValidationError};
