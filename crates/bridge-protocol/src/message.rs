use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error_code::ErrorCode;

/// Maximum UTF-8 byte length of a `chat_start` prompt (spec §3).
pub const MAX_PROMPT_BYTES: usize = 8192;

/// An opaque, non-empty identifier for one request, unique within a peer
/// session's lifetime. Immutable once assigned (spec §3).
pub type RequestId = String;

/// `ServerInfo` payload: sent once per peer session immediately on attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfoPayload {
    pub host_name: String,
    pub model: String,
    pub status: GateStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Ready,
    Busy,
}

/// `ChatStart` payload: `{ prompt }`, prompt UTF-8 length bounded by
/// [`MAX_PROMPT_BYTES`] (enforced by the validator, not by this type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatStartPayload {
    pub prompt: String,
}

/// `ChatChunk` payload: a single streamed delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChunkPayload {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Abort,
    Error,
}

/// `ChatEnd` payload: terminal for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEndPayload {
    pub finish_reason: FinishReason,
}

/// `Error` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

/// A validated, typed protocol message (spec §3, §6).
///
/// This is the output of the validator (§4.2) and the input to the codec's
/// encode path. Unlike the wire form, `request_id` is only present on the
/// variants that structurally require it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    ServerInfo {
        request_id: Option<RequestId>,
        payload: ServerInfoPayload,
    },
    ChatStart {
        request_id: RequestId,
        payload: ChatStartPayload,
    },
    ChatChunk {
        request_id: RequestId,
        payload: ChatChunkPayload,
    },
    ChatEnd {
        request_id: RequestId,
        payload: ChatEndPayload,
    },
    Abort {
        request_id: RequestId,
    },
    Error {
        request_id: Option<RequestId>,
        payload: ErrorPayload,
    },
}

impl Message {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Message::ServerInfo { request_id, .. } | Message::Error { request_id, .. } => {
                request_id.as_deref()
            }
            Message::ChatStart { request_id, .. }
            | Message::ChatChunk { request_id, .. }
            | Message::ChatEnd { request_id, .. }
            | Message::Abort { request_id } => Some(request_id.as_str()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Message::ServerInfo { .. } => "server_info",
            Message::ChatStart { .. } => "chat_start",
            Message::ChatChunk { .. } => "chat_chunk",
            Message::ChatEnd { .. } => "chat_end",
            Message::Abort { .. } => "abort",
            Message::Error { .. } => "error",
        }
    }

    pub fn chat_chunk(request_id: impl Into<String>, text: impl Into<String>) -> Self {
        Message::ChatChunk {
            request_id: request_id.into(),
            payload: ChatChunkPayload { text: text.into() },
        }
    }

    pub fn chat_end(request_id: impl Into<String>, finish_reason: FinishReason) -> Self {
        Message::ChatEnd {
            request_id: request_id.into(),
            payload: ChatEndPayload { finish_reason },
        }
    }

    pub fn error(
        request_id: Option<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Message::Error {
            request_id,
            payload: ErrorPayload {
                code,
                message: message.into(),
            },
        }
    }

    /// Converts this message into its wire envelope (spec §3: `{ type,
    /// request_id?, payload }`).
    pub fn to_envelope(&self) -> RawEnvelope {
        match self {
            Message::ServerInfo {
                request_id,
                payload,
            } => RawEnvelope {
                kind: "server_info".to_owned(),
                request_id: request_id.clone(),
                payload: serde_json::to_value(payload).expect("ServerInfoPayload is always valid JSON"),
            },
            Message::ChatStart {
                request_id,
                payload,
            } => RawEnvelope {
                kind: "chat_start".to_owned(),
                request_id: Some(request_id.clone()),
                payload: serde_json::to_value(payload).expect("ChatStartPayload is always valid JSON"),
            },
            Message::ChatChunk {
                request_id,
                payload,
            } => RawEnvelope {
                kind: "chat_chunk".to_owned(),
                request_id: Some(request_id.clone()),
                payload: serde_json::to_value(payload).expect("ChatChunkPayload is always valid JSON"),
            },
            Message::ChatEnd {
                request_id,
                payload,
            } => RawEnvelope {
                kind: "chat_end".to_owned(),
                request_id: Some(request_id.clone()),
                payload: serde_json::to_value(payload).expect("ChatEndPayload is always valid JSON"),
            },
            Message::Abort { request_id } => RawEnvelope {
                kind: "abort".to_owned(),
                request_id: Some(request_id.clone()),
                payload: Value::Object(serde_json::Map::new()),
            },
            Message::Error {
                request_id,
                payload,
            } => RawEnvelope {
                kind: "error".to_owned(),
                request_id: request_id.clone(),
                payload: serde_json::to_value(payload).expect("ErrorPayload is always valid JSON"),
            },
        }
    }
}

/// The untyped wire envelope: `type` + optional `request_id` + `payload`.
///
/// Decoding a frame (C1) yields a [`Value`]; constructing a `RawEnvelope`
/// from it (or failing) is framing, not validation — see
/// [`crate::validate::validate`] for the schema/size checks that turn a
/// `RawEnvelope` into a [`Message`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(default)]
    pub payload: Value,
}

impl RawEnvelope {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
