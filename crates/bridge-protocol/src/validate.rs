use serde_json::Value;

use crate::error_code::ErrorCode;
use crate::message::{
    ChatEndPayload, ChatStartPayload, ErrorPayload, Message, RawEnvelope, ServerInfoPayload,
    MAX_PROMPT_BYTES,
};

/// A validation failure (spec §4.2). Never terminates the session: the
/// receiver turns this into a `BAD_MESSAGE` error frame (request-scoped
/// when `request_id` is determinable) and continues processing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ValidationError {
    pub request_id: Option<String>,
    pub reason: String,
}

impl ValidationError {
    fn new(request_id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            request_id,
            reason: reason.into(),
        }
    }

    /// Converts this validation failure into the `error(BAD_MESSAGE, ...)`
    /// frame the receiver must emit (spec §4.2, §7).
    pub fn to_bad_message(&self) -> Message {
        Message::error(self.request_id.clone(), ErrorCode::BadMessage, &self.reason)
    }
}

const KNOWN_TYPES: &[&str] = &[
    "server_info",
    "chat_start",
    "chat_chunk",
    "chat_end",
    "abort",
    "error",
];

/// Pure function `raw_value -> Result<Message, ValidationError>` (spec
/// §4.2). Performs no I/O.
pub fn validate(value: Value) -> Result<Message, ValidationError> {
    let envelope = RawEnvelope::from_value(value)
        .map_err(|e| ValidationError::new(None, format!("malformed envelope: {e}")))?;

    if !KNOWN_TYPES.contains(&envelope.kind.as_str()) {
        return Err(ValidationError::new(
            envelope.request_id.clone(),
            format!("unknown message type: {}", envelope.kind),
        ));
    }

    match envelope.kind.as_str() {
        "server_info" => {
            let payload: ServerInfoPayload = serde_json::from_value(envelope.payload)
                .map_err(|e| ValidationError::new(envelope.request_id.clone(), e.to_string()))?;
            Ok(Message::ServerInfo {
                request_id: envelope.request_id,
                payload,
            })
        }
        "chat_start" => {
            let request_id = require_request_id(&envelope)?;
            let payload: ChatStartPayload = serde_json::from_value(envelope.payload)
                .map_err(|e| ValidationError::new(Some(request_id.clone()), e.to_string()))?;
            if payload.prompt.len() > MAX_PROMPT_BYTES {
                return Err(ValidationError::new(
                    Some(request_id),
                    format!(
                        "prompt exceeds {MAX_PROMPT_BYTES} UTF-8 bytes (got {})",
                        payload.prompt.len()
                    ),
                ));
            }
            Ok(Message::ChatStart {
                request_id,
                payload,
            })
        }
        "chat_chunk" => {
            let request_id = require_request_id(&envelope)?;
            let payload = serde_json::from_value(envelope.payload)
                .map_err(|e| ValidationError::new(Some(request_id.clone()), e.to_string()))?;
            Ok(Message::ChatChunk {
                request_id,
                payload,
            })
        }
        "chat_end" => {
            let request_id = require_request_id(&envelope)?;
            let payload: ChatEndPayload = serde_json::from_value(envelope.payload)
                .map_err(|e| ValidationError::new(Some(request_id.clone()), e.to_string()))?;
            Ok(Message::ChatEnd {
                request_id,
                payload,
            })
        }
        "abort" => {
            let request_id = require_request_id(&envelope)?;
            Ok(Message::Abort { request_id })
        }
        "error" => {
            let payload: ErrorPayload = serde_json::from_value(envelope.payload)
                .map_err(|e| ValidationError::new(envelope.request_id.clone(), e.to_string()))?;
            Ok(Message::Error {
                request_id: envelope.request_id,
                payload,
            })
        }
        _ => unreachable!("checked against KNOWN_TYPES above"),
    }
}

fn require_request_id(envelope: &RawEnvelope) -> Result<String, ValidationError> {
    envelope.request_id.clone().ok_or_else(|| {
        ValidationError::new(
            None,
            format!("{} requires a request_id", envelope.kind),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FinishReason;
    use serde_json::json;

    #[test]
    fn chat_start_at_exactly_the_byte_bound_is_accepted() {
        let prompt = "a".repeat(MAX_PROMPT_BYTES);
        let value = json!({"type": "chat_start", "request_id": "r1", "payload": {"prompt": prompt}});
        let msg = validate(value).expect("exactly at bound must be accepted");
        assert!(matches!(msg, Message::ChatStart { .. }));
    }

    #[test]
    fn chat_start_one_byte_over_the_bound_is_rejected() {
        let prompt = "a".repeat(MAX_PROMPT_BYTES + 1);
        let value = json!({"type": "chat_start", "request_id": "r1", "payload": {"prompt": prompt}});
        let err = validate(value).expect_err("one byte over bound must be rejected");
        assert_eq!(err.request_id.as_deref(), Some("r1"));
    }

    #[test]
    fn chat_start_byte_length_not_char_length_is_what_is_bounded() {
        // Each of these is one 4-byte UTF-8 code point (outside the BMP).
        // 2048 of them is 8192 bytes but only 2048 chars.
        let prompt: String = std::iter::repeat('\u{1F600}').take(2048).collect();
        assert_eq!(prompt.len(), MAX_PROMPT_BYTES);
        assert_eq!(prompt.chars().count(), 2048);
        let value = json!({"type": "chat_start", "request_id": "r1", "payload": {"prompt": prompt}});
        assert!(validate(value).is_ok());

        let too_long: String = std::iter::repeat('\u{1F600}').take(2049).collect();
        let value = json!({"type": "chat_start", "request_id": "r1", "payload": {"prompt": too_long}});
        assert!(validate(value).is_err());
    }

    #[test]
    fn chat_start_missing_request_id_is_rejected() {
        let value = json!({"type": "chat_start", "payload": {"prompt": "hi"}});
        let err = validate(value).expect_err("chat_start requires request_id");
        assert_eq!(err.request_id, None);
    }

    #[test]
    fn unknown_type_is_rejected_as_bad_message() {
        let value = json!({"type": "frobnicate", "payload": {}});
        assert!(validate(value).is_err());
    }

    #[test]
    fn abort_requires_request_id_but_no_payload_fields() {
        let value = json!({"type": "abort", "request_id": "r1", "payload": {}});
        let msg = validate(value).expect("abort with empty payload is valid");
        assert_eq!(msg.request_id(), Some("r1"));
    }

    #[test]
    fn server_info_request_id_is_optional() {
        let value = json!({
            "type": "server_info",
            "payload": {"host_name": "box", "model": "llama3", "status": "ready"}
        });
        let msg = validate(value).expect("server_info without request_id is valid");
        assert_eq!(msg.request_id(), None);
    }

    #[test]
    fn chat_end_enumerated_finish_reason_is_validated() {
        let value = json!({"type": "chat_end", "request_id": "r1", "payload": {"finish_reason": "bogus"}});
        assert!(validate(value).is_err());

        let value = json!({"type": "chat_end", "request_id": "r1", "payload": {"finish_reason": "abort"}});
        let msg = validate(value).expect("valid finish_reason is accepted");
        match msg {
            Message::ChatEnd { payload, .. } => assert_eq!(payload.finish_reason, FinishReason::Abort),
            _ => panic!("expected ChatEnd"),
        }
    }

    #[test]
    fn to_bad_message_carries_request_id_when_determinable() {
        let value = json!({"type": "chat_start", "request_id": "r9", "payload": {"prompt": "a".repeat(9000)}});
        let err = validate(value).unwrap_err();
        let frame = err.to_bad_message();
        assert_eq!(frame.request_id(), Some("r9"));
        match frame {
            Message::Error { payload, .. } => assert_eq!(payload.code, ErrorCode::BadMessage),
            _ => panic!("expected Error message"),
        }
    }
}
