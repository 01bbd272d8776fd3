use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The closed wire-visible error taxonomy (spec §7).
///
/// Emitters of this protocol only ever produce one of the named variants.
/// Receivers must not reject a frame whose `code` falls outside this set —
/// an unrecognized code is surfaced to the user as `Unknown`, carrying the
/// original string, rather than treated as a framing or validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Connection
    InvalidServerId,
    ConnectFailed,
    HostOffline,
    HostDisconnected,
    UserDisconnected,
    // Provider
    OllamaNotFound,
    OllamaModelNotAvailable,
    ModelBusy,
    GenerationFailed,
    GenerationAborted,
    // Protocol
    BadMessage,
    UnsupportedVersion,
    TimeoutNoResponse,
    /// A code this implementation does not recognize. Carries the original
    /// wire string so it can still be displayed to a user.
    Unknown(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidServerId => "INVALID_SERVER_ID",
            Self::ConnectFailed => "CONNECT_FAILED",
            Self::HostOffline => "HOST_OFFLINE",
            Self::HostDisconnected => "HOST_DISCONNECTED",
            Self::UserDisconnected => "USER_DISCONNECTED",
            Self::OllamaNotFound => "OLLAMA_NOT_FOUND",
            Self::OllamaModelNotAvailable => "OLLAMA_MODEL_NOT_AVAILABLE",
            Self::ModelBusy => "MODEL_BUSY",
            Self::GenerationFailed => "GENERATION_FAILED",
            Self::GenerationAborted => "GENERATION_ABORTED",
            Self::BadMessage => "BAD_MESSAGE",
            Self::UnsupportedVersion => "UNSUPPORTED_VERSION",
            Self::TimeoutNoResponse => "TIMEOUT_NO_RESPONSE",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(value: &str) -> Self {
        match value {
            "INVALID_SERVER_ID" => Self::InvalidServerId,
            "CONNECT_FAILED" => Self::ConnectFailed,
            "HOST_OFFLINE" => Self::HostOffline,
            "HOST_DISCONNECTED" => Self::HostDisconnected,
            "USER_DISCONNECTED" => Self::UserDisconnected,
            "OLLAMA_NOT_FOUND" => Self::OllamaNotFound,
            "OLLAMA_MODEL_NOT_AVAILABLE" => Self::OllamaModelNotAvailable,
            "MODEL_BUSY" => Self::ModelBusy,
            "GENERATION_FAILED" => Self::GenerationFailed,
            "GENERATION_ABORTED" => Self::GenerationAborted,
            "BAD_MESSAGE" => Self::BadMessage,
            "UNSUPPORTED_VERSION" => Self::UnsupportedVersion,
            "TIMEOUT_NO_RESPONSE" => Self::TimeoutNoResponse,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ErrorCode::from(raw.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip_through_json() {
        for code in [
            ErrorCode::InvalidServerId,
            ErrorCode::ConnectFailed,
            ErrorCode::HostOffline,
            ErrorCode::HostDisconnected,
            ErrorCode::UserDisconnected,
            ErrorCode::OllamaNotFound,
            ErrorCode::OllamaModelNotAvailable,
            ErrorCode::ModelBusy,
            ErrorCode::GenerationFailed,
            ErrorCode::GenerationAborted,
            ErrorCode::BadMessage,
            ErrorCode::UnsupportedVersion,
            ErrorCode::TimeoutNoResponse,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(code, back);
        }
    }

    #[test]
    fn unknown_code_is_preserved_verbatim_not_rejected() {
        let parsed: ErrorCode = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(parsed, ErrorCode::Unknown("SOMETHING_NEW".to_owned()));
        assert_eq!(parsed.as_str(), "SOMETHING_NEW");
    }
}
