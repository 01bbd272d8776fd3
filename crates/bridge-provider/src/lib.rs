use std::time::Duration;

mod mock;
mod ollama;
mod provider;

pub use mock::{MockProvider, ScriptAction, ScriptStep};
pub use ollama::OllamaProvider;
pub use provider::{HealthStatus, InferenceProvider, Sink};

/// How long `generate` may go without delivering a chunk (or any upstream
/// byte, for HTTP-backed providers) before it must fail the request with
/// `TIMEOUT_NO_RESPONSE` (spec §4.3).
pub const CHUNK_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
