use async_trait::async_trait;
use bridge_protocol::{ErrorCode, RequestId};

/// Outcome of [`InferenceProvider::health`] (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Unreachable(String),
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, HealthStatus::Ok)
    }
}

/// The streamed-callback capability `generate` drives (spec §4.3).
///
/// `on_chunk` may fire zero or more times, in order. Exactly one of
/// `on_end`/`on_error` fires, exactly once, as the terminal callback; after
/// that, no further `on_chunk` for the same request may be delivered.
#[async_trait]
pub trait Sink: Send {
    async fn on_chunk(&mut self, text: String);
    async fn on_end(&mut self);
    async fn on_error(&mut self, code: ErrorCode, message: String);
}

/// The narrow capability the relay depends on (spec §4.3, §9): a pluggable
/// inference backend exposed as three operations, never as inheritance or
/// method overriding.
///
/// `generate` runs the full streamed generation to completion, driving
/// `sink` as data arrives, and only returns once a terminal callback has
/// fired. It never returns a `Result` of its own — every failure mode is
/// reported through `sink.on_error`, which is why a caller can treat
/// `generate` as infallible from a control-flow point of view (spec §7:
/// "every session handler is infallible from the supervisor's
/// perspective").
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn health(&self) -> HealthStatus;

    async fn generate(
        &self,
        request_id: RequestId,
        model: String,
        prompt: String,
        sink: &mut (dyn Sink + Send),
    );

    /// Cancel a previously started generation. Returns `true` if a
    /// cancellation was dispatched (the request was still running from this
    /// provider's point of view). Abort and completion may race; once an
    /// abort is acknowledged (`true` returned), no further `on_chunk` for
    /// `request_id` will be delivered.
    async fn abort(&self, request_id: &str) -> bool;
}
