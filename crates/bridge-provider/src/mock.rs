use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_protocol::{ErrorCode, RequestId};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::provider::{HealthStatus, InferenceProvider, Sink};
use crate::CHUNK_IDLE_TIMEOUT;

/// One step of a scripted generation, with an optional delay before it
/// fires (used to simulate provider think-time, including stalls long
/// enough to trip the chunk-idle timeout).
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub delay: Duration,
    pub action: ScriptAction,
}

#[derive(Debug, Clone)]
pub enum ScriptAction {
    Chunk(String),
    End,
    Error(ErrorCode, String),
}

impl ScriptStep {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            action: ScriptAction::Chunk(text.into()),
        }
    }

    pub fn end() -> Self {
        Self {
            delay: Duration::ZERO,
            action: ScriptAction::End,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            action: ScriptAction::Error(code, message.into()),
        }
    }

    /// A stall long enough that, inserted between two chunks, trips the
    /// chunk-idle timeout. Carries no payload of its own — it just delays
    /// whatever the next queued step is, without resetting the idle timer
    /// (unlike a delivered chunk).
    pub fn stall(duration: Duration) -> Self {
        Self {
            delay: duration,
            action: ScriptAction::End,
        }
    }
}

#[derive(Default)]
struct MockInner {
    scripts: VecDeque<Vec<ScriptStep>>,
    abort_signals: HashMap<String, Arc<Notify>>,
    healthy: bool,
}

/// A deterministic in-memory [`InferenceProvider`] double (spec §9: "a
/// test implementation simulates chunk streams and arbitrary failure
/// modes"). Each call to `generate` pops the next queued script; if none
/// is queued, it immediately emits a `GENERATION_FAILED` error so a
/// misconfigured test fails loudly rather than hanging.
pub struct MockProvider {
    inner: Mutex<MockInner>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockInner {
                scripts: VecDeque::new(),
                abort_signals: HashMap::new(),
                healthy: true,
            }),
        }
    }

    /// Queues a script to be consumed by the next `generate` call.
    pub async fn push_script(&self, steps: Vec<ScriptStep>) {
        self.inner.lock().await.scripts.push_back(steps);
    }

    /// Marks the provider unreachable for subsequent `health()` calls.
    pub async fn set_unhealthy(&self) {
        self.inner.lock().await.healthy = false;
    }

    async fn pop_script(&self) -> Vec<ScriptStep> {
        self.inner.lock().await.scripts.pop_front().unwrap_or_else(|| {
            vec![ScriptStep::error(
                ErrorCode::GenerationFailed,
                "no script queued for MockProvider",
            )]
        })
    }

    async fn register(&self, request_id: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.inner
            .lock()
            .await
            .abort_signals
            .insert(request_id.to_owned(), notify.clone());
        notify
    }

    async fn unregister(&self, request_id: &str) {
        self.inner.lock().await.abort_signals.remove(request_id);
    }
}

#[async_trait]
impl InferenceProvider for MockProvider {
    async fn health(&self) -> HealthStatus {
        if self.inner.lock().await.healthy {
            HealthStatus::Ok
        } else {
            HealthStatus::Unreachable("mock provider marked unhealthy".to_owned())
        }
    }

    async fn generate(
        &self,
        request_id: RequestId,
        _model: String,
        _prompt: String,
        sink: &mut (dyn Sink + Send),
    ) {
        let script = self.pop_script().await;
        let abort_notify = self.register(&request_id).await;
        let mut idle_deadline = Instant::now() + CHUNK_IDLE_TIMEOUT;

        for step in script {
            tokio::select! {
                () = abort_notify.notified() => {
                    self.unregister(&request_id).await;
                    return;
                }
                () = tokio::time::sleep_until(idle_deadline) => {
                    sink.on_error(ErrorCode::TimeoutNoResponse, "no response from model".to_owned()).await;
                    self.unregister(&request_id).await;
                    return;
                }
                () = tokio::time::sleep(step.delay) => {
                    match step.action {
                        ScriptAction::Chunk(text) => {
                            sink.on_chunk(text).await;
                            idle_deadline = Instant::now() + CHUNK_IDLE_TIMEOUT;
                        }
                        ScriptAction::End => {
                            sink.on_end().await;
                            self.unregister(&request_id).await;
                            return;
                        }
                        ScriptAction::Error(code, message) => {
                            sink.on_error(code, message).await;
                            self.unregister(&request_id).await;
                            return;
                        }
                    }
                }
            }
        }
        self.unregister(&request_id).await;
    }

    async fn abort(&self, request_id: &str) -> bool {
        let signal = self.inner.lock().await.abort_signals.remove(request_id);
        match signal {
            Some(notify) => {
                notify.notify_one();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        chunks: Vec<String>,
        ended: bool,
        error: Option<(ErrorCode, String)>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                chunks: Vec::new(),
                ended: false,
                error: None,
            }
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn on_chunk(&mut self, text: String) {
            self.chunks.push(text);
        }
        async fn on_end(&mut self) {
            self.ended = true;
        }
        async fn on_error(&mut self, code: ErrorCode, message: String) {
            self.error = Some((code, message));
        }
    }

    #[tokio::test]
    async fn scripted_chunks_then_end_are_delivered_in_order() {
        let provider = MockProvider::new();
        provider
            .push_script(vec![
                ScriptStep::chunk("Hello"),
                ScriptStep::chunk(" there"),
                ScriptStep::end(),
            ])
            .await;

        let mut sink = RecordingSink::new();
        provider
            .generate("r1".to_owned(), "llama3".to_owned(), "hi".to_owned(), &mut sink)
            .await;

        assert_eq!(sink.chunks, vec!["Hello".to_owned(), " there".to_owned()]);
        assert!(sink.ended);
        assert!(sink.error.is_none());
    }

    #[tokio::test]
    async fn abort_during_generation_suppresses_terminal_sink_callback() {
        let provider = Arc::new(MockProvider::new());
        provider
            .push_script(vec![
                ScriptStep::chunk("partial"),
                ScriptStep {
                    delay: Duration::from_secs(3600),
                    action: ScriptAction::End,
                },
            ])
            .await;

        let mut sink = RecordingSink::new();
        let p = provider.clone();
        let handle = tokio::spawn(async move {
            let mut sink = RecordingSink::new();
            p.generate("r1".to_owned(), "m".to_owned(), "p".to_owned(), &mut sink).await;
            sink
        });

        // Give the first chunk a chance to flow, then abort before the long stall resolves.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let acked = provider.abort("r1").await;
        assert!(acked);

        sink = handle.await.unwrap();
        assert_eq!(sink.chunks, vec!["partial".to_owned()]);
        assert!(!sink.ended);
        assert!(sink.error.is_none());
    }

    #[tokio::test]
    async fn abort_of_unknown_request_id_returns_false() {
        let provider = MockProvider::new();
        assert!(!provider.abort("never-started").await);
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_idle_timeout_fires_when_no_chunk_arrives_for_30_seconds() {
        let provider = MockProvider::new();
        provider
            .push_script(vec![ScriptStep::stall(Duration::from_secs(31))])
            .await;

        let mut sink = RecordingSink::new();
        provider
            .generate("r1".to_owned(), "m".to_owned(), "p".to_owned(), &mut sink)
            .await;

        assert_eq!(sink.error.as_ref().map(|(c, _)| c.clone()), Some(ErrorCode::TimeoutNoResponse));
        assert!(!sink.ended);
    }
}
