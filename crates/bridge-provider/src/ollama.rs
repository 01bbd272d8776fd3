use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_protocol::{ErrorCode, RequestId};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::provider::{HealthStatus, InferenceProvider, Sink};
use crate::CHUNK_IDLE_TIMEOUT;

/// One line of Ollama's `/api/generate` streaming NDJSON response.
#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP adapter streaming newline-delimited JSON deltas from an Ollama-style
/// `/api/generate` endpoint (spec §6 "Provider adapter contract").
///
/// Maps HTTP/transport failures onto the closed error-code set:
/// connection refused / DNS failure -> `OLLAMA_NOT_FOUND`, a 404 naming the
/// model -> `OLLAMA_MODEL_NOT_AVAILABLE`, any other non-2xx or stream
/// breakage -> `GENERATION_FAILED`. Enforces the 30s chunk-idle timeout
/// itself, resetting on every byte read (not only on delivered chunks),
/// the way spec §4.3 requires.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    inflight: Mutex<HashMap<String, Arc<Notify>>>,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            base_url: base_url.into(),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    async fn register(&self, request_id: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.inflight
            .lock()
            .await
            .insert(request_id.to_owned(), notify.clone());
        notify
    }

    async fn unregister(&self, request_id: &str) {
        self.inflight.lock().await.remove(request_id);
    }
}

#[async_trait]
impl InferenceProvider for OllamaProvider {
    async fn health(&self) -> HealthStatus {
        let url = format!("{}/api/tags", self.base_url.trim_end_matches('/'));
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => HealthStatus::Ok,
            Ok(resp) => HealthStatus::Unreachable(format!("unexpected status {}", resp.status())),
            Err(e) => HealthStatus::Unreachable(e.to_string()),
        }
    }

    async fn generate(
        &self,
        request_id: RequestId,
        model: String,
        prompt: String,
        sink: &mut (dyn Sink + Send),
    ) {
        let abort_notify = self.register(&request_id).await;

        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": true,
        });

        let send_fut = self.client.post(&url).json(&body).send();
        let response = tokio::select! {
            () = abort_notify.notified() => {
                self.unregister(&request_id).await;
                return;
            }
            result = send_fut => result,
        };

        let response = match response {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
                sink.on_error(
                    ErrorCode::OllamaModelNotAvailable,
                    format!("model '{model}' is not available"),
                )
                .await;
                self.unregister(&request_id).await;
                return;
            }
            Ok(resp) => {
                sink.on_error(
                    ErrorCode::GenerationFailed,
                    format!("upstream returned {}", resp.status()),
                )
                .await;
                self.unregister(&request_id).await;
                return;
            }
            Err(e) => {
                let code = if e.is_connect() {
                    ErrorCode::OllamaNotFound
                } else {
                    ErrorCode::GenerationFailed
                };
                sink.on_error(code, e.to_string()).await;
                self.unregister(&request_id).await;
                return;
            }
        };

        let mut byte_stream = response.bytes_stream();
        let mut line_buf: Vec<u8> = Vec::new();
        let mut idle_deadline = Instant::now() + CHUNK_IDLE_TIMEOUT;

        loop {
            tokio::select! {
                () = abort_notify.notified() => {
                    self.unregister(&request_id).await;
                    return;
                }
                () = tokio::time::sleep_until(idle_deadline) => {
                    sink.on_error(ErrorCode::TimeoutNoResponse, "no data from model".to_owned()).await;
                    self.unregister(&request_id).await;
                    return;
                }
                next = byte_stream.next() => {
                    // Any byte read, even a non-delta keepalive, resets the
                    // idle timer per spec §4.3.
                    idle_deadline = Instant::now() + CHUNK_IDLE_TIMEOUT;
                    match next {
                        None => {
                            sink.on_error(
                                ErrorCode::GenerationFailed,
                                "stream ended without a final done=true line".to_owned(),
                            )
                            .await;
                            self.unregister(&request_id).await;
                            return;
                        }
                        Some(Err(e)) => {
                            sink.on_error(ErrorCode::GenerationFailed, e.to_string()).await;
                            self.unregister(&request_id).await;
                            return;
                        }
                        Some(Ok(bytes)) => {
                            line_buf.extend_from_slice(&bytes);
                            while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
                                let line: Vec<u8> = line_buf.drain(..=pos).collect();
                                let line = &line[..line.len() - 1];
                                if line.is_empty() {
                                    continue;
                                }
                                match serde_json::from_slice::<GenerateLine>(line) {
                                    Ok(parsed) => {
                                        if let Some(message) = parsed.error {
                                            sink.on_error(ErrorCode::GenerationFailed, message).await;
                                            self.unregister(&request_id).await;
                                            return;
                                        }
                                        if !parsed.response.is_empty() {
                                            sink.on_chunk(parsed.response).await;
                                        }
                                        if parsed.done {
                                            sink.on_end().await;
                                            self.unregister(&request_id).await;
                                            return;
                                        }
                                    }
                                    Err(_) => {
                                        // Malformed NDJSON line: skip, mirroring the
                                        // codec's framing-only discard policy.
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    async fn abort(&self, request_id: &str) -> bool {
        let signal = self.inflight.lock().await.remove(request_id);
        match signal {
            Some(notify) => {
                notify.notify_one();
                true
            }
            None => false,
        }
    }
}
