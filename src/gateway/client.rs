use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::auth::Authenticator;
use super::sse::{data_payload, decode_event, LineBuffer};
use super::types::{Generation, GenerationRequest, MessagesRequest, MessagesResponse, StreamChunk};
use crate::cache::ExpiringStore;
use crate::config::{GatewayConfig, RequestConfig};
use crate::error::{GatewayError, GatewayResult};

/// Buffered chunks between the reader task and the consumer.
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Receiving half of a streamed generation.
pub type ChunkReceiver = mpsc::Receiver<GatewayResult<StreamChunk>>;

/// Client for the upstream messages API
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    model: String,
    api_version: String,
    auth: Authenticator,
    request_config: RequestConfig,
}

impl GatewayClient {
    /// Create a new gateway client
    pub fn new(
        config: &GatewayConfig,
        request_config: RequestConfig,
        cache: Arc<dyn ExpiringStore>,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(GatewayError::Http)?;

        let auth = Authenticator::new(config.auth.clone(), client.clone(), cache);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_version: config.api_version.clone(),
            auth,
            request_config,
        })
    }

    /// Generate a complete response, retrying transient failures.
    pub async fn complete(&self, request: GenerationRequest) -> GatewayResult<Generation> {
        let body = request.to_wire(&self.model, false);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    model = %self.model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying gateway request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&body).await {
                Ok(response) => {
                    let latency = start.elapsed();
                    info!(
                        model = %self.model,
                        latency_ms = latency.as_millis(),
                        "Gateway generation succeeded"
                    );
                    return Ok(Generation {
                        text: response.text(),
                        stop_reason: response.stop_reason,
                        usage: response.usage,
                    });
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        model = %self.model,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "Gateway generation failed"
                    );
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(GatewayError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Start a streamed generation.
    ///
    /// Connection and status failures are returned directly. Once the
    /// upstream accepts, every later outcome arrives through the receiver,
    /// which yields exactly one terminal item: `Ok(Done)` or an `Err`.
    /// Streams are never retried.
    pub async fn stream(&self, request: GenerationRequest) -> GatewayResult<ChunkReceiver> {
        let body = request.to_wire(&self.model, true);
        debug!(
            model = %self.model,
            messages = body.messages.len(),
            "Opening gateway stream"
        );

        let response = self.send_authorized(&body).await?;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let timeout_ms = self.request_config.timeout_ms;

        tokio::spawn(async move {
            let start = Instant::now();
            let mut bytes = response.bytes_stream();
            let mut lines = LineBuffer::new();

            while let Some(item) = bytes.next().await {
                match item {
                    Ok(chunk) => {
                        for line in lines.push(&chunk) {
                            if forward_line(&line, &tx).await.is_break() {
                                debug!(
                                    latency_ms = start.elapsed().as_millis(),
                                    "Gateway stream finished"
                                );
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Gateway stream interrupted");
                        let _ = tx.send(Err(transport_error(e, timeout_ms))).await;
                        return;
                    }
                }
            }

            if let Some(line) = lines.finish() {
                if forward_line(&line, &tx).await.is_break() {
                    return;
                }
            }

            warn!("Gateway stream ended without message_stop");
            let _ = tx
                .send(Err(GatewayError::InvalidResponse {
                    message: "Stream ended before completion".to_string(),
                }))
                .await;
        });

        Ok(rx)
    }

    /// Execute a single atomic request (internal)
    async fn execute_request(&self, body: &MessagesRequest) -> GatewayResult<MessagesResponse> {
        debug!(
            model = %self.model,
            messages = body.messages.len(),
            max_tokens = body.max_tokens,
            "Calling gateway"
        );

        let response = self.send_authorized(body).await?;

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| GatewayError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Send with credentials. A rejected token is renewed and the request
    /// replayed once.
    async fn send_authorized(&self, body: &MessagesRequest) -> GatewayResult<Response> {
        let url = format!("{}/v1/messages", self.base_url);
        let mut reauthorized = false;

        loop {
            let credential = self.auth.header().await?;

            let response = self
                .client
                .post(&url)
                .header(credential.name, &credential.value)
                .header("anthropic-version", &self.api_version)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await
                .map_err(|e| transport_error(e, self.request_config.timeout_ms))?;

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if self.auth.is_token_based() && !reauthorized {
                    warn!("Gateway rejected access token, refreshing");
                    self.auth.invalidate().await;
                    reauthorized = true;
                    continue;
                }
                let error_body = response.text().await.unwrap_or_default();
                return Err(GatewayError::AuthExpired {
                    message: error_body,
                });
            }

            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                return Err(GatewayError::Api {
                    status: status.as_u16(),
                    message: error_body,
                });
            }

            return Ok(response);
        }
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Model every request is sent to.
    pub fn model(&self) -> &str {
        &self.model
    }
}

fn transport_error(e: reqwest::Error, timeout_ms: u64) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout { timeout_ms }
    } else {
        GatewayError::Http(e)
    }
}

/// Decode one SSE line and hand its chunk to the consumer. Breaks once a
/// terminal item was sent or the consumer went away.
async fn forward_line(
    line: &str,
    tx: &mpsc::Sender<GatewayResult<StreamChunk>>,
) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow;

    let Some(data) = data_payload(line) else {
        return ControlFlow::Continue(());
    };

    match decode_event(data) {
        Ok(Some(StreamChunk::Delta(text))) => {
            if tx.send(Ok(StreamChunk::Delta(text))).await.is_err() {
                debug!("Stream consumer dropped");
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }
        Ok(Some(StreamChunk::Done)) => {
            let _ = tx.send(Ok(StreamChunk::Done)).await;
            ControlFlow::Break(())
        }
        Ok(None) => ControlFlow::Continue(()),
        Err(e) => {
            warn!(error = %e, "Gateway stream error event");
            let _ = tx.send(Err(e)).await;
            ControlFlow::Break(())
        }
    }
}
