//! HTTP chunked stream transport
//!
//! Opens one POST connection per session attempt and consumes the response
//! body as SSE-style `data:` lines. Cancellation notifies the backend on a
//! side channel while the main stream keeps draining, so a completion racing
//! the cancel still gets through.

use crate::error::TransportError;
use crate::r#trait::{EventStream, StreamEvent, StreamTransport};
use crate::wire::parse_sse_line;
use futures::StreamExt;
use relay_foundation::{AttemptId, RelayConfig, StartRequest};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// HTTP transport speaking the backend's stream endpoints
pub struct HttpStreamTransport {
    client: Client,
    base_url: String,
    connect_timeout: Duration,
    cancel_grace: Duration,
}

impl HttpStreamTransport {
    /// Create a transport from the application config
    pub fn new(config: &RelayConfig) -> Self {
        Self::with_base_url(
            &config.backend.base_url,
            config.stream.connect_timeout(),
            config.stream.cancel_grace(),
        )
    }

    /// Create a transport against an explicit base URL
    pub fn with_base_url(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        cancel_grace: Duration,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            connect_timeout,
            cancel_grace,
        }
    }

    fn stream_url(&self) -> String {
        format!("{}/api/streams", self.base_url)
    }

    fn cancel_url(&self, attempt: AttemptId) -> String {
        format!("{}/api/streams/{}/cancel", self.base_url, attempt.0)
    }
}

/// Request body for opening a stream
#[derive(Debug, Serialize)]
struct StreamOpenPayload<'a> {
    attempt_id: AttemptId,
    #[serde(flatten)]
    request: &'a StartRequest,
}

impl StreamTransport for HttpStreamTransport {
    fn open(
        &self,
        request: StartRequest,
        attempt: AttemptId,
        cancel: CancellationToken,
    ) -> EventStream {
        let client = self.client.clone();
        let stream_url = self.stream_url();
        let cancel_url = self.cancel_url(attempt);
        let connect_timeout = self.connect_timeout;
        let cancel_grace = self.cancel_grace;

        Box::pin(async_stream::stream! {
            let payload = StreamOpenPayload {
                attempt_id: attempt,
                request: &request,
            };

            // Open the connection
            let send = client.post(&stream_url).json(&payload).send();
            let response = match timeout(connect_timeout, send).await {
                Err(_) => {
                    yield StreamEvent::Error(TransportError::Connect(format!(
                        "connect timed out after {:?}",
                        connect_timeout
                    )));
                    return;
                }
                Ok(Err(e)) => {
                    yield StreamEvent::Error(TransportError::Connect(e.to_string()));
                    return;
                }
                Ok(Ok(response)) => response,
            };

            let status = response.status().as_u16();
            if status != 200 {
                let body = response.text().await.unwrap_or_default();
                yield StreamEvent::Error(TransportError::from_http_status(status, &body));
                return;
            }

            debug!(attempt = %attempt, "Stream connection open");

            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            // Set once cancellation has been requested; the stream then only
            // drains until this deadline.
            let mut ack_deadline: Option<Instant> = None;

            loop {
                let next_chunk = if let Some(deadline) = ack_deadline {
                    match timeout_at(deadline, byte_stream.next()).await {
                        Ok(chunk) => chunk,
                        Err(_) => {
                            yield StreamEvent::Error(TransportError::CancelTimeout(cancel_grace));
                            return;
                        }
                    }
                } else {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            ack_deadline = Some(Instant::now() + cancel_grace);

                            // Best-effort backend cancel on a side channel
                            let cancel_client = client.clone();
                            let url = cancel_url.clone();
                            tokio::spawn(async move {
                                if let Err(e) = cancel_client.post(&url).send().await {
                                    warn!(error = %e, "Cancel request failed");
                                }
                            });
                            continue;
                        }
                        chunk = byte_stream.next() => chunk,
                    }
                };

                let chunk = match next_chunk {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        yield StreamEvent::Error(TransportError::Dropped(e.to_string()));
                        return;
                    }
                    None => {
                        yield StreamEvent::Error(TransportError::Dropped(
                            "stream closed before completion".to_string(),
                        ));
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Process complete lines
                while let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].trim().to_string();
                    buffer = buffer[newline_pos + 1..].to_string();

                    if line.is_empty() {
                        continue;
                    }

                    if let Some(wire_event) = parse_sse_line(&line) {
                        let event = StreamEvent::from(wire_event);
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            return;
                        }
                    }
                }
            }
        })
    }
}
