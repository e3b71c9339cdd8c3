//! Push channel client
//!
//! Holds an SSE connection to `GET /events`, decodes `WorkflowEvent` frames
//! into [`Update::Event`] and reconnects with capped exponential backoff.
//! While disconnected the poller alone keeps the view correct, so connection
//! trouble is logged, never surfaced to the operator.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use presswork_common::events::{NotificationEvent, PushMessage};
use presswork_common::models::Department;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{TerminalError, TerminalResult};
use crate::view::{Reconciler, Update};

/// One dispatched SSE message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` decoder
///
/// Chunks may split lines and frames anywhere; complete frames come out as
/// soon as their terminating blank line arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line_buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; multi-byte characters may straddle chunks
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.line_buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(newline) = self.line_buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.line_buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    frames.push(SseFrame {
                        event: self.event.take(),
                        data: self.data.join("\n"),
                    });
                }
                self.event = None;
                self.data.clear();
                continue;
            }

            // Comment (heartbeat)
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        frames
    }
}

/// Workflow event carried by a frame, if any
///
/// Frames of other types and messages this terminal does not understand
/// (e.g. an event kind from a newer server) are logged and skipped.
pub fn decode_frame(frame: &SseFrame) -> Option<NotificationEvent> {
    match frame.event.as_deref() {
        Some("WorkflowEvent") => match serde_json::from_str::<PushMessage>(&frame.data) {
            Ok(message) => Some(message.into_event()),
            Err(e) => {
                warn!(error = %e, data = %frame.data, "Ignoring unrecognised push message");
                None
            }
        },
        Some("ConnectionStatus") => {
            debug!(data = %frame.data, "Push channel connected");
            None
        }
        other => {
            debug!(event = ?other, "Ignoring push frame");
            None
        }
    }
}

/// Capped exponential reconnect delay
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// Long-lived SSE subscriber for one department session
pub struct PushClient {
    http: reqwest::Client,
    base_url: String,
    department: Department,
    /// Stable across reconnects so the server replaces the old session
    session_id: Uuid,
    backoff: Backoff,
}

impl PushClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, department: Department) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            department,
            session_id: Uuid::new_v4(),
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Stay subscribed until `shutdown` resolves
    pub async fn run(mut self, reconciler: Reconciler, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        loop {
            let outcome = tokio::select! {
                _ = &mut shutdown => break,
                outcome = self.stream_once(&reconciler) => outcome,
            };

            match outcome {
                Ok(()) => info!(session_id = %self.session_id, "Push channel closed by server"),
                Err(e) => warn!(session_id = %self.session_id, error = %e, "Push channel lost"),
            }

            let delay = self.backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "Reconnecting push channel");
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(session_id = %self.session_id, "Push client stopped");
    }

    /// One connection: subscribe, then apply events until the stream ends
    async fn stream_once(&mut self, reconciler: &Reconciler) -> TerminalResult<()> {
        let url = format!("{}/events", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("department", self.department.as_str().to_string()),
                ("sessionId", self.session_id.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TerminalError::Server {
                status: status.as_u16(),
                code: "PUSH_REJECTED".to_string(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        info!(session_id = %self.session_id, department = %self.department, "Push channel connected");
        self.backoff.reset();
        // Events published while disconnected are gone; catch up from the store
        reconciler.request_refresh();

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for frame in decoder.push(&chunk) {
                if let Some(event) = decode_frame(&frame) {
                    let applied = reconciler.apply(Update::Event(event)).await;
                    debug!(?applied, "Push event applied");
                }
            }
        }

        Ok(())
    }
}
