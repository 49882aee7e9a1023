//! Server-sent event stream client
//!
//! Subscribes to the backend's `/events` channel and forwards decoded
//! detection notifications. A malformed message is dropped and logged; the
//! subscription itself only ends on transport failure, after which it is
//! reopened after a fixed delay for as long as the subscription handle is
//! alive.

use crate::detection::DetectionEvent;
use crate::error::{MotionLinkError, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connection status of the event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// No subscription
    Disconnected,
    /// Request sent, waiting for the response head
    Connecting,
    /// Receiving messages
    Connected,
    /// Transport failed; a retry may follow
    Error,
}

/// Updates delivered to the subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    /// Connection status changed
    Status(StreamStatus),
    /// A detection notification arrived
    Detection(DetectionEvent),
}

/// One dispatched server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseMessage {
    /// `event:` field, `None` for the default `message` type
    pub event: Option<String>,
    /// Concatenated `data:` lines
    pub data: String,
}

/// Incremental `text/event-stream` decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every message completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);

        // Only complete lines are decoded, so a character split across
        // chunks stays intact.
        let mut messages = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(message) = self.process_line(line) {
                messages.push(message);
            }
        }
        messages
    }

    fn process_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            if self.data.is_empty() {
                self.event = None;
                return None;
            }
            return Some(SseMessage {
                event: self.event.take(),
                data: std::mem::take(&mut self.data).join("\n"),
            });
        }

        if line.starts_with(':') {
            return None;
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
        None
    }
}

/// Decode a message into a detection notification
///
/// Named events other than `message` (the backend's `hello`) yield `Ok(None)`.
pub fn decode_notification(message: &SseMessage) -> Result<Option<DetectionEvent>> {
    if matches!(message.event.as_deref(), Some(name) if name != "message") {
        return Ok(None);
    }

    let value: serde_json::Value =
        serde_json::from_str(&message.data).map_err(|e| MotionLinkError::InvalidPayload {
            reason: format!("event stream JSON: {}", e),
        })?;
    if !value.is_object() {
        return Err(MotionLinkError::InvalidPayload {
            reason: "event stream message is not an object".to_string(),
        });
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| MotionLinkError::InvalidPayload {
            reason: format!("event stream message: {}", e),
        })
}

/// Forward decoded notifications from a byte stream until it ends
///
/// Returns `Ok(true)` when the byte stream finished, `Ok(false)` when the
/// subscriber went away, and an error when the transport failed.
pub async fn pump_stream<S, E>(
    stream: S,
    decoder: &mut SseDecoder,
    updates: &mpsc::UnboundedSender<StreamUpdate>,
) -> Result<bool>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Display,
{
    futures::pin_mut!(stream);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| MotionLinkError::EventStream {
            reason: e.to_string(),
        })?;

        for message in decoder.push(&chunk) {
            match decode_notification(&message) {
                Ok(Some(event)) => {
                    if updates.send(StreamUpdate::Detection(event)).is_err() {
                        return Ok(false);
                    }
                }
                Ok(None) => debug!(event = ?message.event, "ignoring named event"),
                Err(e) => warn!(error = %e, data = %message.data, "dropping malformed event"),
            }
        }
    }

    Ok(true)
}

/// Client for the backend event stream
#[derive(Debug, Clone)]
pub struct EventStreamClient {
    client: reqwest::Client,
    url: String,
    retry_delay: Option<Duration>,
}

impl EventStreamClient {
    /// Create a client for `url` that reopens the stream after `retry_delay`
    ///
    /// `None` disables resubscription.
    pub fn new(url: impl Into<String>, retry_delay: Option<Duration>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MotionLinkError::Configuration {
                field: "backend_url".to_string(),
                reason: format!("Failed to build event stream client: {}", e),
            })?;
        Ok(Self {
            client,
            url: url.into(),
            retry_delay,
        })
    }

    /// Stream URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the subscription
    ///
    /// Updates are delivered on `updates`. Dropping or closing the returned
    /// handle ends the subscription and cancels any pending retry.
    pub fn subscribe(&self, updates: mpsc::UnboundedSender<StreamUpdate>) -> EventSubscription {
        let client = self.clone();
        let task = tokio::spawn(async move { client.run(updates).await });
        EventSubscription { task: Some(task) }
    }

    async fn run(self, updates: mpsc::UnboundedSender<StreamUpdate>) {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if updates
                .send(StreamUpdate::Status(StreamStatus::Connecting))
                .is_err()
            {
                return;
            }
            info!(url = %self.url, attempt, "opening event stream");

            match self.open_once(&updates).await {
                Ok(false) => return,
                Ok(true) => warn!(url = %self.url, "event stream ended"),
                Err(e) => warn!(url = %self.url, error = %e, "event stream failed"),
            }

            if updates
                .send(StreamUpdate::Status(StreamStatus::Error))
                .is_err()
            {
                return;
            }

            match self.retry_delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return,
            }
        }
    }

    async fn open_once(&self, updates: &mpsc::UnboundedSender<StreamUpdate>) -> Result<bool> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| MotionLinkError::http(crate::backend::EVENTS_PATH, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MotionLinkError::BackendRejected {
                endpoint: crate::backend::EVENTS_PATH.to_string(),
                status: status.as_u16(),
                body: String::new(),
            });
        }

        if updates
            .send(StreamUpdate::Status(StreamStatus::Connected))
            .is_err()
        {
            return Ok(false);
        }

        let mut decoder = SseDecoder::new();
        pump_stream(response.bytes_stream(), &mut decoder, updates).await
    }
}

/// Handle to an open event stream subscription
#[derive(Debug)]
pub struct EventSubscription {
    task: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Whether the background task is still running
    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Close the subscription and cancel any pending resubscription
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("event stream subscription closed");
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.close();
    }
}
