//! Signaling client
//!
//! A persistent WebSocket to the backend that survives drops: after a
//! disconnect it redials with a fixed delay, up to a bounded number of
//! attempts. Outbound messages are queued in order and flushed as soon as a
//! connection is up.

use crate::error::{SignalingError, SignalingResult};
use crate::protocol::{ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Reconnection behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Redial attempts after a failure before giving up
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
    /// Limit for a single connect handshake
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_millis(20_000),
        }
    }
}

/// Notifications emitted by [`SignalingClient`]
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// A connection is up (emitted again after every reconnect)
    Connected,
    /// The connection dropped; a reconnect will follow unless closed
    Disconnected {
        /// Close reason or transport error
        reason: String,
    },
    /// A decoded backend message
    Message(ServerMessage),
    /// All reconnect attempts failed; the client is now closed
    GaveUp {
        /// Failed attempts in the last round
        attempts: u32,
    },
}

/// Outbound half of a signaling channel
pub trait SignalingChannel: Send + Sync + std::fmt::Debug {
    /// Queue a message for delivery
    fn send(&self, message: ClientMessage) -> SignalingResult<()>;

    /// Whether a connection is currently up
    fn is_connected(&self) -> bool;
}

/// WebSocket signaling client
#[derive(Debug)]
pub struct SignalingClient {
    url: String,
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

enum SessionEnd {
    Dropped(String),
    Closed,
}

impl SignalingClient {
    /// Start connecting in the background
    pub fn connect(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        events: mpsc::UnboundedSender<SignalingEvent>,
    ) -> Self {
        let url = url.into();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run(
            url.clone(),
            policy,
            outbound_rx,
            events,
            connected.clone(),
        ));

        Self {
            url,
            outbound,
            connected,
            closed: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
        }
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the background task is still running
    pub fn is_open(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Drop the connection and stop reconnecting
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
            self.connected.store(false, Ordering::SeqCst);
            info!(url = %self.url, "signaling client closed");
        }
    }
}

impl SignalingChannel for SignalingClient {
    fn send(&self, message: ClientMessage) -> SignalingResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SignalingError::Closed);
        }
        let event = message.event_name();
        let text = serde_json::to_string(&message).map_err(|source| {
            SignalingError::Serialization {
                event: event.to_string(),
                source,
            }
        })?;
        self.outbound
            .send(text)
            .map_err(|_| SignalingError::Closed)?;
        debug!(event, "signaling message queued");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run(
    url: String,
    policy: ReconnectPolicy,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SignalingEvent>,
    connected: Arc<AtomicBool>,
) {
    let mut failures = 0u32;

    loop {
        match tokio::time::timeout(policy.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((ws, _response))) => {
                failures = 0;
                connected.store(true, Ordering::SeqCst);
                info!(url = %url, "signaling connected");
                if events.send(SignalingEvent::Connected).is_err() {
                    return;
                }

                let end = session(ws, &mut outbound, &events).await;
                connected.store(false, Ordering::SeqCst);
                match end {
                    SessionEnd::Closed => return,
                    SessionEnd::Dropped(reason) => {
                        warn!(url = %url, reason = %reason, "signaling disconnected");
                        if events
                            .send(SignalingEvent::Disconnected { reason })
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            }
            Ok(Err(e)) => {
                failures += 1;
                warn!(url = %url, attempt = failures, error = %e, "signaling connect failed");
            }
            Err(_) => {
                failures += 1;
                warn!(
                    url = %url,
                    attempt = failures,
                    timeout_ms = policy.connect_timeout.as_millis() as u64,
                    "signaling connect timed out"
                );
            }
        }

        if failures > policy.max_attempts {
            warn!(url = %url, attempts = failures, "signaling gave up reconnecting");
            let _ = events.send(SignalingEvent::GaveUp { attempts: failures });
            return;
        }
        tokio::time::sleep(policy.delay).await;
    }
}

async fn session<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    events: &mpsc::UnboundedSender<SignalingEvent>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        return SessionEnd::Dropped(e.to_string());
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return SessionEnd::Closed;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => {
                        if events.send(SignalingEvent::Message(message)).is_err() {
                            let _ = sink.close().await;
                            return SessionEnd::Closed;
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping malformed signaling message"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string());
                    return SessionEnd::Dropped(reason);
                }
                Some(Ok(_)) => {
                    // Binary, ping and pong frames carry nothing for us
                }
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                None => return SessionEnd::Dropped("stream ended".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(1));
        assert_eq!(policy.connect_timeout, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = SignalingClient::connect("ws://127.0.0.1:9/", ReconnectPolicy::default(), tx);
        client.close();

        let result = client.send(ClientMessage::ClearCanvas);
        assert!(matches!(result, Err(SignalingError::Closed)));
        assert!(!client.is_open());
        assert!(!client.is_connected());
    }
}
