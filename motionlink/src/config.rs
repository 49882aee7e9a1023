//! Configuration types and defaults

use motionlink_core::MotionLinkError;
use motionlink_media::{MediaConstraints, VideoResolution};
use motionlink_signaling::ReconnectPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Smallest accepted activity log capacity
pub const MIN_LOG_CAPACITY: usize = 20;
/// Largest accepted activity log capacity
pub const MAX_LOG_CAPACITY: usize = 50;

/// How live mode obtains and delivers video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Backend captures; the client displays its MJPEG feed
    ServerFeed,
    /// Local camera, periodic JPEG upload
    Polling,
    /// Local camera, continuous peer connection
    Peer,
}

impl Strategy {
    /// Whether the strategy opens the local camera
    pub fn uses_camera(&self) -> bool {
        !matches!(self, Strategy::ServerFeed)
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ServerFeed => "server_feed",
            Strategy::Polling => "polling",
            Strategy::Peer => "peer",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Detection backend base URL
    pub backend_url: String,
    /// Signaling WebSocket URL
    pub signaling_url: String,
    /// Live-mode strategy
    pub strategy: Strategy,
    /// Open the event stream while live
    pub subscribe_events: bool,
    /// Polling period in milliseconds
    pub frame_interval_ms: u64,
    /// JPEG quality for uploaded frames (1-100)
    pub jpeg_quality: u8,
    /// Resize uploaded frames to this size; native size when unset
    pub target_resolution: Option<VideoResolution>,
    /// Camera index
    pub camera_index: u32,
    /// Ideal capture size for the peer strategy
    pub peer_resolution: VideoResolution,
    /// Ideal capture rate for the peer strategy
    pub peer_frame_rate: u32,
    /// Activity log capacity (20-50)
    pub log_capacity: usize,
    /// Delay before reopening a failed event stream, 0 disables
    pub event_stream_retry_ms: u64,
    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Signaling redial attempts
    pub signaling_reconnect_attempts: u32,
    /// Signaling redial delay in milliseconds
    pub signaling_reconnect_delay_ms: u64,
    /// Signaling connect timeout in milliseconds
    pub signaling_connect_timeout_ms: u64,
    /// STUN/TURN server URLs for the peer connection
    pub ice_servers: Vec<String>,
    /// Detector selected at start
    pub initial_detection_mode: String,
    /// Monitoring enabled at start
    pub monitoring: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".to_string(),
            signaling_url: "ws://127.0.0.1:5000/signaling".to_string(),
            strategy: Strategy::Polling,
            subscribe_events: true,
            frame_interval_ms: 250,
            jpeg_quality: 70,
            target_resolution: None,
            camera_index: 0,
            peer_resolution: VideoResolution::QVGA,
            peer_frame_rate: 15,
            log_capacity: MAX_LOG_CAPACITY,
            event_stream_retry_ms: 3000,
            request_timeout_ms: 10_000,
            signaling_reconnect_attempts: 5,
            signaling_reconnect_delay_ms: 1000,
            signaling_connect_timeout_ms: 20_000,
            ice_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            initial_detection_mode: "gesture".to_string(),
            monitoring: true,
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> MotionLinkError {
    MotionLinkError::Configuration {
        field: field.to_string(),
        reason: reason.into(),
    }
}

impl ClientConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, MotionLinkError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| invalid("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and URL schemes
    pub fn validate(&self) -> Result<(), MotionLinkError> {
        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            return Err(invalid("backend_url", "must be an http(s) URL"));
        }
        if self.strategy == Strategy::Peer
            && !(self.signaling_url.starts_with("ws://")
                || self.signaling_url.starts_with("wss://"))
        {
            return Err(invalid("signaling_url", "must be a ws(s) URL"));
        }
        if self.frame_interval_ms == 0 {
            return Err(invalid("frame_interval_ms", "must be greater than zero"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(invalid("jpeg_quality", "must be between 1 and 100"));
        }
        if !(MIN_LOG_CAPACITY..=MAX_LOG_CAPACITY).contains(&self.log_capacity) {
            return Err(invalid(
                "log_capacity",
                format!("must be between {} and {}", MIN_LOG_CAPACITY, MAX_LOG_CAPACITY),
            ));
        }
        if let Some(target) = self.target_resolution {
            if !target.is_valid() {
                return Err(invalid("target_resolution", "dimensions must be non-zero"));
            }
        }
        if !self.peer_resolution.is_valid() || self.peer_frame_rate == 0 {
            return Err(invalid("peer_resolution", "size and frame rate must be non-zero"));
        }
        if self.initial_detection_mode.trim().is_empty() {
            return Err(invalid("initial_detection_mode", "must not be empty"));
        }
        Ok(())
    }

    /// Polling period
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// HTTP request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Event stream retry delay, `None` when disabled
    pub fn event_stream_retry(&self) -> Option<Duration> {
        (self.event_stream_retry_ms > 0).then(|| Duration::from_millis(self.event_stream_retry_ms))
    }

    /// Signaling reconnect settings
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.signaling_reconnect_attempts,
            delay: Duration::from_millis(self.signaling_reconnect_delay_ms),
            connect_timeout: Duration::from_millis(self.signaling_connect_timeout_ms),
        }
    }

    /// Camera constraints for the configured strategy
    pub fn camera_constraints(&self) -> MediaConstraints {
        match self.strategy {
            Strategy::Peer => MediaConstraints {
                device_index: self.camera_index,
                ideal_resolution: Some(self.peer_resolution),
                ideal_frame_rate: Some(self.peer_frame_rate),
            },
            _ => MediaConstraints {
                device_index: self.camera_index,
                ..MediaConstraints::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_interval(), Duration::from_millis(250));
        assert_eq!(config.event_stream_retry(), Some(Duration::from_secs(3)));
        assert_eq!(config.reconnect_policy(), ReconnectPolicy::default());
    }

    #[test]
    fn test_partial_json() {
        let config = ClientConfig::from_json(
            r#"{"strategy": "peer", "log_capacity": 20, "target_resolution": {"width": 640, "height": 480}}"#,
        )
        .unwrap();
        assert_eq!(config.strategy, Strategy::Peer);
        assert_eq!(config.log_capacity, 20);
        assert_eq!(config.target_resolution, Some(VideoResolution::VGA));
        assert_eq!(config.jpeg_quality, 70);

        let constraints = config.camera_constraints();
        assert_eq!(constraints.ideal_resolution, Some(VideoResolution::QVGA));
        assert_eq!(constraints.ideal_frame_rate, Some(15));
    }

    #[test]
    fn test_log_capacity_range() {
        let result = ClientConfig::from_json(r#"{"log_capacity": 100}"#);
        match result {
            Err(MotionLinkError::Configuration { field, .. }) => assert_eq!(field, "log_capacity"),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        assert!(ClientConfig::from_json(r#"{"strategy": "carrier_pigeon"}"#).is_err());
    }

    #[test]
    fn test_zero_retry_disables_resubscribe() {
        let config = ClientConfig {
            event_stream_retry_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.event_stream_retry(), None);
    }
}
