//! Detection notifications produced by the backend

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of a backend notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionKind {
    /// Motion detected in the frame
    Motion,
    /// Hand gesture recognised
    Gesture,
    /// Keep-alive sent by the event stream
    Heartbeat,
    /// Anything else the backend chooses to send
    Other(String),
}

impl DetectionKind {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "motion" => DetectionKind::Motion,
            "gesture" => DetectionKind::Gesture,
            "heartbeat" => DetectionKind::Heartbeat,
            other => DetectionKind::Other(other.to_string()),
        }
    }
}

/// A single detection event as sent by the backend
///
/// The same shape is used by the event stream, the upload response and the
/// signaling `detection_results` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Event tag (`motion`, `gesture`, ...)
    #[serde(rename = "type", default)]
    pub tag: String,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Detector confidence, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl DetectionEvent {
    /// Create an event with only a tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            meta: None,
            confidence: None,
        }
    }

    /// Attach a `meta.status` value
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.meta = Some(serde_json::json!({ "status": status.into() }));
        self
    }

    /// Classify the event
    pub fn kind(&self) -> DetectionKind {
        DetectionKind::from_tag(&self.tag)
    }

    /// `meta.status`, if present and a string
    pub fn status(&self) -> Option<&str> {
        self.meta.as_ref()?.get("status")?.as_str()
    }

    /// Activity log text for motion and gesture events
    ///
    /// Returns `None` for heartbeats and unknown tags, which are not shown.
    pub fn log_text(&self) -> Option<String> {
        match self.kind() {
            DetectionKind::Gesture => {
                Some(format!("Gesture: {}", self.status().unwrap_or("detected")))
            }
            DetectionKind::Motion => Some("Motion Detected".to_string()),
            DetectionKind::Heartbeat | DetectionKind::Other(_) => None,
        }
    }
}

/// Body returned by `POST /api/detect`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectResponse {
    /// Events found in the uploaded frame
    #[serde(default)]
    pub events: Vec<DetectionEvent>,
}

impl DetectResponse {
    /// Log text for each event of an upload batch, in order
    pub fn log_lines(&self) -> Vec<String> {
        self.events
            .iter()
            .map(|event| {
                let tag = if event.tag.is_empty() {
                    "event"
                } else {
                    event.tag.as_str()
                };
                format!("{} detected", tag)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gesture_text_uses_status() {
        let event: DetectionEvent =
            serde_json::from_str(r#"{"type":"gesture","meta":{"status":"thumbs_up"}}"#).unwrap();
        assert_eq!(event.kind(), DetectionKind::Gesture);
        assert_eq!(event.log_text().as_deref(), Some("Gesture: thumbs_up"));
    }

    #[test]
    fn test_gesture_without_meta_falls_back() {
        let event = DetectionEvent::new("gesture");
        assert_eq!(event.log_text().as_deref(), Some("Gesture: detected"));
    }

    #[test]
    fn test_motion_and_heartbeat() {
        let motion: DetectionEvent =
            serde_json::from_str(r#"{"type":"motion","confidence":0.82}"#).unwrap();
        assert_eq!(motion.log_text().as_deref(), Some("Motion Detected"));
        assert_eq!(motion.confidence, Some(0.82));

        let heartbeat: DetectionEvent =
            serde_json::from_str(r#"{"type":"heartbeat","ts":1700000000.5}"#).unwrap();
        assert_eq!(heartbeat.kind(), DetectionKind::Heartbeat);
        assert!(heartbeat.log_text().is_none());
    }

    #[test]
    fn test_detect_response_log_lines() {
        let empty: DetectResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.log_lines().is_empty());

        let batch: DetectResponse =
            serde_json::from_str(r#"{"events":[{"type":"motion"},{"type":"gesture"}]}"#).unwrap();
        assert_eq!(batch.log_lines(), vec!["motion detected", "gesture detected"]);

        let untagged: DetectResponse = serde_json::from_str(r#"{"events":[{}]}"#).unwrap();
        assert_eq!(untagged.log_lines(), vec!["event detected"]);
    }
}
