//! Signaling protocol messages
//!
//! Every frame on the channel is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`. Control messages without a
//! payload omit `data`.

use motionlink_core::DetectionEvent;
use serde::{Deserialize, Serialize};

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Local offer
    Offer,
    /// Remote answer
    Answer,
    /// Provisional answer
    Pranswer,
    /// Rollback to the last stable state
    Rollback,
}

/// Session description exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// SDP body
    pub sdp: String,
    /// Offer or answer
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    /// Wrap an offer SDP
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
        }
    }

    /// Wrap an answer SDP
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Answer,
        }
    }
}

/// Connectivity candidate in its JSON (browser) form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Media line index
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    /// ICE username fragment
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Candidate for the first media section
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }
}

/// Messages sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Local session offer
    #[serde(rename = "offer")]
    Offer(SessionDescription),
    /// Local session answer
    #[serde(rename = "answer")]
    Answer(SessionDescription),
    /// Local connectivity candidate
    #[serde(rename = "ice-candidate")]
    IceCandidate(IceCandidate),
    /// Switch the backend detector
    #[serde(rename = "mode_change")]
    ModeChange {
        /// Detector name
        mode: String,
    },
    /// Clear the backend drawing canvas
    #[serde(rename = "clear_canvas")]
    ClearCanvas,
}

impl ClientMessage {
    /// Wire name of the message
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::Offer(_) => "offer",
            ClientMessage::Answer(_) => "answer",
            ClientMessage::IceCandidate(_) => "ice-candidate",
            ClientMessage::ModeChange { .. } => "mode_change",
            ClientMessage::ClearCanvas => "clear_canvas",
        }
    }
}

/// Messages pushed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Remote answer to our offer
    #[serde(rename = "answer")]
    Answer(SessionDescription),
    /// Remote connectivity candidate
    #[serde(rename = "ice-candidate")]
    IceCandidate(IceCandidate),
    /// Batch of detections from the peer stream
    #[serde(rename = "detection_results")]
    DetectionResults(Vec<DetectionEvent>),
    /// Backend confirmed a detector switch
    #[serde(rename = "mode_changed")]
    ModeChanged {
        /// Active detector
        mode: String,
    },
    /// Backend confirmed a canvas reset
    #[serde(rename = "canvas_cleared")]
    CanvasCleared,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_offer_wire_shape() {
        let msg = ClientMessage::Offer(SessionDescription::offer("v=0"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"event": "offer", "data": {"sdp": "v=0", "type": "offer"}})
        );
    }

    #[test]
    fn test_candidate_uses_browser_field_names() {
        let msg =
            ClientMessage::IceCandidate(IceCandidate::new("candidate:1 1 udp 1 1.2.3.4 5 typ host"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "ice-candidate");
        assert_eq!(value["data"]["sdpMid"], "0");
        assert_eq!(value["data"]["sdpMLineIndex"], 0);
        assert!(value["data"].get("usernameFragment").is_none());
    }

    #[test]
    fn test_control_messages() {
        let clear = serde_json::to_value(&ClientMessage::ClearCanvas).unwrap();
        assert_eq!(clear, json!({"event": "clear_canvas"}));

        let mode = serde_json::to_value(&ClientMessage::ModeChange {
            mode: "motion".to_string(),
        })
        .unwrap();
        assert_eq!(mode, json!({"event": "mode_change", "data": {"mode": "motion"}}));
    }

    #[test]
    fn test_inbound_messages() {
        let answer: ServerMessage = serde_json::from_value(
            json!({"event": "answer", "data": {"sdp": "v=0", "type": "answer"}}),
        )
        .unwrap();
        assert_eq!(answer, ServerMessage::Answer(SessionDescription::answer("v=0")));

        let results: ServerMessage = serde_json::from_value(json!({
            "event": "detection_results",
            "data": [{"type": "gesture", "meta": {"status": "thumbs_up"}}, {"type": "motion"}]
        }))
        .unwrap();
        match results {
            ServerMessage::DetectionResults(events) => {
                assert_eq!(events.len(), 2);
                assert_eq!(events[0].status(), Some("thumbs_up"));
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let cleared: ServerMessage =
            serde_json::from_value(json!({"event": "canvas_cleared"})).unwrap();
        assert_eq!(cleared, ServerMessage::CanvasCleared);

        let candidate: ServerMessage = serde_json::from_value(json!({
            "event": "ice-candidate",
            "data": {"candidate": "candidate:2", "sdpMid": "0", "sdpMLineIndex": 0}
        }))
        .unwrap();
        assert!(matches!(candidate, ServerMessage::IceCandidate(_)));
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result = serde_json::from_value::<ServerMessage>(json!({"event": "bogus", "data": 1}));
        assert!(result.is_err());
    }
}
