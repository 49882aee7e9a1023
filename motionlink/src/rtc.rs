//! webrtc-rs backed [`PeerConnector`]
//!
//! Local tracks are H.264 encoded on a dedicated thread and written as
//! samples; the remote track is depacketized, decoded on another thread and
//! reported as [`TransportEvent::RemoteFrame`]. openh264 handles are not
//! `Send`, so each codec lives on the thread that created it.

use crate::peer::{PeerConnector, PeerTransport, TransportEvent, TransportState};
use async_trait::async_trait;
use bytes::Bytes;
use motionlink_core::{MotionLinkError, Result};
use motionlink_media::{CaptureTrack, H264Decoder, H264Encoder, VideoFrame};
use motionlink_signaling::{IceCandidate, SdpType, SessionDescription};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

const H264_PAYLOAD_TYPE: u8 = 102;
const H264_CLOCK_RATE: u32 = 90_000;
const H264_FMTP: &str = "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f";
/// Packets the depacketizer may hold back while waiting for reordering
const MAX_LATE_PACKETS: u16 = 64;
/// Duration of the first sample, before a real frame gap is known
const FIRST_SAMPLE_DURATION: Duration = Duration::from_millis(66);

fn rtc_error(context: &'static str) -> impl FnOnce(webrtc::Error) -> MotionLinkError {
    move |e| MotionLinkError::PeerConnection {
        reason: format!("{}: {}", context, e),
    }
}

fn h264_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_H264.to_owned(),
        clock_rate: H264_CLOCK_RATE,
        channels: 0,
        sdp_fmtp_line: H264_FMTP.to_owned(),
        rtcp_feedback: vec![],
    }
}

/// Creates one webrtc-rs peer connection per live session
#[derive(Debug, Clone)]
pub struct WebRtcConnector {
    ice_servers: Vec<String>,
}

impl WebRtcConnector {
    /// Connector using the given STUN/TURN URLs
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }

    async fn build_peer_connection(&self) -> Result<RTCPeerConnection> {
        // H.264 only, so the backend cannot pick a codec we cannot decode
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: h264_capability(),
                    payload_type: H264_PAYLOAD_TYPE,
                    ..Default::default()
                },
                RTPCodecType::Video,
            )
            .map_err(rtc_error("failed to register H.264"))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(rtc_error("failed to register interceptors"))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        api.new_peer_connection(config)
            .await
            .map_err(rtc_error("failed to create peer connection"))
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn connect(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>> {
        let pc = Arc::new(self.build_peer_connection().await?);

        let candidate_events = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = events.send(TransportEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }));
                    }
                    Err(e) => warn!(error = %e, "failed to serialize local candidate"),
                }
            })
        }));

        let state_events = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            info!(state = %state, "peer connection state");
            let _ = state_events.send(TransportEvent::StateChanged(transport_state(state)));
            Box::pin(async {})
        }));

        let track_events = events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = track_events.clone();
            Box::pin(async move {
                receive_remote_track(track, events).await;
            })
        }));

        info!(ice_servers = self.ice_servers.len(), "peer connection created");
        Ok(Arc::new(WebRtcTransport {
            pc,
            tasks: Mutex::new(Vec::new()),
        }))
    }
}

fn transport_state(state: RTCPeerConnectionState) -> TransportState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => TransportState::New,
        RTCPeerConnectionState::Connecting => TransportState::Connecting,
        RTCPeerConnectionState::Connected => TransportState::Connected,
        RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
        RTCPeerConnectionState::Failed => TransportState::Failed,
        RTCPeerConnectionState::Closed => TransportState::Closed,
    }
}

/// Depacketize the remote H.264 track and hand access units to a decoder thread
async fn receive_remote_track(
    track: Arc<TrackRemote>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mime_type = track.codec().capability.mime_type;
    if track.kind() != RTPCodecType::Video || !mime_type.eq_ignore_ascii_case(MIME_TYPE_H264) {
        warn!(mime_type = %mime_type, "ignoring unsupported remote track");
        return;
    }
    info!(track_id = %track.id(), "remote track started");

    let (units_tx, units_rx) = mpsc::unbounded_channel::<Bytes>();
    let decoder_events = events.clone();
    let spawned = std::thread::Builder::new()
        .name("motionlink-h264-dec".to_string())
        .spawn(move || decode_loop(units_rx, decoder_events));
    if let Err(e) = spawned {
        warn!(error = %e, "failed to start decoder thread");
        return;
    }

    let mut builder = SampleBuilder::new(MAX_LATE_PACKETS, H264Packet::default(), H264_CLOCK_RATE);
    while let Ok((packet, _)) = track.read_rtp().await {
        builder.push(packet);
        while let Some(sample) = builder.pop() {
            if units_tx.send(sample.data).is_err() {
                break;
            }
        }
    }

    info!(track_id = %track.id(), "remote track ended");
    let _ = events.send(TransportEvent::RemoteTrackEnded);
}

fn decode_loop(
    mut units: mpsc::UnboundedReceiver<Bytes>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut decoder = match H264Decoder::new() {
        Ok(decoder) => decoder,
        Err(e) => {
            warn!(error = %e, "H.264 decoder unavailable");
            return;
        }
    };

    let mut decoded = 0u64;
    while let Some(unit) = units.blocking_recv() {
        match decoder.decode(&unit) {
            Ok(Some(frame)) => {
                decoded += 1;
                if decoded % 30 == 0 {
                    debug!(frames = decoded, "decoded remote frames");
                }
                if events.send(TransportEvent::RemoteFrame(frame)).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "dropping undecodable access unit"),
        }
    }
}

/// A live webrtc-rs connection
pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WebRtcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRtcTransport")
            .field("state", &self.pc.connection_state())
            .finish()
    }
}

impl WebRtcTransport {
    async fn attach(&self, track: &CaptureTrack) -> Result<()> {
        let local = Arc::new(TrackLocalStaticSample::new(
            h264_capability(),
            track.id().to_string(),
            "motionlink".to_string(),
        ));
        self.pc
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(rtc_error("failed to add local track"))?;

        // Latest frame only; the encoder drops frames it cannot keep up with
        let (raw_tx, raw_rx) = mpsc::channel::<Arc<VideoFrame>>(1);
        let (units_tx, mut units_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        std::thread::Builder::new()
            .name("motionlink-h264-enc".to_string())
            .spawn(move || encode_loop(raw_rx, units_tx))
            .map_err(|e| MotionLinkError::PeerConnection {
                reason: format!("failed to start encoder thread: {}", e),
            })?;

        let mut frames = track.subscribe();
        let feeder = tokio::spawn(async move {
            while frames.changed().await.is_ok() {
                let frame = frames.borrow_and_update().clone();
                if let Some(frame) = frame {
                    if let Err(mpsc::error::TrySendError::Closed(_)) = raw_tx.try_send(frame) {
                        break;
                    }
                }
            }
        });

        let writer = tokio::spawn(async move {
            let mut last: Option<Instant> = None;
            while let Some(unit) = units_rx.recv().await {
                let now = Instant::now();
                let duration = last.map_or(FIRST_SAMPLE_DURATION, |t| now.duration_since(t));
                last = Some(now);
                let sample = Sample {
                    data: Bytes::from(unit),
                    duration,
                    ..Default::default()
                };
                if let Err(e) = local.write_sample(&sample).await {
                    debug!(error = %e, "failed to write sample");
                }
            }
        });

        self.tasks.lock().extend([feeder, writer]);
        debug!(track_id = %track.id(), "local track attached");
        Ok(())
    }
}

fn encode_loop(mut frames: mpsc::Receiver<Arc<VideoFrame>>, units: mpsc::UnboundedSender<Vec<u8>>) {
    let mut encoder = match H264Encoder::new() {
        Ok(encoder) => encoder,
        Err(e) => {
            warn!(error = %e, "H.264 encoder unavailable");
            return;
        }
    };

    while let Some(frame) = frames.blocking_recv() {
        match encoder.encode(&frame) {
            Ok(unit) if !unit.is_empty() => {
                if units.send(unit).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "failed to encode frame"),
        }
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_offer(&self, tracks: &[Arc<CaptureTrack>]) -> Result<SessionDescription> {
        for track in tracks {
            self.attach(track).await?;
        }
        if tracks.is_empty() {
            self.pc
                .add_transceiver_from_kind(
                    RTPCodecType::Video,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await
                .map_err(rtc_error("failed to add receive transceiver"))?;
        }

        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(rtc_error("failed to create offer"))?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(rtc_error("failed to set local description"))?;

        Ok(SessionDescription {
            sdp: offer.sdp,
            sdp_type: SdpType::Offer,
        })
    }

    async fn apply_answer(&self, answer: SessionDescription) -> Result<()> {
        let answer =
            RTCSessionDescription::answer(answer.sdp).map_err(rtc_error("invalid answer"))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(rtc_error("failed to set remote description"))
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(rtc_error("failed to add candidate"))
    }

    async fn close(&self) -> Result<()> {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.pc.close().await.map_err(rtc_error("failed to close"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping() {
        assert_eq!(transport_state(RTCPeerConnectionState::Connected), TransportState::Connected);
        assert_eq!(transport_state(RTCPeerConnectionState::Failed), TransportState::Failed);
        assert_eq!(transport_state(RTCPeerConnectionState::Unspecified), TransportState::New);
    }

    #[test]
    fn test_capability_is_h264() {
        let capability = h264_capability();
        assert_eq!(capability.mime_type, MIME_TYPE_H264);
        assert_eq!(capability.clock_rate, 90_000);
        assert!(capability.sdp_fmtp_line.contains("packetization-mode=1"));
    }
}
