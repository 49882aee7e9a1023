//! Peer delivery
//!
//! The negotiation is modelled as an explicit state machine,
//! `Idle -> Negotiating -> Connected -> Closed | Failed`, driven by a small
//! set of named events. Events that are not legal in the current state are
//! ignored. The connection itself sits behind [`PeerConnector`] and
//! [`PeerTransport`] so the machine can run against any WebRTC stack.

use async_trait::async_trait;
use motionlink_core::{MotionLinkError, Result};
use motionlink_media::{CaptureTrack, FrameSink, VideoFrame};
use motionlink_signaling::{ClientMessage, IceCandidate, SessionDescription, SignalingChannel};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Peer connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    /// Nothing created yet
    Idle,
    /// Offer sent, waiting for answer, transport and remote media
    Negotiating,
    /// Remote media is flowing
    Connected,
    /// Torn down on request
    Closed,
    /// Transport failure; terminal
    Failed,
}

impl PeerState {
    /// `Closed` or `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerState::Closed | PeerState::Failed)
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerEvent {
    /// Live+peer mode entered; offer is being created
    Start,
    /// Remote answer set as remote description
    AnswerApplied,
    /// Connectivity layer found a working path
    TransportConnected,
    /// A remote track produced its first frame
    RemoteFrames,
    /// Connectivity layer reported failure or disconnect
    TransportFailed,
    /// Explicit close
    Teardown,
}

/// Result of feeding one event to [`PeerMachine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State changed
    Moved {
        /// Previous state
        from: PeerState,
        /// New state
        to: PeerState,
    },
    /// Progress recorded, state unchanged
    Recorded,
    /// Not legal in the current state
    Ignored,
}

/// Negotiation state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerMachine {
    state: PeerState,
    answer_applied: bool,
    transport_up: bool,
    remote_frames: bool,
}

impl Default for PeerMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerMachine {
    /// Start in `Idle`
    pub fn new() -> Self {
        Self {
            state: PeerState::Idle,
            answer_applied: false,
            transport_up: false,
            remote_frames: false,
        }
    }

    /// Current state
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Whether the remote answer has been applied
    pub fn answer_applied(&self) -> bool {
        self.answer_applied
    }

    /// Apply an event
    pub fn apply(&mut self, event: PeerEvent) -> Transition {
        use PeerEvent::*;
        use PeerState::*;

        let from = self.state;
        let to = match (from, event) {
            (Idle, Start) => Negotiating,
            (Idle, Teardown) => Closed,

            (Negotiating, AnswerApplied) if !self.answer_applied => {
                self.answer_applied = true;
                self.settle()
            }
            (Negotiating, TransportConnected) => {
                self.transport_up = true;
                self.settle()
            }
            (Negotiating, RemoteFrames) => {
                self.remote_frames = true;
                self.settle()
            }

            (Connected, TransportConnected) | (Connected, RemoteFrames) => {
                return Transition::Recorded
            }

            (Negotiating, TransportFailed) | (Connected, TransportFailed) => Failed,
            (Negotiating, Teardown) | (Connected, Teardown) => Closed,

            _ => {
                debug!(state = ?from, event = ?event, "ignoring peer event");
                return Transition::Ignored;
            }
        };

        self.state = to;
        if to == from {
            Transition::Recorded
        } else {
            debug!(from = ?from, to = ?to, event = ?event, "peer state");
            Transition::Moved { from, to }
        }
    }

    fn settle(&self) -> PeerState {
        if self.answer_applied && self.transport_up && self.remote_frames {
            PeerState::Connected
        } else {
            PeerState::Negotiating
        }
    }
}

/// Connectivity state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, nothing attempted
    New,
    /// Checking candidate pairs
    Connecting,
    /// A path is up
    Connected,
    /// Path lost
    Disconnected,
    /// No path could be found
    Failed,
    /// Closed locally
    Closed,
}

/// Callbacks from a [`PeerTransport`]
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local candidate to relay to the backend
    LocalCandidate(IceCandidate),
    /// Connectivity changed
    StateChanged(TransportState),
    /// Decoded frame from the remote track
    RemoteFrame(VideoFrame),
    /// The remote track ended
    RemoteTrackEnded,
}

/// One peer connection
#[async_trait]
pub trait PeerTransport: Send + Sync + std::fmt::Debug {
    /// Attach the local tracks, create the offer (video receive requested,
    /// audio not) and set it as the local description
    async fn create_offer(&self, tracks: &[Arc<CaptureTrack>]) -> Result<SessionDescription>;

    /// Set the remote answer
    async fn apply_answer(&self, answer: SessionDescription) -> Result<()>;

    /// Add a remote candidate
    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Close the connection and stop sending
    async fn close(&self) -> Result<()>;
}

/// Factory for [`PeerTransport`]s
#[async_trait]
pub trait PeerConnector: Send + Sync + std::fmt::Debug {
    /// Create a connection reporting its callbacks on `events`
    async fn connect(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>>;
}

/// What a running [`PeerDelivery`] reports to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerNotice {
    /// Reached `Connected`; sent once per session
    Connected,
    /// Reached `Failed`
    Failed {
        /// Failure description
        reason: String,
    },
    /// The remote track ended; the session stays up
    RemoteTrackEnded,
}

struct Negotiation {
    machine: PeerMachine,
    pending: Vec<IceCandidate>,
}

struct Shared {
    negotiation: Mutex<Negotiation>,
    transport: Arc<dyn PeerTransport>,
    signaling: Arc<dyn SignalingChannel>,
    sink: Arc<dyn FrameSink>,
    notices: mpsc::UnboundedSender<PeerNotice>,
}

impl Shared {
    fn apply(&self, event: PeerEvent) -> Transition {
        let transition = self.negotiation.lock().machine.apply(event);
        if let Transition::Moved { to, .. } = transition {
            match to {
                PeerState::Connected => {
                    info!("peer connection established");
                    let _ = self.notices.send(PeerNotice::Connected);
                }
                PeerState::Failed => {
                    warn!(event = ?event, "peer connection failed");
                    let _ = self.notices.send(PeerNotice::Failed {
                        reason: "transport failed".to_string(),
                    });
                }
                _ => {}
            }
        }
        transition
    }

    fn state(&self) -> PeerState {
        self.negotiation.lock().machine.state()
    }
}

/// The peer delivery session for one live period
pub struct PeerDelivery {
    shared: Arc<Shared>,
    pump: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PeerDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerDelivery")
            .field("state", &self.state())
            .finish()
    }
}

impl PeerDelivery {
    /// Create the connection, attach `tracks` and send the offer
    ///
    /// On failure the connection is closed before the error is returned.
    pub async fn start(
        connector: &dyn PeerConnector,
        tracks: &[Arc<CaptureTrack>],
        signaling: Arc<dyn SignalingChannel>,
        sink: Arc<dyn FrameSink>,
        notices: mpsc::UnboundedSender<PeerNotice>,
    ) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = connector.connect(events_tx).await?;

        let shared = Arc::new(Shared {
            negotiation: Mutex::new(Negotiation {
                machine: PeerMachine::new(),
                pending: Vec::new(),
            }),
            transport,
            signaling,
            sink,
            notices,
        });
        shared.apply(PeerEvent::Start);

        let mut delivery = Self {
            pump: Some(tokio::spawn(pump(shared.clone(), events_rx))),
            shared,
        };

        match delivery.offer(tracks).await {
            Ok(()) => Ok(delivery),
            Err(e) => {
                delivery.close().await;
                Err(e)
            }
        }
    }

    async fn offer(&self, tracks: &[Arc<CaptureTrack>]) -> Result<()> {
        let offer = self.shared.transport.create_offer(tracks).await?;
        self.shared
            .signaling
            .send(ClientMessage::Offer(offer))
            .map_err(MotionLinkError::from)?;
        info!(tracks = tracks.len(), "peer offer sent");
        Ok(())
    }

    /// Current state
    pub fn state(&self) -> PeerState {
        self.shared.state()
    }

    /// Apply the remote answer, then any candidates that arrived before it
    ///
    /// Ignored unless negotiating.
    pub async fn handle_answer(&self, answer: SessionDescription) -> Result<()> {
        {
            let negotiation = self.shared.negotiation.lock();
            if negotiation.machine.state() != PeerState::Negotiating
                || negotiation.machine.answer_applied()
            {
                debug!(state = ?negotiation.machine.state(), "ignoring answer");
                return Ok(());
            }
        }

        self.shared.transport.apply_answer(answer).await?;
        self.shared.apply(PeerEvent::AnswerApplied);

        let queued = std::mem::take(&mut self.shared.negotiation.lock().pending);
        if !queued.is_empty() {
            debug!(count = queued.len(), "applying buffered candidates");
        }
        for candidate in queued {
            if let Err(e) = self.shared.transport.add_candidate(candidate).await {
                warn!(error = %e, "failed to add buffered candidate");
            }
        }
        Ok(())
    }

    /// Apply a remote candidate, or buffer it until the answer is set
    pub async fn handle_candidate(&self, candidate: IceCandidate) -> Result<()> {
        {
            let mut negotiation = self.shared.negotiation.lock();
            if negotiation.machine.state().is_terminal() {
                return Ok(());
            }
            if !negotiation.machine.answer_applied() {
                negotiation.pending.push(candidate);
                return Ok(());
            }
        }
        self.shared.transport.add_candidate(candidate).await
    }

    /// Close the connection and clear the display; safe to call twice
    pub async fn close(&mut self) {
        let Some(pump) = self.pump.take() else {
            return;
        };
        pump.abort();
        self.shared.apply(PeerEvent::Teardown);
        self.shared.negotiation.lock().pending.clear();
        if let Err(e) = self.shared.transport.close().await {
            warn!(error = %e, "error closing peer connection");
        }
        self.shared.sink.clear();
        info!("peer connection closed");
    }
}

impl Drop for PeerDelivery {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn pump(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                if shared.state().is_terminal() {
                    continue;
                }
                if let Err(e) = shared.signaling.send(ClientMessage::IceCandidate(candidate)) {
                    warn!(error = %e, "failed to relay local candidate");
                }
            }
            TransportEvent::StateChanged(state) => {
                debug!(state = ?state, "transport state");
                match state {
                    TransportState::Connected => {
                        shared.apply(PeerEvent::TransportConnected);
                    }
                    TransportState::Failed | TransportState::Disconnected => {
                        shared.apply(PeerEvent::TransportFailed);
                    }
                    _ => {}
                }
            }
            TransportEvent::RemoteFrame(frame) => {
                if shared.state().is_terminal() {
                    continue;
                }
                shared.sink.present(&frame);
                shared.apply(PeerEvent::RemoteFrames);
            }
            TransportEvent::RemoteTrackEnded => {
                if !shared.state().is_terminal() {
                    let _ = shared.notices.send(PeerNotice::RemoteTrackEnded);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_needs_all_three_conditions() {
        let mut machine = PeerMachine::new();
        assert!(matches!(machine.apply(PeerEvent::Start), Transition::Moved { .. }));
        assert_eq!(machine.apply(PeerEvent::TransportConnected), Transition::Recorded);
        assert_eq!(machine.apply(PeerEvent::RemoteFrames), Transition::Recorded);
        assert_eq!(machine.state(), PeerState::Negotiating);

        assert_eq!(
            machine.apply(PeerEvent::AnswerApplied),
            Transition::Moved {
                from: PeerState::Negotiating,
                to: PeerState::Connected
            }
        );
    }

    #[test]
    fn test_answer_while_idle_is_ignored() {
        let mut machine = PeerMachine::new();
        assert_eq!(machine.apply(PeerEvent::AnswerApplied), Transition::Ignored);
        assert_eq!(machine.state(), PeerState::Idle);
        assert!(!machine.answer_applied());
    }

    #[test]
    fn test_second_answer_is_ignored() {
        let mut machine = PeerMachine::new();
        machine.apply(PeerEvent::Start);
        machine.apply(PeerEvent::AnswerApplied);
        assert_eq!(machine.apply(PeerEvent::AnswerApplied), Transition::Ignored);
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut machine = PeerMachine::new();
        machine.apply(PeerEvent::Start);
        assert_eq!(
            machine.apply(PeerEvent::TransportFailed),
            Transition::Moved {
                from: PeerState::Negotiating,
                to: PeerState::Failed
            }
        );
        assert_eq!(machine.apply(PeerEvent::TransportConnected), Transition::Ignored);
        assert_eq!(machine.apply(PeerEvent::Start), Transition::Ignored);
        assert_eq!(machine.apply(PeerEvent::Teardown), Transition::Ignored);
        assert_eq!(machine.state(), PeerState::Failed);
    }

    #[test]
    fn test_teardown_from_connected() {
        let mut machine = PeerMachine::new();
        machine.apply(PeerEvent::Start);
        machine.apply(PeerEvent::AnswerApplied);
        machine.apply(PeerEvent::TransportConnected);
        machine.apply(PeerEvent::RemoteFrames);
        assert_eq!(machine.state(), PeerState::Connected);

        assert_eq!(machine.apply(PeerEvent::RemoteFrames), Transition::Recorded);
        assert_eq!(
            machine.apply(PeerEvent::Teardown),
            Transition::Moved {
                from: PeerState::Connected,
                to: PeerState::Closed
            }
        );
        assert_eq!(machine.apply(PeerEvent::TransportFailed), Transition::Ignored);
    }
}
