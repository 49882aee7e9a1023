//! Mode/view controller
//!
//! [`ViewController`] is the single owner of everything a live session
//! holds: the camera session, the polling loop or peer connection, the event
//! stream subscription and the tasks forwarding their results. Each live
//! session gets an epoch number; results carrying a stale epoch are dropped,
//! so a late callback from a torn-down session never touches the view.

use crate::activity_log::{ActivityLog, LogCategory};
use crate::config::{ClientConfig, Strategy};
use crate::peer::{PeerConnector, PeerDelivery, PeerNotice, PeerState};
use crate::session::{SessionState, ViewMode};
use crate::view::{Surface, ViewSurface};
use motionlink_core::{
    BackendApi, DetectResponse, DetectionEvent, EventStreamClient, EventSubscription,
    MotionLinkError, Result, StreamStatus, StreamUpdate,
};
use motionlink_media::{
    CameraBackend, DeliverySnapshot, FrameDelivery, FrameDeliveryConfig, FrameSink, JpegEncoder,
    MediaAcquisition, VideoFrame,
};
use motionlink_signaling::{ClientMessage, ServerMessage, SignalingChannel, SignalingEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of a [`ViewController::switch_view`] request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The view changed
    Switched,
    /// Already in, or already moving to, the requested view
    Ignored,
    /// A transition to the other view is in flight
    Busy,
}

/// Everything the controller is built from
pub struct ControllerParts {
    /// Validated configuration
    pub config: ClientConfig,
    /// Backend HTTP surface
    pub backend: Arc<dyn BackendApi>,
    /// Camera source
    pub camera: Arc<dyn CameraBackend>,
    /// UI
    pub view: Arc<dyn ViewSurface>,
    /// Peer connection factory, required by the peer strategy
    pub connector: Option<Arc<dyn PeerConnector>>,
    /// Signaling channel and its events, required by the peer strategy
    pub signaling: Option<(Arc<dyn SignalingChannel>, mpsc::UnboundedReceiver<SignalingEvent>)>,
}

/// Presents remote peer frames on the view
struct ViewSink(Arc<dyn ViewSurface>);

impl FrameSink for ViewSink {
    fn present(&self, frame: &VideoFrame) {
        self.0.present(frame);
    }

    fn clear(&self) {
        self.0.clear();
    }
}

/// Resources of the current live session
#[derive(Default)]
struct Live {
    epoch: u64,
    delivery: Option<FrameDelivery>,
    peer: Option<PeerDelivery>,
    events: Option<EventSubscription>,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    config: ClientConfig,
    backend: Arc<dyn BackendApi>,
    acquisition: MediaAcquisition,
    connector: Option<Arc<dyn PeerConnector>>,
    signaling: Option<Arc<dyn SignalingChannel>>,
    view: Arc<dyn ViewSurface>,
    log: ActivityLog,
    state: Mutex<SessionState>,
    transition: Mutex<Option<ViewMode>>,
    live: tokio::sync::Mutex<Live>,
    epoch: AtomicU64,
    signaling_task: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the in-flight transition marker when a switch finishes
struct TransitionGuard<'a>(&'a Mutex<Option<ViewMode>>);

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// Owner of the demo/live state and every live-session resource
#[derive(Clone)]
pub struct ViewController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ViewController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewController")
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}

impl ViewController {
    /// Build a controller in demo mode
    ///
    /// Must be called inside a Tokio runtime when a signaling channel is
    /// supplied, since its events are consumed on a background task.
    pub fn new(parts: ControllerParts) -> Self {
        let ControllerParts {
            config,
            backend,
            camera,
            view,
            connector,
            signaling,
        } = parts;

        let (signaling, signaling_events) = match signaling {
            Some((channel, events)) => (Some(channel), Some(events)),
            None => (None, None),
        };

        let state = SessionState::new(config.initial_detection_mode.clone(), config.monitoring);
        let inner = Arc::new(Inner {
            log: ActivityLog::new(config.log_capacity),
            acquisition: MediaAcquisition::new(camera),
            state: Mutex::new(state),
            transition: Mutex::new(None),
            live: tokio::sync::Mutex::new(Live::default()),
            epoch: AtomicU64::new(0),
            signaling_task: Mutex::new(None),
            config,
            backend,
            connector,
            signaling,
            view,
        });

        inner.view.show_mode(ViewMode::Demo);
        inner.view.show_surface(Surface::Canvas);
        inner.view.show_monitoring(inner.config.monitoring);
        inner.view.show_detection_mode(&inner.config.initial_detection_mode);

        if let Some(events) = signaling_events {
            let task = tokio::spawn(signaling_loop(Arc::downgrade(&inner), events));
            *inner.signaling_task.lock() = Some(task);
        }

        Self { inner }
    }

    /// Switch between demo and live mode
    ///
    /// A request for the view already shown, or already being entered, is
    /// ignored; a request for the opposite view while a transition runs is
    /// rejected as [`SwitchOutcome::Busy`]. A failed live start reverts to
    /// demo mode, releases everything and returns the error.
    pub async fn switch_view(&self, target: ViewMode) -> Result<SwitchOutcome> {
        {
            let mut transition = self.inner.transition.lock();
            match *transition {
                Some(current) if current == target => return Ok(SwitchOutcome::Ignored),
                Some(current) => {
                    debug!(current = %current, target = %target, "transition in progress");
                    return Ok(SwitchOutcome::Busy);
                }
                None => {}
            }
            if self.inner.state.lock().view == target {
                return Ok(SwitchOutcome::Ignored);
            }
            *transition = Some(target);
        }
        let _guard = TransitionGuard(&self.inner.transition);

        match target {
            ViewMode::Live => self.inner.enter_live().await?,
            ViewMode::Demo => self.inner.leave_live().await,
        }
        Ok(SwitchOutcome::Switched)
    }

    /// Select a detector
    ///
    /// Goes over signaling with the peer strategy, over HTTP otherwise.
    /// Failures are logged and otherwise ignored.
    pub async fn set_detection_mode(&self, mode: &str) {
        self.inner.state.lock().detection_mode = mode.to_string();
        self.inner.view.show_detection_mode(mode);

        let result = match self.inner.command_channel() {
            Some(signaling) => signaling
                .send(ClientMessage::ModeChange {
                    mode: mode.to_string(),
                })
                .map_err(MotionLinkError::from),
            None => self.inner.backend.set_detection_mode(mode).await,
        };
        match result {
            Ok(()) => info!(mode, "detection mode set"),
            Err(e) => warn!(mode, error = %e, "failed to set detection mode"),
        }
    }

    /// Pause or resume monitoring; returns the new flag
    pub async fn toggle_monitoring(&self) -> bool {
        let enabled = {
            let mut state = self.inner.state.lock();
            state.monitoring = !state.monitoring;
            state.monitoring
        };
        self.inner.view.show_monitoring(enabled);

        if let Err(e) = self.inner.backend.set_monitoring(enabled).await {
            warn!(enabled, error = %e, "failed to update monitoring");
        }
        enabled
    }

    /// Ask the backend to clear its drawing canvas
    pub async fn clear_canvas(&self) {
        if let Some(signaling) = self.inner.command_channel() {
            // Confirmed by a canvas_cleared message
            if let Err(e) = signaling.send(ClientMessage::ClearCanvas) {
                warn!(error = %e, "failed to send clear_canvas");
            }
            return;
        }

        match self.inner.backend.clear_canvas().await {
            Ok(true) => self.inner.append("Canvas cleared", LogCategory::Ended),
            Ok(false) => warn!("backend refused to clear the canvas"),
            Err(e) => warn!(error = %e, "failed to clear canvas"),
        }
    }

    /// Snapshot of the session state
    pub fn state(&self) -> SessionState {
        self.inner.state.lock().clone()
    }

    /// Current view
    pub fn view_mode(&self) -> ViewMode {
        self.inner.state.lock().view
    }

    /// The activity log
    pub fn log(&self) -> &ActivityLog {
        &self.inner.log
    }

    /// Configuration in use
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// State of the live peer connection, if any
    pub async fn peer_state(&self) -> Option<PeerState> {
        self.inner.live.lock().await.peer.as_ref().map(|p| p.state())
    }

    /// Counters of the running polling loop, if any
    pub async fn delivery_stats(&self) -> Option<DeliverySnapshot> {
        self.inner
            .live
            .lock()
            .await
            .delivery
            .as_ref()
            .map(|d| d.stats().snapshot())
    }

    /// Whether a camera session is active
    pub async fn camera_active(&self) -> bool {
        self.inner
            .acquisition
            .active()
            .await
            .is_some_and(|session| session.is_active())
    }

    /// Leave live mode and stop consuming signaling events
    pub async fn shutdown(&self) {
        if self.view_mode() == ViewMode::Live {
            self.inner.leave_live().await;
        }
        if let Some(task) = self.inner.signaling_task.lock().take() {
            task.abort();
        }
        info!("controller shut down");
    }
}

impl Inner {
    fn append(&self, text: impl Into<String>, category: LogCategory) {
        let entry = self.log.append(text, category);
        self.view.log_appended(&entry);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Signaling channel for commands, when the peer strategy is configured
    fn command_channel(&self) -> Option<&Arc<dyn SignalingChannel>> {
        if self.config.strategy == Strategy::Peer {
            self.signaling.as_ref()
        } else {
            None
        }
    }

    fn record_detection(&self, event: &DetectionEvent) {
        let Some(text) = event.log_text() else {
            return;
        };
        {
            let mut state = self.state.lock();
            if !state.monitoring {
                return;
            }
            state.event_count += 1;
        }
        self.append(text, LogCategory::Started);
    }

    fn record_upload(&self, response: &DetectResponse) {
        let lines = response.log_lines();
        if lines.is_empty() {
            return;
        }
        {
            let mut state = self.state.lock();
            if !state.monitoring {
                return;
            }
            state.event_count += lines.len() as u64;
        }
        for line in lines {
            self.append(line, LogCategory::Started);
        }
    }

    async fn enter_live(self: &Arc<Self>) -> Result<()> {
        let strategy = self.config.strategy;
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.lock();
            state.view = ViewMode::Live;
            state.strategy = Some(strategy);
        }
        self.view.show_mode(ViewMode::Live);
        info!(epoch, strategy = %strategy, "entering live mode");

        let mut live = self.live.lock().await;
        self.teardown(&mut live).await;
        live.epoch = epoch;

        if let Err(e) = self.start_strategy(&mut live, epoch).await {
            error!(epoch, error = %e, "failed to enter live mode");
            self.epoch.fetch_add(1, Ordering::SeqCst);
            self.teardown(&mut live).await;
            self.restore_demo();
            let text = if e.is_acquisition_failure() {
                format!("Camera failed: {}", e)
            } else {
                format!("Live mode failed: {}", e)
            };
            self.append(text, LogCategory::Ended);
            return Err(e);
        }

        if self.config.subscribe_events {
            self.open_event_stream(&mut live, epoch);
        }
        Ok(())
    }

    async fn start_strategy(self: &Arc<Self>, live: &mut Live, epoch: u64) -> Result<()> {
        match self.config.strategy {
            Strategy::ServerFeed => {
                let url = self.backend.video_feed_url(unix_millis());
                self.view.show_surface(Surface::MjpegFeed(url));
            }
            Strategy::Polling => {
                let session = self.acquisition.acquire(&self.config.camera_constraints()).await?;
                let track = session
                    .video_track()
                    .ok_or_else(|| MotionLinkError::DeviceUnavailable {
                        reason: "camera produced no video track".to_string(),
                    })?;
                self.view.show_surface(Surface::Canvas);

                let (results_tx, results_rx) = mpsc::unbounded_channel();
                let config = FrameDeliveryConfig {
                    interval: self.config.frame_interval(),
                    encoder: JpegEncoder::new(
                        self.config.jpeg_quality,
                        self.config.target_resolution,
                    ),
                };
                live.delivery = Some(FrameDelivery::start(
                    config,
                    track,
                    self.backend.clone(),
                    results_tx,
                )?);
                live.tasks.push(tokio::spawn(forward_results(
                    Arc::downgrade(self),
                    epoch,
                    results_rx,
                )));
            }
            Strategy::Peer => {
                let (Some(connector), Some(signaling)) = (&self.connector, &self.signaling) else {
                    return Err(MotionLinkError::Configuration {
                        field: "strategy".to_string(),
                        reason: "peer strategy needs a peer connector and a signaling channel"
                            .to_string(),
                    });
                };
                let session = self.acquisition.acquire(&self.config.camera_constraints()).await?;
                self.view.show_surface(Surface::Canvas);

                let (notices_tx, notices_rx) = mpsc::unbounded_channel();
                let sink: Arc<dyn FrameSink> = Arc::new(ViewSink(self.view.clone()));
                let peer = PeerDelivery::start(
                    connector.as_ref(),
                    session.tracks(),
                    signaling.clone(),
                    sink,
                    notices_tx,
                )
                .await?;
                live.peer = Some(peer);
                live.tasks.push(tokio::spawn(forward_notices(
                    Arc::downgrade(self),
                    epoch,
                    notices_rx,
                )));
            }
        }
        Ok(())
    }

    fn open_event_stream(self: &Arc<Self>, live: &mut Live, epoch: u64) {
        let retry = self.config.event_stream_retry();
        let client = match EventStreamClient::new(self.backend.events_url(), retry) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "event stream unavailable");
                return;
            }
        };
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        live.events = Some(client.subscribe(updates_tx));
        live.tasks.push(tokio::spawn(forward_updates(
            Arc::downgrade(self),
            epoch,
            updates_rx,
        )));
    }

    /// Stop the camera, then the peer connection, then the event stream
    async fn teardown(&self, live: &mut Live) {
        for task in live.tasks.drain(..) {
            task.abort();
        }
        if let Some(mut delivery) = live.delivery.take() {
            delivery.stop();
        }
        self.acquisition.release().await;
        if let Some(mut peer) = live.peer.take() {
            peer.close().await;
        }
        if let Some(mut events) = live.events.take() {
            events.close();
        }
    }

    fn restore_demo(&self) {
        {
            let mut state = self.state.lock();
            state.view = ViewMode::Demo;
            state.strategy = None;
        }
        self.view.show_mode(ViewMode::Demo);
        self.view.show_surface(Surface::Canvas);
        self.view.show_backend_status(StreamStatus::Disconnected);
    }

    async fn leave_live(&self) {
        let mut live = self.live.lock().await;
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst);
        self.teardown(&mut live).await;
        self.restore_demo();
        info!(epoch, "left live mode");
    }

    /// Fall back to demo after the peer connection failed
    async fn fail_live(&self, epoch: u64, reason: String) {
        let mut live = self.live.lock().await;
        if !self.is_current(epoch) || live.epoch != epoch {
            debug!(epoch, "ignoring failure of a finished session");
            return;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        error!(epoch, reason = %reason, "peer connection failed, returning to demo mode");
        self.teardown(&mut live).await;
        self.restore_demo();
        self.append(format!("WebRTC connection failed: {}", reason), LogCategory::Ended);
    }

    async fn handle_signaling(&self, event: SignalingEvent) {
        match event {
            SignalingEvent::Connected => {
                self.append("Connected to WebRTC server", LogCategory::Started);
            }
            SignalingEvent::Disconnected { reason } => {
                debug!(reason = %reason, "signaling disconnected");
            }
            SignalingEvent::GaveUp { attempts } => {
                warn!(attempts, "signaling server unreachable");
            }
            SignalingEvent::Message(message) => self.handle_server_message(message).await,
        }
    }

    async fn handle_server_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::Answer(answer) => {
                let live = self.live.lock().await;
                match live.peer.as_ref() {
                    Some(peer) => {
                        if let Err(e) = peer.handle_answer(answer).await {
                            warn!(error = %e, "failed to apply answer");
                        }
                    }
                    None => debug!("answer without a peer connection"),
                }
            }
            ServerMessage::IceCandidate(candidate) => {
                let live = self.live.lock().await;
                if let Some(peer) = live.peer.as_ref() {
                    if let Err(e) = peer.handle_candidate(candidate).await {
                        warn!(error = %e, "failed to add remote candidate");
                    }
                }
            }
            ServerMessage::DetectionResults(events) => {
                for event in &events {
                    self.record_detection(event);
                }
            }
            ServerMessage::ModeChanged { mode } => {
                self.state.lock().detection_mode = mode.clone();
                self.view.show_detection_mode(&mode);
                self.append(format!("Mode changed to: {}", mode), LogCategory::Ended);
            }
            ServerMessage::CanvasCleared => {
                self.append("Canvas cleared", LogCategory::Ended);
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for task in self.live.get_mut().tasks.drain(..) {
            task.abort();
        }
        if let Some(task) = self.signaling_task.get_mut().take() {
            task.abort();
        }
    }
}

async fn signaling_loop(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<SignalingEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_signaling(event).await;
    }
    debug!("signaling event loop finished");
}

async fn forward_results(
    inner: Weak<Inner>,
    epoch: u64,
    mut results: mpsc::UnboundedReceiver<DetectResponse>,
) {
    while let Some(response) = results.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.is_current(epoch) {
            break;
        }
        inner.record_upload(&response);
    }
}

async fn forward_updates(
    inner: Weak<Inner>,
    epoch: u64,
    mut updates: mpsc::UnboundedReceiver<StreamUpdate>,
) {
    while let Some(update) = updates.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.is_current(epoch) {
            break;
        }
        match update {
            StreamUpdate::Status(status) => inner.view.show_backend_status(status),
            StreamUpdate::Detection(event) => inner.record_detection(&event),
        }
    }
}

async fn forward_notices(
    inner: Weak<Inner>,
    epoch: u64,
    mut notices: mpsc::UnboundedReceiver<PeerNotice>,
) {
    while let Some(notice) = notices.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.is_current(epoch) {
            break;
        }
        match notice {
            PeerNotice::Connected => {
                inner.view.show_surface(Surface::RemoteVideo);
                inner.append("WebRTC connected - video playing", LogCategory::Started);
            }
            PeerNotice::RemoteTrackEnded => {
                inner.view.show_surface(Surface::Canvas);
            }
            PeerNotice::Failed { reason } => {
                // Teardown aborts this task, so the fallback runs on its own
                tokio::spawn(async move { inner.fail_live(epoch, reason).await });
                break;
            }
        }
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
