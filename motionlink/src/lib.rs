//! # MotionLink
//!
//! Client for a motion and gesture detection backend. In demo mode nothing
//! leaves the machine; in live mode the client either shows the backend's
//! own camera feed, uploads JPEG snapshots of the local camera a few times a
//! second, or streams the camera over a WebRTC peer connection. Detections
//! come back over a server-sent event stream or the signaling channel and
//! land in a bounded activity log.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use motionlink::{ClientConfig, MotionLink, Strategy, ViewMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), motionlink::MotionLinkError> {
//!     let config = ClientConfig {
//!         strategy: Strategy::Polling,
//!         ..Default::default()
//!     };
//!
//!     let controller = MotionLink::builder(config).build()?;
//!     controller.switch_view(ViewMode::Live).await?;
//!
//!     for entry in controller.log().entries() {
//!         println!("{}", entry.text);
//!     }
//!
//!     controller.switch_view(ViewMode::Demo).await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use motionlink_core::{
    BackendApi, DetectResponse, DetectionEvent, DetectionKind, HttpBackend, MotionLinkError,
    StreamStatus,
};

pub use motionlink_media::{
    CameraBackend, CaptureTrack, FrameSink, MediaConstraints, MockCamera, VideoFrame,
    VideoResolution,
};

pub use motionlink_signaling::{
    IceCandidate, SessionDescription, SignalingChannel, SignalingClient, SignalingEvent,
};

#[cfg(feature = "diagnostics")]
pub use motionlink_diagnostics::{
    init_logging, init_test_logging, HealthProbe, HealthReport, LogConfig,
};

// Public API modules
pub mod activity_log;
pub mod config;
pub mod controller;
pub mod peer;
#[cfg(feature = "webrtc")]
pub mod rtc;
pub mod session;
pub mod view;

// Re-export main API types
pub use activity_log::{ActivityLog, LogCategory, LogEntry};
pub use config::{ClientConfig, Strategy};
pub use controller::{ControllerParts, SwitchOutcome, ViewController};
pub use peer::{PeerConnector, PeerDelivery, PeerNotice, PeerState, PeerTransport};
#[cfg(feature = "webrtc")]
pub use rtc::WebRtcConnector;
pub use session::{format_uptime, SessionState, ViewMode};
pub use view::{RecordingView, Surface, TracingView, ViewSurface};

use std::sync::Arc;
use tokio::sync::mpsc;

/// Main entry point for MotionLink
#[derive(Debug)]
pub struct MotionLink;

impl MotionLink {
    /// Start building a controller for `config`
    ///
    /// # Example
    /// ```rust,no_run
    /// use motionlink::{ClientConfig, MotionLink, RecordingView};
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> Result<(), motionlink::MotionLinkError> {
    /// let controller = MotionLink::builder(ClientConfig::default())
    ///     .view(Arc::new(RecordingView::new()))
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder(config: ClientConfig) -> MotionLinkBuilder {
        MotionLinkBuilder::new(config)
    }
}

/// Assembles a [`ViewController`]; every seam falls back to a real default
pub struct MotionLinkBuilder {
    config: ClientConfig,
    backend: Option<Arc<dyn BackendApi>>,
    camera: Option<Arc<dyn CameraBackend>>,
    view: Option<Arc<dyn ViewSurface>>,
    connector: Option<Arc<dyn PeerConnector>>,
    signaling: Option<(Arc<dyn SignalingChannel>, mpsc::UnboundedReceiver<SignalingEvent>)>,
}

impl std::fmt::Debug for MotionLinkBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionLinkBuilder")
            .field("strategy", &self.config.strategy)
            .field("custom_backend", &self.backend.is_some())
            .field("custom_camera", &self.camera.is_some())
            .field("custom_view", &self.view.is_some())
            .finish()
    }
}

impl MotionLinkBuilder {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            backend: None,
            camera: None,
            view: None,
            connector: None,
            signaling: None,
        }
    }

    /// Use a custom backend instead of [`HttpBackend`]
    pub fn backend(mut self, backend: Arc<dyn BackendApi>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use a custom camera instead of the platform default
    pub fn camera(mut self, camera: Arc<dyn CameraBackend>) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Drive this view instead of [`TracingView`]
    pub fn view(mut self, view: Arc<dyn ViewSurface>) -> Self {
        self.view = Some(view);
        self
    }

    /// Use a custom peer connection factory
    pub fn peer_connector(mut self, connector: Arc<dyn PeerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use an already-open signaling channel and its event feed
    pub fn signaling(
        mut self,
        channel: Arc<dyn SignalingChannel>,
        events: mpsc::UnboundedReceiver<SignalingEvent>,
    ) -> Self {
        self.signaling = Some((channel, events));
        self
    }

    /// Validate the configuration and build the controller
    ///
    /// With the peer strategy and no injected channel, a [`SignalingClient`]
    /// is connected to `signaling_url`, so this must run inside a Tokio
    /// runtime.
    pub fn build(self) -> Result<ViewController, MotionLinkError> {
        self.config.validate()?;

        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(HttpBackend::new(
                &self.config.backend_url,
                self.config.request_timeout(),
            )?),
        };
        let camera = self.camera.unwrap_or_else(motionlink_media::default_camera);
        let view = self
            .view
            .unwrap_or_else(|| Arc::new(TracingView::new()) as Arc<dyn ViewSurface>);

        let peer_strategy = self.config.strategy == Strategy::Peer;
        let signaling = match self.signaling {
            Some(signaling) => Some(signaling),
            None if peer_strategy => {
                let (events_tx, events_rx) = mpsc::unbounded_channel();
                let client = SignalingClient::connect(
                    self.config.signaling_url.clone(),
                    self.config.reconnect_policy(),
                    events_tx,
                );
                Some((Arc::new(client) as Arc<dyn SignalingChannel>, events_rx))
            }
            None => None,
        };

        let connector = match self.connector {
            Some(connector) => Some(connector),
            None if peer_strategy => default_connector(&self.config),
            None => None,
        };

        Ok(ViewController::new(ControllerParts {
            config: self.config,
            backend,
            camera,
            view,
            connector,
            signaling,
        }))
    }
}

#[cfg(feature = "webrtc")]
fn default_connector(config: &ClientConfig) -> Option<Arc<dyn PeerConnector>> {
    Some(Arc::new(WebRtcConnector::new(config.ice_servers.clone())))
}

#[cfg(not(feature = "webrtc"))]
fn default_connector(_config: &ClientConfig) -> Option<Arc<dyn PeerConnector>> {
    tracing::warn!("built without the webrtc feature; peer strategy has no connector");
    None
}
