//! # MotionLink Core
//!
//! Backend-facing building blocks for the MotionLink client: the error type
//! shared by every crate, the detection event model, the HTTP command and
//! upload API, and the server-sent event stream client.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod detection;
pub mod error;
pub mod event_stream;

// Re-export main types
pub use backend::{BackendApi, HttpBackend};
pub use detection::{DetectResponse, DetectionEvent, DetectionKind};
pub use error::{MotionLinkError, Result};
pub use event_stream::{
    decode_notification, pump_stream, EventStreamClient, EventSubscription, SseDecoder,
    SseMessage, StreamStatus, StreamUpdate,
};
