//! # MotionLink Signaling
//!
//! Duplex JSON channel used to negotiate the peer delivery session: session
//! descriptions and connectivity candidates in both directions, detector and
//! canvas commands out, detection batches and confirmations in.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod protocol;

// Re-export main types
pub use client::{ReconnectPolicy, SignalingChannel, SignalingClient, SignalingEvent};
pub use error::{SignalingError, SignalingResult};
pub use protocol::{ClientMessage, IceCandidate, SdpType, ServerMessage, SessionDescription};
