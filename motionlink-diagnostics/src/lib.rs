//! # MotionLink Diagnostics
//!
//! Logging setup and backend health checks.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod health;

// Re-export main types
pub use debug_logger::{init_logging, init_test_logging, LogConfig, DEFAULT_DIRECTIVE};
pub use health::{HealthProbe, HealthReport, HealthStatus, HEALTH_PATH};
