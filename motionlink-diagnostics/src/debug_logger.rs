//! Structured logging setup

use serde::Deserialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "motionlink=info";

/// Logging options
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub default_directive: String,
    /// Print the event target (module path)
    pub with_target: bool,
    /// Colourise output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Build the filter: `RUST_LOG` wins, then the configured directive
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_directive))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
    }
}

/// Install the global tracing subscriber
///
/// Returns `false` when a subscriber was already installed; the existing one
/// is kept.
pub fn init_logging(config: &LogConfig) -> bool {
    let installed = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(config.with_target)
                .with_ansi(config.ansi),
        )
        .with(config.filter())
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(directive = %config.default_directive, "logging initialised");
    }
    installed
}

/// Quiet subscriber for tests (warnings and above, captured per test)
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
