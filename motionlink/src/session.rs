//! Session state owned by the view controller

use crate::config::Strategy;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Top-level view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewMode {
    /// No backend media exchange
    Demo,
    /// Camera or server feed is running
    Live,
}

impl ViewMode {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Demo => "demo",
            ViewMode::Live => "live",
        }
    }
}

impl std::fmt::Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the controller's state
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Current view
    pub view: ViewMode,
    /// Strategy running while live, `None` in demo mode
    pub strategy: Option<Strategy>,
    /// Whether detections are being logged
    pub monitoring: bool,
    /// Active detector label
    pub detection_mode: String,
    /// Detections logged since start
    pub event_count: u64,
    /// When the session was created
    pub started_at: DateTime<Utc>,
}

impl SessionState {
    /// Fresh demo-mode state
    pub fn new(detection_mode: impl Into<String>, monitoring: bool) -> Self {
        Self {
            view: ViewMode::Demo,
            strategy: None,
            monitoring,
            detection_mode: detection_mode.into(),
            event_count: 0,
            started_at: Utc::now(),
        }
    }

    /// Time since the session was created
    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    /// Whether live mode is active
    pub fn is_live(&self) -> bool {
        self.view == ViewMode::Live
    }
}

/// Format a duration as `HH:MM:SS`; hours keep growing past 99
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::ZERO), "00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(59)), "00:00:59");
        assert_eq!(format_uptime(Duration::from_secs(3_725)), "01:02:05");
        assert_eq!(format_uptime(Duration::from_secs(360_000)), "100:00:00");
    }

    #[test]
    fn test_new_state_is_demo() {
        let state = SessionState::new("gesture", true);
        assert_eq!(state.view, ViewMode::Demo);
        assert!(state.strategy.is_none());
        assert!(!state.is_live());
        assert!(state.uptime() < Duration::from_secs(5));
    }
}
