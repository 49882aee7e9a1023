//! Bounded activity log
//!
//! Newest entries first. Once the capacity is reached every append evicts
//! the oldest entry, so memory stays flat however fast events arrive.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Entry category, rendered as a coloured status dot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Something began or was detected
    Started,
    /// Something stopped, changed or failed
    Ended,
}

impl LogCategory {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Started => "started",
            LogCategory::Ended => "ended",
        }
    }
}

/// One log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Human-readable text
    pub text: String,
    /// Category tag
    pub category: LogCategory,
    /// When the entry was appended
    pub time: DateTime<Utc>,
}

impl LogEntry {
    /// Age relative to `now`: `just now`, `12s ago`, `3m ago`, `2h ago`
    pub fn relative_age(&self, now: DateTime<Utc>) -> String {
        let secs = (now - self.time).num_seconds().max(0);
        if secs < 5 {
            "just now".to_string()
        } else if secs < 60 {
            format!("{}s ago", secs)
        } else if secs < 3600 {
            format!("{}m ago", secs / 60)
        } else {
            format!("{}h ago", secs / 3600)
        }
    }
}

/// Fixed-capacity, newest-first log
#[derive(Debug)]
pub struct ActivityLog {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl ActivityLog {
    /// Create a log; a zero capacity is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Maximum number of retained entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert at the front, evicting the oldest entry when full
    pub fn append(&self, text: impl Into<String>, category: LogCategory) -> LogEntry {
        let entry = LogEntry {
            text: text.into(),
            category,
            time: Utc::now(),
        };
        let mut entries = self.entries.lock();
        entries.push_front(entry.clone());
        entries.truncate(self.capacity);
        entry
    }

    /// Entries, newest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<LogEntry> {
        self.entries.lock().front().cloned()
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Count entries with the given text
    pub fn count_text(&self, text: &str) -> usize {
        self.entries.lock().iter().filter(|e| e.text == text).count()
    }

    /// Remove everything
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_capacity_evicts_oldest() {
        let log = ActivityLog::new(20);
        for i in 0..25 {
            log.append(format!("event {}", i), LogCategory::Started);
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 20);
        assert_eq!(entries[0].text, "event 24");
        assert_eq!(entries[19].text, "event 5");
        for gone in 0..5 {
            assert_eq!(log.count_text(&format!("event {}", gone)), 0);
        }
    }

    #[test]
    fn test_relative_age() {
        let log = ActivityLog::new(20);
        let entry = log.append("Motion Detected", LogCategory::Started);

        assert_eq!(entry.relative_age(entry.time), "just now");
        assert_eq!(entry.relative_age(entry.time + Duration::seconds(12)), "12s ago");
        assert_eq!(entry.relative_age(entry.time + Duration::seconds(200)), "3m ago");
        assert_eq!(entry.relative_age(entry.time + Duration::hours(2)), "2h ago");
        assert_eq!(entry.relative_age(entry.time - Duration::seconds(3)), "just now");
    }

    #[test]
    fn test_clear() {
        let log = ActivityLog::new(20);
        log.append("Canvas cleared", LogCategory::Ended);
        assert_eq!(log.latest().map(|e| e.category), Some(LogCategory::Ended));

        log.clear();
        assert!(log.is_empty());
        assert!(log.latest().is_none());
    }
}
