//! Timestamped log lines as returned by `docker logs --timestamps`

use chrono::{DateTime, Utc};

/// One log line, with the runtime's timestamp when present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: Option<DateTime<Utc>>,
    pub message: String,
}

impl LogLine {
    /// Split `2024-05-01T10:00:00.123456789Z message` into its parts.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim_end_matches(['\r', '\n']);
        if let Some((head, rest)) = raw.split_once(' ') {
            if let Ok(ts) = DateTime::parse_from_rfc3339(head) {
                return Self {
                    timestamp: Some(ts.with_timezone(&Utc)),
                    message: rest.to_string(),
                };
            }
        }
        Self {
            timestamp: None,
            message: raw.to_string(),
        }
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.message.contains(marker)
    }
}
