//! Requester directory: who checks things out and how often.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate usage summary for one requester. Upserted, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterProfile {
    /// Display name as first seen.
    pub name: String,
    pub usage_count: u64,
    pub last_used_at: DateTime<Utc>,
}

/// One checkout's contribution to the directory, committed with the checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterTouch {
    pub name: String,
    pub at: DateTime<Utc>,
}

impl RequesterProfile {
    /// Directory key: names are matched case-insensitively, ignoring surrounding whitespace.
    pub fn key(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn first_use(touch: &RequesterTouch) -> Self {
        Self {
            name: touch.name.trim().to_string(),
            usage_count: 1,
            last_used_at: touch.at,
        }
    }

    pub fn record_use(&mut self, touch: &RequesterTouch) {
        self.usage_count += 1;
        if touch.at > self.last_used_at {
            self.last_used_at = touch.at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn key_ignores_case_and_padding() {
        assert_eq!(RequesterProfile::key("  Ana Souza "), RequesterProfile::key("ana souza"));
    }

    #[test]
    fn record_use_counts_and_keeps_latest_timestamp() {
        let now = Utc::now();
        let mut profile = RequesterProfile::first_use(&RequesterTouch {
            name: " Ana ".to_string(),
            at: now,
        });
        assert_eq!(profile.name, "Ana");

        profile.record_use(&RequesterTouch {
            name: "ana".to_string(),
            at: now - Duration::minutes(5),
        });
        assert_eq!(profile.usage_count, 2);
        assert_eq!(profile.last_used_at, now);
    }
}
