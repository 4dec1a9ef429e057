//! Append-only activity log records.
//!
//! An `ActivityRecord` is written in the same unit of work as the stock or
//! transaction change it describes. Records hold weak references (plain ids)
//! to transactions and items; they never keep those alive and are never
//! removed when those are deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockroom_core::{ActivityId, DomainError, ItemId, TransactionId};

use crate::event::Event;

/// What kind of state change an activity record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    CheckedOut,
    Returned,
    Damaged,
    Lost,
    Consumed,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 5] = [
        ActivityKind::CheckedOut,
        ActivityKind::Returned,
        ActivityKind::Damaged,
        ActivityKind::Lost,
        ActivityKind::Consumed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::CheckedOut => "checked_out",
            ActivityKind::Returned => "returned",
            ActivityKind::Damaged => "damaged",
            ActivityKind::Lost => "lost",
            ActivityKind::Consumed => "consumed",
        }
    }
}

impl core::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ActivityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ActivityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == needle)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "unknown activity kind '{s}' (expected one of: checked_out, returned, damaged, lost, consumed)"
                ))
            })
    }
}

/// Immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: ActivityId,
    pub kind: ActivityKind,
    pub transaction_id: Option<TransactionId>,
    pub item_id: Option<ItemId>,
    /// Who caused the change (the requester for checkouts and returns).
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
    /// Snapshot of quantities, before/after stock and free-form context.
    pub metadata: JsonValue,
}

impl ActivityRecord {
    pub fn new(
        kind: ActivityKind,
        actor: impl Into<String>,
        occurred_at: DateTime<Utc>,
        metadata: JsonValue,
    ) -> Self {
        Self {
            id: ActivityId::new(),
            kind,
            transaction_id: None,
            item_id: None,
            actor: actor.into(),
            occurred_at,
            metadata,
        }
    }

    pub fn for_transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn for_item(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }
}

impl Event for ActivityRecord {
    fn event_type(&self) -> &'static str {
        match self.kind {
            ActivityKind::CheckedOut => "activity.checked_out",
            ActivityKind::Returned => "activity.returned",
            ActivityKind::Damaged => "activity.damaged",
            ActivityKind::Lost => "activity.lost",
            ActivityKind::Consumed => "activity.consumed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Read-side filter over the activity stream.
///
/// `from` is inclusive, `to` is exclusive. An empty `kinds` list matches every kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub kinds: Vec<ActivityKind>,
    pub item_id: Option<ItemId>,
    pub transaction_id: Option<TransactionId>,
}

impl ActivityFilter {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: ActivityKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn matches(&self, record: &ActivityRecord) -> bool {
        if let Some(from) = self.from {
            if record.occurred_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.occurred_at >= to {
                return false;
            }
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&record.kind) {
            return false;
        }
        if self.item_id.is_some() && record.item_id != self.item_id {
            return false;
        }
        if self.transaction_id.is_some() && record.transaction_id != self.transaction_id {
            return false;
        }
        true
    }

    /// Filter and order records by `occurred_at` (ties broken by id, which is time-ordered).
    pub fn apply<'a>(&self, records: impl IntoIterator<Item = &'a ActivityRecord>) -> Vec<ActivityRecord> {
        let mut out: Vec<ActivityRecord> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then(a.id.cmp(&b.id)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap()
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("CHECKED_OUT".parse::<ActivityKind>().unwrap(), ActivityKind::CheckedOut);
        assert_eq!(" lost ".parse::<ActivityKind>().unwrap(), ActivityKind::Lost);
        assert!("overdue".parse::<ActivityKind>().is_err());
    }

    #[test]
    fn filter_range_is_half_open() {
        let inside = ActivityRecord::new(ActivityKind::Returned, "ana", at(2), json!({}));
        let at_end = ActivityRecord::new(ActivityKind::Returned, "ana", at(3), json!({}));
        let filter = ActivityFilter::between(at(2), at(3));
        assert!(filter.matches(&inside));
        assert!(!filter.matches(&at_end));
    }

    #[test]
    fn apply_filters_by_kind_and_orders_by_time() {
        let item = ItemId::new();
        let later = ActivityRecord::new(ActivityKind::Damaged, "ana", at(5), json!({})).for_item(item);
        let earlier = ActivityRecord::new(ActivityKind::Damaged, "bo", at(4), json!({})).for_item(item);
        let other = ActivityRecord::new(ActivityKind::Lost, "bo", at(4) + Duration::hours(1), json!({}));

        let records = vec![later.clone(), other, earlier.clone()];
        let out = ActivityFilter::default()
            .with_kind(ActivityKind::Damaged)
            .apply(&records);

        assert_eq!(out, vec![earlier, later]);
    }

    #[test]
    fn event_type_follows_kind() {
        let r = ActivityRecord::new(ActivityKind::Consumed, "ana", at(1), json!({}));
        assert_eq!(r.event_type(), "activity.consumed");
        assert_eq!(Event::occurred_at(&r), at(1));
    }
}
