//! Read-side filters over transactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::requester::RequesterProfile;
use crate::transaction::{Transaction, TransactionKind, TransactionStatus};

/// Transaction list filter.
///
/// `overdue_only` is the read-time overdue projection; there is no stored
/// overdue status to filter on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub kind: Option<TransactionKind>,
    /// Matched like requester directory keys (case-insensitive, trimmed).
    pub requester: Option<String>,
    pub overdue_only: bool,
}

impl TransactionFilter {
    pub fn overdue() -> Self {
        Self {
            overdue_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, txn: &Transaction, now: DateTime<Utc>) -> bool {
        if self.status.is_some_and(|s| s != txn.status()) {
            return false;
        }
        if self.kind.is_some_and(|k| k != txn.kind()) {
            return false;
        }
        if let Some(requester) = &self.requester {
            if RequesterProfile::key(requester) != RequesterProfile::key(txn.requester_name()) {
                return false;
            }
        }
        if self.overdue_only && !txn.is_overdue(now) {
            return false;
        }
        true
    }
}

/// A transaction as read, with the overdue projection evaluated at `now`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub is_overdue: bool,
}

impl TransactionView {
    pub fn at(transaction: Transaction, now: DateTime<Utc>) -> Self {
        let is_overdue = transaction.is_overdue(now);
        Self {
            transaction,
            is_overdue,
        }
    }
}

/// Newest first; ties broken by id (time-ordered).
pub fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| {
        b.transaction_date()
            .cmp(&a.transaction_date())
            .then(b.id_typed().cmp(&a.id_typed()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stockroom_core::{ItemId, LineId, TransactionId};
    use stockroom_inventory::ItemCondition;

    use crate::transaction::{LineStatus, StoredTransaction, TransactionLine};

    fn borrowing(requester: &str, date: DateTime<Utc>, due: DateTime<Utc>) -> Transaction {
        let id = TransactionId::new();
        Transaction::restore(StoredTransaction {
            id,
            kind: TransactionKind::Borrowing,
            requester_name: requester.to_string(),
            purpose: "site visit".to_string(),
            transaction_date: date,
            expected_return_date: Some(due),
            return_date: None,
            status: TransactionStatus::Active,
            notes: None,
            lines: vec![TransactionLine {
                id: LineId::new(),
                transaction_id: id,
                item_id: ItemId::new(),
                item_name: "Drill".to_string(),
                quantity: 1,
                returned_quantity: 0,
                damaged_quantity: 0,
                lost_quantity: 0,
                consumed_quantity: 0,
                condition: ItemCondition::Good,
                status: LineStatus::Active,
                notes: None,
            }],
            version: 1,
        })
    }

    #[test]
    fn overdue_filter_uses_read_time() {
        let now = Utc::now();
        let late = borrowing("Ana", now - Duration::days(3), now - Duration::days(1));
        let on_time = borrowing("Ana", now - Duration::days(1), now + Duration::days(1));

        let filter = TransactionFilter::overdue();
        assert!(filter.matches(&late, now));
        assert!(!filter.matches(&on_time, now));
        // The same transaction is not overdue before its due date.
        assert!(!filter.matches(&late, now - Duration::days(2)));
        assert_eq!(late.status(), TransactionStatus::Active);
    }

    #[test]
    fn requester_filter_is_case_insensitive() {
        let now = Utc::now();
        let txn = borrowing("Ana Souza", now, now + Duration::days(1));
        let filter = TransactionFilter {
            requester: Some(" ana souza".to_string()),
            ..TransactionFilter::default()
        };
        assert!(filter.matches(&txn, now));

        let other = TransactionFilter {
            requester: Some("Bruno".to_string()),
            ..TransactionFilter::default()
        };
        assert!(!other.matches(&txn, now));
    }

    #[test]
    fn status_and_kind_filters() {
        let now = Utc::now();
        let txn = borrowing("Ana", now, now + Duration::days(1));
        let returned = TransactionFilter {
            status: Some(TransactionStatus::Returned),
            ..TransactionFilter::default()
        };
        assert!(!returned.matches(&txn, now));

        let borrowings = TransactionFilter {
            kind: Some(TransactionKind::Borrowing),
            status: Some(TransactionStatus::Active),
            ..TransactionFilter::default()
        };
        assert!(borrowings.matches(&txn, now));
    }

    #[test]
    fn newest_first_ordering() {
        let now = Utc::now();
        let older = borrowing("Ana", now - Duration::hours(2), now + Duration::days(1));
        let newer = borrowing("Ana", now - Duration::hours(1), now + Duration::days(1));
        let mut list = vec![older.clone(), newer.clone()];
        sort_newest_first(&mut list);
        assert_eq!(list[0].id_typed(), newer.id_typed());
        assert_eq!(list[1].id_typed(), older.id_typed());
    }

    #[test]
    fn view_flags_overdue() {
        let now = Utc::now();
        let late = borrowing("Ana", now - Duration::days(3), now - Duration::days(1));
        assert!(TransactionView::at(late, now).is_overdue);
    }
}
