//! Ledger storage boundary.
//!
//! A `LedgerStore` persists items, transactions (with their lines), activity
//! records and requester profiles. Writes arrive as a [`UnitOfWork`] that the
//! store must commit atomically and only if every staged aggregate is still at
//! the version it was planned against.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use stockroom_core::{AggregateRoot, ExpectedVersion, ItemId, TransactionId};
use stockroom_events::{ActivityFilter, ActivityRecord};
use stockroom_inventory::Item;
use stockroom_lending::{RequesterProfile, RequesterTouch, Transaction, TransactionFilter};

/// Store operation error.
///
/// These are **infrastructure errors** as opposed to domain errors.
///
/// - **Concurrency**: a staged aggregate moved since it was loaded; replan and retry
/// - **Integrity**: the write would break a cross-row rule (e.g. deleting an item still out on loan)
/// - **Backend**: the backend failed (connection, lock poisoning, corrupt row)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// An aggregate staged for commit together with the version it was planned against.
#[derive(Debug, Clone, PartialEq)]
pub struct Staged<T> {
    pub value: T,
    pub expected: ExpectedVersion,
}

impl<T: AggregateRoot> Staged<T> {
    /// Stage `value` expecting the version it carries (as loaded, or 0 when new).
    pub fn planned(value: T) -> Self {
        let expected = ExpectedVersion::of(&value);
        Self { value, expected }
    }
}

/// A row removal inside a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Rejected with `Integrity` while any active line references the item.
    Item { id: ItemId, expected: ExpectedVersion },
    Transaction { id: TransactionId, expected: ExpectedVersion },
}

/// Everything one engine call writes. Committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOfWork {
    pub items: Vec<Staged<Item>>,
    pub transaction: Option<Staged<Transaction>>,
    pub activities: Vec<ActivityRecord>,
    pub requester: Option<RequesterTouch>,
    pub removals: Vec<Removal>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_item(mut self, item: Item) -> Self {
        self.items.push(Staged::planned(item));
        self
    }

    pub fn stage_items(mut self, items: impl IntoIterator<Item = Item>) -> Self {
        self.items.extend(items.into_iter().map(Staged::planned));
        self
    }

    pub fn stage_transaction(mut self, transaction: Transaction) -> Self {
        self.transaction = Some(Staged::planned(transaction));
        self
    }

    pub fn append(mut self, activities: impl IntoIterator<Item = ActivityRecord>) -> Self {
        self.activities.extend(activities);
        self
    }

    pub fn touch_requester(mut self, touch: RequesterTouch) -> Self {
        self.requester = Some(touch);
        self
    }

    pub fn remove(mut self, removal: Removal) -> Self {
        self.removals.push(removal);
        self
    }

    /// Reject units that stage the same aggregate twice.
    pub(crate) fn check_distinct(&self) -> Result<(), StoreError> {
        for (idx, staged) in self.items.iter().enumerate() {
            let id = staged.value.id_typed();
            if self.items[..idx].iter().any(|s| s.value.id_typed() == id) {
                return Err(StoreError::Integrity(format!(
                    "item {id} staged more than once in one unit of work"
                )));
            }
        }
        Ok(())
    }
}

/// Aggregates as written by a successful commit, stamped with their new versions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Committed {
    pub items: Vec<Item>,
    pub transaction: Option<Transaction>,
}

/// Version an aggregate gets when a unit staged against `current` commits.
pub(crate) fn next_version(current: u64) -> u64 {
    current + 1
}

/// Persistent ledger state.
///
/// Implementations must:
/// - commit a `UnitOfWork` atomically (all rows or none)
/// - reject the whole unit with `Concurrency` if any staged version does not match
/// - treat `ExpectedVersion::Exact(0)` as "must not exist yet"
/// - keep activity records forever, even when the rows they reference are removed
pub trait LedgerStore: Send + Sync {
    fn load_items(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Item>, StoreError>;

    fn load_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;

    fn commit(&self, unit: UnitOfWork) -> Result<Committed, StoreError>;

    fn list_items(&self) -> Result<Vec<Item>, StoreError>;

    /// Matching transactions, newest first.
    fn list_transactions(
        &self,
        filter: &TransactionFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Matching activity records, oldest first.
    fn activities(&self, filter: &ActivityFilter) -> Result<Vec<ActivityRecord>, StoreError>;

    fn requester(&self, name: &str) -> Result<Option<RequesterProfile>, StoreError>;

    /// All profiles ordered by name.
    fn list_requesters(&self) -> Result<Vec<RequesterProfile>, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn load_items(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Item>, StoreError> {
        (**self).load_items(ids)
    }

    fn load_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        (**self).load_transaction(id)
    }

    fn commit(&self, unit: UnitOfWork) -> Result<Committed, StoreError> {
        (**self).commit(unit)
    }

    fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        (**self).list_items()
    }

    fn list_transactions(
        &self,
        filter: &TransactionFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        (**self).list_transactions(filter, now)
    }

    fn activities(&self, filter: &ActivityFilter) -> Result<Vec<ActivityRecord>, StoreError> {
        (**self).activities(filter)
    }

    fn requester(&self, name: &str) -> Result<Option<RequesterProfile>, StoreError> {
        (**self).requester(name)
    }

    fn list_requesters(&self) -> Result<Vec<RequesterProfile>, StoreError> {
        (**self).list_requesters()
    }
}
