use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use stockroom_core::{AggregateRoot, ExpectedVersion, ItemId, TransactionId};
use stockroom_events::{ActivityFilter, ActivityRecord};
use stockroom_inventory::Item;
use stockroom_lending::{
    sort_newest_first, RequesterProfile, Transaction, TransactionFilter, TransactionStatus,
};

use super::{next_version, Committed, LedgerStore, Removal, StoreError, UnitOfWork};

#[derive(Debug, Default)]
struct Ledger {
    items: HashMap<ItemId, Item>,
    transactions: HashMap<TransactionId, Transaction>,
    activities: Vec<ActivityRecord>,
    /// Keyed by `RequesterProfile::key`.
    requesters: HashMap<String, RequesterProfile>,
}

impl Ledger {
    fn item_version(&self, id: ItemId) -> u64 {
        self.items.get(&id).map(|i| i.version()).unwrap_or(0)
    }

    fn transaction_version(&self, id: TransactionId) -> u64 {
        self.transactions.get(&id).map(|t| t.version()).unwrap_or(0)
    }

    fn item_on_loan(&self, id: ItemId) -> bool {
        self.transactions
            .values()
            .any(|t| t.status() == TransactionStatus::Active && t.references_item(id))
    }

    /// Every check a unit must pass, run before anything is written.
    fn validate(&self, unit: &UnitOfWork) -> Result<(), StoreError> {
        unit.check_distinct()?;

        for staged in &unit.items {
            let id = staged.value.id_typed();
            let current = self.item_version(id);
            if !staged.expected.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "item {id}: expected {:?}, found {current}",
                    staged.expected
                )));
            }
        }

        if let Some(staged) = &unit.transaction {
            let id = staged.value.id_typed();
            let current = self.transaction_version(id);
            if !staged.expected.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "transaction {id}: expected {:?}, found {current}",
                    staged.expected
                )));
            }
        }

        for removal in &unit.removals {
            match *removal {
                Removal::Item { id, expected } => {
                    check_removal("item", id, expected, self.items.get(&id).map(|i| i.version()))?;
                    if self.item_on_loan(id) {
                        return Err(StoreError::Integrity(format!(
                            "item {id} is referenced by an active transaction"
                        )));
                    }
                }
                Removal::Transaction { id, expected } => {
                    check_removal(
                        "transaction",
                        id,
                        expected,
                        self.transactions.get(&id).map(|t| t.version()),
                    )?;
                }
            }
        }

        Ok(())
    }
}

fn check_removal(
    entity: &str,
    id: impl core::fmt::Display,
    expected: ExpectedVersion,
    current: Option<u64>,
) -> Result<(), StoreError> {
    match current {
        None => Err(StoreError::Concurrency(format!("{entity} {id} no longer exists"))),
        Some(v) if !expected.matches(v) => Err(StoreError::Concurrency(format!(
            "{entity} {id}: expected {expected:?}, found {v}"
        ))),
        Some(_) => Ok(()),
    }
}

/// In-memory ledger store.
///
/// One lock guards the whole ledger, so a unit of work is validated and
/// applied under a single write guard. Intended for tests/dev and
/// single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    ledger: RwLock<Ledger>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

impl LedgerStore for InMemoryLedgerStore {
    fn load_items(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Item>, StoreError> {
        let ledger = self.ledger.read().map_err(poisoned)?;
        Ok(ids
            .iter()
            .filter_map(|id| ledger.items.get(id).map(|item| (*id, item.clone())))
            .collect())
    }

    fn load_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        let ledger = self.ledger.read().map_err(poisoned)?;
        Ok(ledger.transactions.get(&id).cloned())
    }

    fn commit(&self, unit: UnitOfWork) -> Result<Committed, StoreError> {
        let mut ledger = self.ledger.write().map_err(poisoned)?;
        ledger.validate(&unit)?;

        // Nothing below can fail: the unit is applied in full.
        let mut committed = Committed::default();

        for staged in unit.items {
            let version = next_version(ledger.item_version(staged.value.id_typed()));
            let item = staged.value.committed(version);
            ledger.items.insert(item.id_typed(), item.clone());
            committed.items.push(item);
        }

        if let Some(staged) = unit.transaction {
            let version = next_version(ledger.transaction_version(staged.value.id_typed()));
            let txn = staged.value.committed(version);
            ledger.transactions.insert(txn.id_typed(), txn.clone());
            committed.transaction = Some(txn);
        }

        for removal in unit.removals {
            match removal {
                Removal::Item { id, .. } => {
                    ledger.items.remove(&id);
                }
                Removal::Transaction { id, .. } => {
                    ledger.transactions.remove(&id);
                }
            }
        }

        if let Some(touch) = unit.requester {
            ledger
                .requesters
                .entry(RequesterProfile::key(&touch.name))
                .and_modify(|p| p.record_use(&touch))
                .or_insert_with(|| RequesterProfile::first_use(&touch));
        }

        ledger.activities.extend(unit.activities);

        Ok(committed)
    }

    fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let ledger = self.ledger.read().map_err(poisoned)?;
        let mut items: Vec<Item> = ledger.items.values().cloned().collect();
        items.sort_by(|a, b| a.name().cmp(b.name()).then(a.id_typed().cmp(&b.id_typed())));
        Ok(items)
    }

    fn list_transactions(
        &self,
        filter: &TransactionFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let ledger = self.ledger.read().map_err(poisoned)?;
        let mut out: Vec<Transaction> = ledger
            .transactions
            .values()
            .filter(|t| filter.matches(t, now))
            .cloned()
            .collect();
        sort_newest_first(&mut out);
        Ok(out)
    }

    fn activities(&self, filter: &ActivityFilter) -> Result<Vec<ActivityRecord>, StoreError> {
        let ledger = self.ledger.read().map_err(poisoned)?;
        Ok(filter.apply(&ledger.activities))
    }

    fn requester(&self, name: &str) -> Result<Option<RequesterProfile>, StoreError> {
        let ledger = self.ledger.read().map_err(poisoned)?;
        Ok(ledger.requesters.get(&RequesterProfile::key(name)).cloned())
    }

    fn list_requesters(&self) -> Result<Vec<RequesterProfile>, StoreError> {
        let ledger = self.ledger.read().map_err(poisoned)?;
        let mut out: Vec<RequesterProfile> = ledger.requesters.values().cloned().collect();
        out.sort_by_key(|p| RequesterProfile::key(&p.name));
        Ok(out)
    }
}
