//! Reconciliation engine (application-level orchestration).
//!
//! Every mutating call runs the same cycle:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load a snapshot of the rows it touches (items, transaction)
//!   ↓
//! 2. Plan the change purely (domain crates), producing a UnitOfWork
//!   ↓
//! 3. Commit the unit atomically with ExpectedVersion::Exact on every row
//!   ↓
//! 4. On a version conflict, go back to 1 (bounded)
//! ```
//!
//! Domain failures surface on the first attempt and are never retried. A
//! rejected unit leaves the store untouched.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use stockroom_core::{DomainError, ExpectedVersion, ItemId, TransactionId};
use stockroom_events::{ActivityFilter, ActivityRecord};
use stockroom_inventory::{Item, ItemKind, RegisterItem, RestockItem, SetItemCondition, UpdateItem};
use stockroom_lending::{
    plan_checkout, plan_return, return_item_ids, Checkout, RequesterProfile, ReturnItems,
    Transaction, TransactionFilter, TransactionView,
};

use crate::store::{Committed, LedgerStore, Removal, StoreError, UnitOfWork};

pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 8;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Every attempt lost a version race.
    #[error("{operation} gave up after {attempts} conflicting commit attempts")]
    Contention {
        operation: &'static str,
        attempts: u32,
    },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Domain(e) => e.code(),
            EngineError::Contention { .. } => "conflict",
            EngineError::Storage(_) => "storage_error",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Enforces stock and transaction invariants across checkout, return and
/// catalog maintenance. The only component that writes to the ledger.
#[derive(Debug)]
pub struct ReconciliationEngine<S> {
    store: S,
    max_attempts: u32,
}

impl<S> ReconciliationEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_max_attempts(store, DEFAULT_MAX_COMMIT_ATTEMPTS)
    }

    /// `max_attempts` is clamped to at least one.
    pub fn with_max_attempts(store: S, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl<S: LedgerStore> ReconciliationEngine<S> {
    /// Load → plan → commit, replanning on version conflicts.
    fn run_unit<F>(&self, operation: &'static str, mut plan: F) -> EngineResult<Committed>
    where
        F: FnMut(&S) -> EngineResult<UnitOfWork>,
    {
        for attempt in 1..=self.max_attempts {
            let unit = plan(&self.store)?;
            match self.store.commit(unit) {
                Ok(committed) => {
                    info!(operation, attempt, "unit of work committed");
                    return Ok(committed);
                }
                Err(StoreError::Concurrency(reason)) => {
                    warn!(operation, attempt, %reason, "version conflict, replanning");
                }
                Err(StoreError::Integrity(reason)) => {
                    return Err(DomainError::invalid_state(reason).into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        warn!(operation, attempts = self.max_attempts, "giving up after repeated conflicts");
        Err(EngineError::Contention {
            operation,
            attempts: self.max_attempts,
        })
    }

    fn load_item(&self, id: ItemId) -> EngineResult<Item> {
        self.store
            .load_items(&[id])?
            .remove(&id)
            .ok_or_else(|| DomainError::not_found("item", id).into())
    }

    fn load_transaction(&self, id: TransactionId) -> EngineResult<Transaction> {
        self.store
            .load_transaction(id)?
            .ok_or_else(|| DomainError::not_found("transaction", id).into())
    }

    /// Check items out as a material request or a tool borrowing.
    #[instrument(
        skip(self, cmd),
        fields(kind = cmd.kind.as_str(), requester = %cmd.requester_name, lines = cmd.lines.len()),
        err
    )]
    pub fn checkout(&self, cmd: &Checkout) -> EngineResult<Transaction> {
        let committed = self.run_unit("checkout", |store| {
            let items = store.load_items(&cmd.item_ids())?;
            let plan = plan_checkout(cmd, &items)?;
            Ok(UnitOfWork::new()
                .stage_items(plan.items)
                .stage_transaction(plan.transaction)
                .append([plan.activity])
                .touch_requester(plan.requester))
        })?;
        committed_transaction(committed)
    }

    /// Record returned, damaged and lost units against a borrowing.
    #[instrument(
        skip(self, cmd),
        fields(transaction_id = %cmd.transaction_id, lines = cmd.lines.len()),
        err
    )]
    pub fn return_items(&self, cmd: &ReturnItems) -> EngineResult<Transaction> {
        let committed = self.run_unit("return_items", |store| {
            let txn = store
                .load_transaction(cmd.transaction_id)?
                .ok_or_else(|| DomainError::not_found("transaction", cmd.transaction_id))?;
            let items = store.load_items(&return_item_ids(&txn, cmd))?;
            let plan = plan_return(&txn, cmd, &items)?;
            Ok(UnitOfWork::new()
                .stage_items(plan.items)
                .stage_transaction(plan.transaction)
                .append(plan.activities))
        })?;
        committed_transaction(committed)
    }

    #[instrument(skip(self, cmd), fields(name = %cmd.name, kind = cmd.kind.as_str()), err)]
    pub fn register_item(&self, cmd: &RegisterItem) -> EngineResult<Item> {
        let committed = self.run_unit("register_item", |_| {
            Ok(UnitOfWork::new().stage_item(Item::register(cmd)?))
        })?;
        committed_item(committed)
    }

    #[instrument(skip(self, cmd), fields(item_id = %cmd.item_id, quantity = cmd.quantity), err)]
    pub fn restock_item(&self, cmd: &RestockItem) -> EngineResult<Item> {
        let committed = self.run_unit("restock_item", |_| {
            let mut item = self.load_item(cmd.item_id)?;
            item.handle_restock(cmd)?;
            Ok(UnitOfWork::new().stage_item(item))
        })?;
        committed_item(committed)
    }

    #[instrument(skip(self, cmd), fields(item_id = %cmd.item_id, condition = cmd.condition.as_str()), err)]
    pub fn set_item_condition(&self, cmd: &SetItemCondition) -> EngineResult<Item> {
        let committed = self.run_unit("set_item_condition", |_| {
            let mut item = self.load_item(cmd.item_id)?;
            item.handle_set_condition(cmd)?;
            Ok(UnitOfWork::new().stage_item(item))
        })?;
        committed_item(committed)
    }

    #[instrument(skip(self, cmd), fields(item_id = %cmd.item_id), err)]
    pub fn update_item(&self, cmd: &UpdateItem) -> EngineResult<Item> {
        let committed = self.run_unit("update_item", |_| {
            let mut item = self.load_item(cmd.item_id)?;
            item.handle_update(cmd)?;
            Ok(UnitOfWork::new().stage_item(item))
        })?;
        committed_item(committed)
    }

    /// Remove an item from the catalog. Refused while it is out on an active borrowing.
    #[instrument(skip(self), err)]
    pub fn delete_item(&self, item_id: ItemId) -> EngineResult<()> {
        self.run_unit("delete_item", |_| {
            let item = self.load_item(item_id)?;
            Ok(UnitOfWork::new().remove(Removal::Item {
                id: item_id,
                expected: ExpectedVersion::of(&item),
            }))
        })?;
        Ok(())
    }

    /// Remove a resolved transaction and its lines. Activity records are kept.
    #[instrument(skip(self), err)]
    pub fn delete_transaction(&self, transaction_id: TransactionId) -> EngineResult<()> {
        self.run_unit("delete_transaction", |_| {
            let txn = self.load_transaction(transaction_id)?;
            txn.ensure_deletable()?;
            Ok(UnitOfWork::new().remove(Removal::Transaction {
                id: transaction_id,
                expected: ExpectedVersion::of(&txn),
            }))
        })?;
        Ok(())
    }

    // Reads

    pub fn item(&self, item_id: ItemId) -> EngineResult<Item> {
        self.load_item(item_id)
    }

    pub fn items(&self, kind: Option<ItemKind>) -> EngineResult<Vec<Item>> {
        let mut items = self.store.list_items()?;
        if let Some(kind) = kind {
            items.retain(|i| i.kind() == kind);
        }
        Ok(items)
    }

    /// Items at or below their minimum stock.
    pub fn low_stock_items(&self) -> EngineResult<Vec<Item>> {
        let mut items = self.store.list_items()?;
        items.retain(Item::is_low_stock);
        Ok(items)
    }

    pub fn transaction(
        &self,
        transaction_id: TransactionId,
        now: DateTime<Utc>,
    ) -> EngineResult<TransactionView> {
        Ok(TransactionView::at(self.load_transaction(transaction_id)?, now))
    }

    pub fn transactions(
        &self,
        filter: &TransactionFilter,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<TransactionView>> {
        Ok(self
            .store
            .list_transactions(filter, now)?
            .into_iter()
            .map(|t| TransactionView::at(t, now))
            .collect())
    }

    pub fn activities(&self, filter: &ActivityFilter) -> EngineResult<Vec<ActivityRecord>> {
        Ok(self.store.activities(filter)?)
    }

    pub fn requester(&self, name: &str) -> EngineResult<RequesterProfile> {
        self.store
            .requester(name)?
            .ok_or_else(|| DomainError::not_found("requester", name.trim()).into())
    }

    pub fn requesters(&self) -> EngineResult<Vec<RequesterProfile>> {
        Ok(self.store.list_requesters()?)
    }
}

fn committed_transaction(committed: Committed) -> EngineResult<Transaction> {
    committed.transaction.ok_or_else(|| {
        StoreError::Backend("commit did not return the staged transaction".to_string()).into()
    })
}

fn committed_item(committed: Committed) -> EngineResult<Item> {
    committed.items.into_iter().next().ok_or_else(|| {
        StoreError::Backend("commit did not return the staged item".to_string()).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::store::InMemoryLedgerStore;

    /// Store that reports a version conflict for the first `conflicts` commits.
    struct FlakyStore {
        inner: InMemoryLedgerStore,
        conflicts: AtomicU32,
    }

    impl LedgerStore for FlakyStore {
        fn load_items(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Item>, StoreError> {
            self.inner.load_items(ids)
        }

        fn load_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
            self.inner.load_transaction(id)
        }

        fn commit(&self, unit: UnitOfWork) -> Result<Committed, StoreError> {
            let left = self.conflicts.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Concurrency("injected".to_string()));
            }
            self.inner.commit(unit)
        }

        fn list_items(&self) -> Result<Vec<Item>, StoreError> {
            self.inner.list_items()
        }

        fn list_transactions(
            &self,
            filter: &TransactionFilter,
            now: DateTime<Utc>,
        ) -> Result<Vec<Transaction>, StoreError> {
            self.inner.list_transactions(filter, now)
        }

        fn activities(&self, filter: &ActivityFilter) -> Result<Vec<ActivityRecord>, StoreError> {
            self.inner.activities(filter)
        }

        fn requester(&self, name: &str) -> Result<Option<RequesterProfile>, StoreError> {
            self.inner.requester(name)
        }

        fn list_requesters(&self) -> Result<Vec<RequesterProfile>, StoreError> {
            self.inner.list_requesters()
        }
    }

    fn register(kind: ItemKind) -> RegisterItem {
        RegisterItem {
            name: "Tape".to_string(),
            kind,
            initial_stock: 4,
            min_stock: 1,
            unit: None,
            location: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn retries_through_transient_conflicts() {
        let engine = ReconciliationEngine::new(FlakyStore {
            inner: InMemoryLedgerStore::new(),
            conflicts: AtomicU32::new(3),
        });
        let item = engine.register_item(&register(ItemKind::Material)).unwrap();
        assert_eq!(item.available_stock(), 4);
    }

    #[test]
    fn reports_contention_when_attempts_run_out() {
        let engine = ReconciliationEngine::with_max_attempts(
            FlakyStore {
                inner: InMemoryLedgerStore::new(),
                conflicts: AtomicU32::new(10),
            },
            2,
        );
        let err = engine.register_item(&register(ItemKind::Material)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Contention {
                operation: "register_item",
                attempts: 2
            }
        ));
        assert_eq!(err.code(), "conflict");
        assert!(engine.items(None).unwrap().is_empty());
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        let engine = ReconciliationEngine::with_max_attempts(InMemoryLedgerStore::new(), 0);
        assert_eq!(engine.max_attempts(), 1);
    }

    #[test]
    fn missing_item_is_not_found() {
        let engine = ReconciliationEngine::new(InMemoryLedgerStore::new());
        let err = engine.item(ItemId::new()).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
