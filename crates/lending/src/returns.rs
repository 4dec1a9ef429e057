//! Return / disposition planning (pure).
//!
//! Every line of a return call is validated before any line is changed: a
//! call mixing a valid line with an over-quota one is rejected as a whole.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use stockroom_core::{DomainError, DomainResult, ItemId, LineId, TransactionId};
use stockroom_events::{ActivityKind, ActivityRecord};
use stockroom_inventory::{Item, ItemCondition};

use crate::transaction::{Disposition, Transaction, TransactionKind, TransactionStatus};

/// Disposition of one line in a return call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub line_id: LineId,
    pub returned: u32,
    pub damaged: u32,
    pub lost: u32,
    /// Condition observed at return; derived from the counters when absent.
    pub condition: Option<ItemCondition>,
    pub notes: Option<String>,
}

impl ReturnLine {
    pub fn disposition(&self) -> Disposition {
        Disposition {
            returned: self.returned,
            damaged: self.damaged,
            lost: self.lost,
        }
    }

    fn observed_condition(&self) -> ItemCondition {
        self.condition.unwrap_or(if self.damaged > 0 {
            ItemCondition::Damaged
        } else if self.lost > 0 {
            ItemCondition::Lost
        } else {
            ItemCondition::Good
        })
    }
}

/// Command: ReturnItems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItems {
    pub transaction_id: TransactionId,
    pub lines: Vec<ReturnLine>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Everything one return call writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnPlan {
    /// Updated transaction; version is still the loaded one.
    pub transaction: Transaction,
    /// Items whose stock or condition changed; versions are still the loaded ones.
    pub items: Vec<Item>,
    pub activities: Vec<ActivityRecord>,
}

/// Item ids the return call will touch (needed to load the snapshot).
pub fn return_item_ids(txn: &Transaction, cmd: &ReturnItems) -> Vec<ItemId> {
    let mut ids = Vec::new();
    for entry in &cmd.lines {
        if let Some(line) = txn.line(entry.line_id) {
            if !ids.contains(&line.item_id) {
                ids.push(line.item_id);
            }
        }
    }
    ids
}

/// Validate `cmd` against the loaded transaction and items, then build the plan.
pub fn plan_return(
    txn: &Transaction,
    cmd: &ReturnItems,
    items: &HashMap<ItemId, Item>,
) -> DomainResult<ReturnPlan> {
    if txn.id_typed() != cmd.transaction_id {
        return Err(DomainError::validation("transaction_id mismatch"));
    }
    if txn.kind() != TransactionKind::Borrowing {
        return Err(DomainError::invalid_state(format!(
            "transaction {} is a material request; consumed materials are never returned",
            txn.id_typed()
        )));
    }
    if txn.status() != TransactionStatus::Active {
        return Err(DomainError::invalid_state(format!(
            "transaction {} is {} and cannot be processed again",
            txn.id_typed(),
            txn.status().as_str()
        )));
    }
    if cmd.lines.is_empty() {
        return Err(DomainError::validation("return needs at least one line"));
    }

    let mut seen = HashSet::new();
    for entry in &cmd.lines {
        if !seen.insert(entry.line_id) {
            return Err(DomainError::validation(format!(
                "line {} appears more than once",
                entry.line_id
            )));
        }
        if entry.disposition().is_empty() {
            return Err(DomainError::validation(format!(
                "line {} resolves no units",
                entry.line_id
            )));
        }
    }

    for entry in &cmd.lines {
        let line = txn
            .line(entry.line_id)
            .ok_or_else(|| DomainError::not_found("transaction line", entry.line_id))?;
        let requested = entry.disposition().total();
        if requested > line.remaining() as u64 {
            return Err(DomainError::OverReturn {
                line: line.id.to_string(),
                item: line.item_name.clone(),
                requested: u32::try_from(requested).unwrap_or(u32::MAX),
                remaining: line.remaining(),
            });
        }
        if !items.contains_key(&line.item_id) {
            return Err(DomainError::not_found("item", line.item_id));
        }
    }

    let mut updated = txn.clone();
    let mut touched: Vec<Item> = return_item_ids(txn, cmd)
        .iter()
        .map(|id| items[id].clone())
        .collect();
    let mut activities = Vec::new();
    let mut summary = Vec::with_capacity(cmd.lines.len());
    let actor = txn.requester_name().to_string();

    for entry in &cmd.lines {
        let line = updated
            .line_mut(entry.line_id)
            .ok_or_else(|| DomainError::not_found("transaction line", entry.line_id))?;
        line.apply_disposition(&entry.disposition())?;
        line.condition = entry.observed_condition();
        if let Some(notes) = entry.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            line.notes = Some(notes.to_string());
        }

        let item = touched
            .iter_mut()
            .find(|i| i.id_typed() == line.item_id)
            .ok_or_else(|| DomainError::not_found("item", line.item_id))?;
        let stock_before = item.available_stock();
        item.restock(entry.returned, cmd.occurred_at)?;
        if entry.damaged > 0 {
            item.set_condition(ItemCondition::Damaged, cmd.occurred_at);
        }

        summary.push(json!({
            "line_id": line.id,
            "item_id": line.item_id,
            "item_name": line.item_name,
            "returned": entry.returned,
            "damaged": entry.damaged,
            "lost": entry.lost,
            "remaining": line.remaining(),
            "stock_before": stock_before,
            "stock_after": item.available_stock(),
        }));

        if entry.damaged > 0 {
            activities.push(
                ActivityRecord::new(
                    ActivityKind::Damaged,
                    actor.clone(),
                    cmd.occurred_at,
                    json!({
                        "line_id": line.id,
                        "item_name": line.item_name,
                        "quantity": entry.damaged,
                        "notes": line.notes,
                    }),
                )
                .for_transaction(txn.id_typed())
                .for_item(line.item_id),
            );
        }
        if entry.lost > 0 {
            activities.push(
                ActivityRecord::new(
                    ActivityKind::Lost,
                    actor.clone(),
                    cmd.occurred_at,
                    json!({
                        "line_id": line.id,
                        "item_name": line.item_name,
                        "quantity": entry.lost,
                        "notes": line.notes,
                    }),
                )
                .for_transaction(txn.id_typed())
                .for_item(line.item_id),
            );
        }
    }

    if let Some(notes) = cmd.notes.as_deref() {
        updated.append_notes(notes);
    }
    updated.settle(cmd.occurred_at);

    let mut summary_record = ActivityRecord::new(
        ActivityKind::Returned,
        actor,
        cmd.occurred_at,
        json!({
            "transaction_status": updated.status().as_str(),
            "notes": cmd.notes,
            "lines": summary,
        }),
    )
    .for_transaction(txn.id_typed());
    if let [only] = touched.as_slice() {
        summary_record = summary_record.for_item(only.id_typed());
    }
    activities.insert(0, summary_record);

    Ok(ReturnPlan {
        transaction: updated,
        items: touched,
        activities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use stockroom_inventory::{ItemKind, RegisterItem};

    use crate::checkout::{plan_checkout, Checkout, CheckoutLine};
    use crate::transaction::LineStatus;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn tool(name: &str, stock: u32) -> Item {
        Item::register(&RegisterItem {
            name: name.to_string(),
            kind: ItemKind::Tool,
            initial_stock: stock,
            min_stock: 0,
            unit: None,
            location: None,
            occurred_at: test_time(),
        })
        .unwrap()
    }

    /// Borrow `qty` of each tool; returns the open transaction and post-checkout items.
    fn borrowed(tools: &[(&Item, u32)]) -> (Transaction, HashMap<ItemId, Item>) {
        let now = test_time();
        let catalog: HashMap<ItemId, Item> = tools
            .iter()
            .map(|(i, _)| (i.id_typed(), (*i).clone()))
            .collect();
        let cmd = Checkout {
            requester_name: "Ana".to_string(),
            purpose: "Install".to_string(),
            kind: TransactionKind::Borrowing,
            expected_return_date: Some(now + Duration::days(1)),
            notes: None,
            lines: tools
                .iter()
                .map(|(i, q)| CheckoutLine { item_id: i.id_typed(), quantity: *q })
                .collect(),
            occurred_at: now,
        };
        let plan = plan_checkout(&cmd, &catalog).unwrap();
        let items = plan.items.into_iter().map(|i| (i.id_typed(), i)).collect();
        (plan.transaction, items)
    }

    fn entry(line_id: LineId, returned: u32, damaged: u32, lost: u32) -> ReturnLine {
        ReturnLine {
            line_id,
            returned,
            damaged,
            lost,
            condition: None,
            notes: None,
        }
    }

    fn ret(txn: &Transaction, lines: Vec<ReturnLine>) -> ReturnItems {
        ReturnItems {
            transaction_id: txn.id_typed(),
            lines,
            notes: None,
            occurred_at: test_time(),
        }
    }

    fn merge(items: &mut HashMap<ItemId, Item>, plan: &ReturnPlan) {
        for i in &plan.items {
            items.insert(i.id_typed(), i.clone());
        }
    }

    #[test]
    fn partial_return_keeps_line_and_transaction_active() {
        let drill = tool("Drill", 10);
        let (txn, items) = borrowed(&[(&drill, 3)]);
        let line_id = txn.lines()[0].id;

        let plan = plan_return(&txn, &ret(&txn, vec![entry(line_id, 2, 0, 0)]), &items).unwrap();

        let line = plan.transaction.line(line_id).unwrap();
        assert_eq!(line.returned_quantity, 2);
        assert_eq!(line.status, LineStatus::Active);
        assert_eq!(plan.transaction.status(), TransactionStatus::Active);
        assert_eq!(plan.items[0].available_stock(), 9);
        assert_eq!(plan.activities.len(), 1);
        assert_eq!(plan.activities[0].kind, ActivityKind::Returned);
    }

    #[test]
    fn damaged_remainder_settles_without_restocking() {
        let drill = tool("Drill", 10);
        let (txn, mut items) = borrowed(&[(&drill, 3)]);
        let line_id = txn.lines()[0].id;

        let first = plan_return(&txn, &ret(&txn, vec![entry(line_id, 2, 0, 0)]), &items).unwrap();
        merge(&mut items, &first);

        let second_cmd = ret(&first.transaction, vec![entry(line_id, 0, 1, 0)]);
        let second = plan_return(&first.transaction, &second_cmd, &items).unwrap();

        let line = second.transaction.line(line_id).unwrap();
        assert_eq!(line.resolved(), 3);
        assert_eq!(line.status, LineStatus::Returned);
        assert_eq!(line.condition, ItemCondition::Damaged);
        assert_eq!(second.items[0].available_stock(), 9);
        assert_eq!(second.items[0].condition(), ItemCondition::Damaged);
        assert_eq!(second.transaction.status(), TransactionStatus::Returned);
        assert_eq!(second.transaction.return_date(), Some(second_cmd.occurred_at));

        let kinds: Vec<_> = second.activities.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActivityKind::Returned, ActivityKind::Damaged]);
    }

    #[test]
    fn lost_units_get_their_own_activity() {
        let drill = tool("Drill", 5);
        let (txn, items) = borrowed(&[(&drill, 2)]);
        let line_id = txn.lines()[0].id;

        let plan = plan_return(&txn, &ret(&txn, vec![entry(line_id, 0, 1, 1)]), &items).unwrap();
        let kinds: Vec<_> = plan.activities.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![ActivityKind::Returned, ActivityKind::Damaged, ActivityKind::Lost]
        );
        assert_eq!(plan.items[0].available_stock(), 3);
    }

    #[test]
    fn one_bad_line_rejects_whole_call() {
        let drill = tool("Drill", 10);
        let saw = tool("Saw", 10);
        let (txn, items) = borrowed(&[(&drill, 3), (&saw, 1)]);
        let drill_line = txn.lines()[0].id;
        let saw_line = txn.lines()[1].id;

        let err = plan_return(
            &txn,
            &ret(&txn, vec![entry(drill_line, 1, 0, 0), entry(saw_line, 2, 0, 0)]),
            &items,
        )
        .unwrap_err();

        match err {
            DomainError::OverReturn { item, requested, remaining, .. } => {
                assert_eq!(item, "Saw");
                assert_eq!(requested, 2);
                assert_eq!(remaining, 1);
            }
            other => panic!("expected OverReturn, got {other:?}"),
        }
    }

    #[test]
    fn settled_transaction_is_invalid_state() {
        let drill = tool("Drill", 10);
        let (txn, mut items) = borrowed(&[(&drill, 1)]);
        let line_id = txn.lines()[0].id;
        let plan = plan_return(&txn, &ret(&txn, vec![entry(line_id, 1, 0, 0)]), &items).unwrap();
        merge(&mut items, &plan);

        let err = plan_return(
            &plan.transaction,
            &ret(&plan.transaction, vec![entry(line_id, 1, 0, 0)]),
            &items,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn material_request_cannot_be_returned() {
        let cable = Item::register(&RegisterItem {
            name: "Cable".to_string(),
            kind: ItemKind::Material,
            initial_stock: 100,
            min_stock: 0,
            unit: Some("m".to_string()),
            location: None,
            occurred_at: test_time(),
        })
        .unwrap();
        let catalog: HashMap<ItemId, Item> = [(cable.id_typed(), cable.clone())].into();
        let plan = plan_checkout(
            &Checkout {
                requester_name: "Bo".to_string(),
                purpose: "Wiring".to_string(),
                kind: TransactionKind::Request,
                expected_return_date: None,
                notes: None,
                lines: vec![CheckoutLine { item_id: cable.id_typed(), quantity: 10 }],
                occurred_at: test_time(),
            },
            &catalog,
        )
        .unwrap();

        let txn = plan.transaction;
        let line_id = txn.lines()[0].id;
        let err = plan_return(&txn, &ret(&txn, vec![entry(line_id, 1, 0, 0)]), &catalog).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn foreign_line_is_not_found_and_duplicates_are_invalid() {
        let drill = tool("Drill", 10);
        let (txn, items) = borrowed(&[(&drill, 3)]);
        let line_id = txn.lines()[0].id;

        let err = plan_return(&txn, &ret(&txn, vec![entry(LineId::new(), 1, 0, 0)]), &items)
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "transaction line", .. }));

        let err = plan_return(
            &txn,
            &ret(&txn, vec![entry(line_id, 1, 0, 0), entry(line_id, 1, 0, 0)]),
            &items,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = plan_return(&txn, &ret(&txn, vec![entry(line_id, 0, 0, 0)]), &items).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any sequence of return calls the line never resolves
        /// more than it lent, and once settled the item gained exactly the
        /// returned units (never damaged or lost ones).
        #[test]
        fn dispositions_are_conserved(
            quantity in 1u32..20,
            calls in prop::collection::vec((0u32..6, 0u32..3, 0u32..3), 1..30)
        ) {
            let drill = tool("Drill", 50);
            let (mut txn, mut items) = borrowed(&[(&drill, quantity)]);
            let line_id = txn.lines()[0].id;
            let stock_after_checkout = items[&drill.id_typed()].available_stock();

            for (returned, damaged, lost) in calls {
                if txn.status() != TransactionStatus::Active {
                    break;
                }
                let cmd = ret(&txn, vec![entry(line_id, returned, damaged, lost)]);
                match plan_return(&txn, &cmd, &items) {
                    Ok(plan) => {
                        merge(&mut items, &plan);
                        txn = plan.transaction;
                    }
                    Err(DomainError::OverReturn { .. }) | Err(DomainError::Validation(_)) => {}
                    Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                }

                let line = txn.line(line_id).unwrap();
                prop_assert!(line.resolved() <= line.quantity);
            }

            let line = txn.line(line_id).unwrap();
            let gained = items[&drill.id_typed()].available_stock() - stock_after_checkout;
            prop_assert_eq!(gained, line.returned_quantity);
            if txn.status() == TransactionStatus::Returned {
                prop_assert_eq!(line.resolved(), line.quantity);
            }
        }
    }
}
