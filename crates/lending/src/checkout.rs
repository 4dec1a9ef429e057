//! Checkout planning (pure).
//!
//! `plan_checkout` validates a checkout against a snapshot of the items it
//! touches and returns everything the unit of work must write. It never
//! mutates its inputs; the caller commits the plan atomically or drops it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use stockroom_core::{DomainError, DomainResult, ItemId, LineId, TransactionId};
use stockroom_events::{ActivityKind, ActivityRecord};
use stockroom_inventory::{ensure_within_limit, Item, ItemCondition};

use crate::requester::RequesterTouch;
use crate::transaction::{LineStatus, Transaction, TransactionKind, TransactionLine};

/// One requested `{item, quantity}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub item_id: ItemId,
    pub quantity: u32,
}

/// Command: Checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub requester_name: String,
    pub purpose: String,
    pub kind: TransactionKind,
    pub expected_return_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub lines: Vec<CheckoutLine>,
    pub occurred_at: DateTime<Utc>,
}

impl Checkout {
    /// Distinct item ids in request order.
    pub fn item_ids(&self) -> Vec<ItemId> {
        let mut ids = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            if !ids.contains(&line.item_id) {
                ids.push(line.item_id);
            }
        }
        ids
    }
}

/// Everything one checkout writes.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutPlan {
    pub transaction: Transaction,
    /// Touched items with stock already decremented; versions are still the loaded ones.
    pub items: Vec<Item>,
    pub activity: ActivityRecord,
    pub requester: RequesterTouch,
}

/// Validate `cmd` against `items` and build the plan.
///
/// Checks run in a fixed order and the first failure wins: request shape,
/// item existence, item kind, then stock.
pub fn plan_checkout(cmd: &Checkout, items: &HashMap<ItemId, Item>) -> DomainResult<CheckoutPlan> {
    validate_shape(cmd)?;

    let ids = cmd.item_ids();
    for id in &ids {
        if !items.contains_key(id) {
            return Err(DomainError::not_found("item", id));
        }
    }

    let expected_kind = cmd.kind.item_kind();
    for id in &ids {
        let item = &items[id];
        if item.kind() != expected_kind {
            return Err(DomainError::validation(format!(
                "item '{}' is a {} and cannot be used in a {} transaction",
                item.name(),
                item.kind().as_str(),
                cmd.kind.as_str()
            )));
        }
    }

    for id in &ids {
        let item = &items[id];
        let requested: u64 = cmd
            .lines
            .iter()
            .filter(|l| l.item_id == *id)
            .map(|l| l.quantity as u64)
            .sum();
        if requested > item.available_stock() as u64 {
            return Err(DomainError::InsufficientStock {
                item: item.name().to_string(),
                requested: u32::try_from(requested).unwrap_or(u32::MAX),
                available: item.available_stock(),
            });
        }
    }

    let transaction_id = TransactionId::new();
    let mut touched: Vec<Item> = ids.iter().map(|id| items[id].clone()).collect();
    let mut lines = Vec::with_capacity(cmd.lines.len());
    let mut summary = Vec::with_capacity(cmd.lines.len());

    for requested in &cmd.lines {
        let item = touched
            .iter_mut()
            .find(|i| i.id_typed() == requested.item_id)
            .ok_or_else(|| DomainError::not_found("item", requested.item_id))?;

        let stock_before = item.available_stock();
        item.withdraw(requested.quantity, cmd.occurred_at)?;

        let (consumed, status) = match cmd.kind {
            TransactionKind::Request => (requested.quantity, LineStatus::Consumed),
            TransactionKind::Borrowing => (0, LineStatus::Active),
        };

        let line = TransactionLine {
            id: LineId::new(),
            transaction_id,
            item_id: requested.item_id,
            item_name: item.name().to_string(),
            quantity: requested.quantity,
            returned_quantity: 0,
            damaged_quantity: 0,
            lost_quantity: 0,
            consumed_quantity: consumed,
            condition: ItemCondition::Good,
            status,
            notes: None,
        };

        summary.push(json!({
            "line_id": line.id,
            "item_id": line.item_id,
            "item_name": line.item_name,
            "quantity": line.quantity,
            "stock_before": stock_before,
            "stock_after": item.available_stock(),
        }));
        lines.push(line);
    }

    let requester_name = cmd.requester_name.trim().to_string();
    let purpose = cmd.purpose.trim().to_string();
    let notes = cmd
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    let transaction = Transaction::open(
        transaction_id,
        cmd.kind,
        requester_name.clone(),
        purpose.clone(),
        cmd.occurred_at,
        cmd.expected_return_date,
        notes,
        lines,
    );

    let activity_kind = match cmd.kind {
        TransactionKind::Request => ActivityKind::Consumed,
        TransactionKind::Borrowing => ActivityKind::CheckedOut,
    };
    let mut activity = ActivityRecord::new(
        activity_kind,
        requester_name.clone(),
        cmd.occurred_at,
        json!({
            "kind": cmd.kind.as_str(),
            "requester": requester_name,
            "purpose": purpose,
            "expected_return_date": cmd.expected_return_date,
            "lines": summary,
        }),
    )
    .for_transaction(transaction_id);
    if let [only] = ids.as_slice() {
        activity = activity.for_item(*only);
    }

    Ok(CheckoutPlan {
        transaction,
        items: touched,
        activity,
        requester: RequesterTouch {
            name: requester_name,
            at: cmd.occurred_at,
        },
    })
}

fn validate_shape(cmd: &Checkout) -> DomainResult<()> {
    if cmd.requester_name.trim().is_empty() {
        return Err(DomainError::validation("requester name cannot be empty"));
    }
    if cmd.purpose.trim().is_empty() {
        return Err(DomainError::validation("purpose cannot be empty"));
    }
    if cmd.lines.is_empty() {
        return Err(DomainError::validation("checkout needs at least one line"));
    }
    if let Some(line) = cmd.lines.iter().find(|l| l.quantity == 0) {
        return Err(DomainError::validation(format!(
            "quantity for item {} must be positive",
            line.item_id
        )));
    }
    for line in &cmd.lines {
        ensure_within_limit("quantity", u64::from(line.quantity))?;
    }

    match (cmd.kind, cmd.expected_return_date) {
        (TransactionKind::Borrowing, None) => Err(DomainError::validation(
            "borrowing requires an expected return date",
        )),
        (TransactionKind::Borrowing, Some(due)) if due <= cmd.occurred_at => Err(
            DomainError::validation("expected return date must be in the future"),
        ),
        (TransactionKind::Request, Some(_)) => Err(DomainError::validation(
            "material requests are consumed and take no expected return date",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stockroom_core::AggregateRoot;
    use stockroom_inventory::{ItemKind, RegisterItem, MAX_STOCK};

    use crate::transaction::TransactionStatus;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn item(name: &str, kind: ItemKind, stock: u32) -> Item {
        Item::register(&RegisterItem {
            name: name.to_string(),
            kind,
            initial_stock: stock,
            min_stock: 0,
            unit: None,
            location: None,
            occurred_at: test_time(),
        })
        .unwrap()
    }

    fn catalog(items: &[&Item]) -> HashMap<ItemId, Item> {
        items.iter().map(|i| (i.id_typed(), (*i).clone())).collect()
    }

    fn borrow(item_id: ItemId, quantity: u32) -> Checkout {
        let now = test_time();
        Checkout {
            requester_name: "Ana".to_string(),
            purpose: "Roof repair".to_string(),
            kind: TransactionKind::Borrowing,
            expected_return_date: Some(now + Duration::days(2)),
            notes: None,
            lines: vec![CheckoutLine { item_id, quantity }],
            occurred_at: now,
        }
    }

    #[test]
    fn borrowing_decrements_stock_and_opens_active_lines() {
        let drill = item("Drill", ItemKind::Tool, 10);
        let plan = plan_checkout(&borrow(drill.id_typed(), 3), &catalog(&[&drill])).unwrap();

        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].available_stock(), 7);
        assert_eq!(plan.items[0].version(), drill.version());

        let txn = &plan.transaction;
        assert_eq!(txn.status(), TransactionStatus::Active);
        assert_eq!(txn.lines().len(), 1);
        assert_eq!(txn.lines()[0].quantity, 3);
        assert_eq!(txn.lines()[0].status, LineStatus::Active);
        assert_eq!(txn.lines()[0].resolved(), 0);

        assert_eq!(plan.activity.kind, ActivityKind::CheckedOut);
        assert_eq!(plan.activity.transaction_id, Some(txn.id_typed()));
        assert_eq!(plan.activity.item_id, Some(drill.id_typed()));
        assert_eq!(plan.activity.metadata["lines"][0]["stock_after"], 7);
        assert_eq!(plan.requester.name, "Ana");
    }

    #[test]
    fn request_consumes_immediately() {
        let cable = item("Cable", ItemKind::Material, 100);
        let now = test_time();
        let cmd = Checkout {
            requester_name: "Bo".to_string(),
            purpose: "Wiring".to_string(),
            kind: TransactionKind::Request,
            expected_return_date: None,
            notes: Some("  ".to_string()),
            lines: vec![CheckoutLine { item_id: cable.id_typed(), quantity: 10 }],
            occurred_at: now,
        };

        let plan = plan_checkout(&cmd, &catalog(&[&cable])).unwrap();
        assert_eq!(plan.items[0].available_stock(), 90);
        let txn = &plan.transaction;
        assert_eq!(txn.status(), TransactionStatus::Consumed);
        assert_eq!(txn.lines()[0].consumed_quantity, 10);
        assert_eq!(txn.lines()[0].status, LineStatus::Consumed);
        assert_eq!(txn.notes(), None);
        assert_eq!(plan.activity.kind, ActivityKind::Consumed);
    }

    #[test]
    fn insufficient_stock_reports_item_and_amounts() {
        let drill = item("Drill", ItemKind::Tool, 2);
        let err = plan_checkout(&borrow(drill.id_typed(), 3), &catalog(&[&drill])).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                item: "Drill".to_string(),
                requested: 3,
                available: 2,
            }
        );
    }

    #[test]
    fn repeated_item_lines_are_summed_for_stock_check() {
        let drill = item("Drill", ItemKind::Tool, 4);
        let mut cmd = borrow(drill.id_typed(), 3);
        cmd.lines.push(CheckoutLine { item_id: drill.id_typed(), quantity: 2 });

        let err = plan_checkout(&cmd, &catalog(&[&drill])).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { requested: 5, available: 4, .. }));

        cmd.lines[1].quantity = 1;
        let plan = plan_checkout(&cmd, &catalog(&[&drill])).unwrap();
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].available_stock(), 0);
        assert_eq!(plan.transaction.lines().len(), 2);
    }

    #[test]
    fn material_cannot_be_borrowed() {
        let cable = item("Cable", ItemKind::Material, 100);
        let err = plan_checkout(&borrow(cable.id_typed(), 1), &catalog(&[&cable])).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("cannot be used")));
    }

    #[test]
    fn unknown_item_is_not_found() {
        let drill = item("Drill", ItemKind::Tool, 5);
        let err = plan_checkout(&borrow(ItemId::new(), 1), &catalog(&[&drill])).unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "item", .. }));
    }

    #[test]
    fn shape_is_checked_before_items() {
        // Unknown item AND missing date: the shape error wins.
        let mut cmd = borrow(ItemId::new(), 1);
        cmd.expected_return_date = None;
        let err = plan_checkout(&cmd, &HashMap::new()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("expected return date")));
    }

    #[test]
    fn borrowing_due_date_must_be_in_future() {
        let drill = item("Drill", ItemKind::Tool, 5);
        let mut cmd = borrow(drill.id_typed(), 1);
        cmd.expected_return_date = Some(cmd.occurred_at);
        assert!(matches!(
            plan_checkout(&cmd, &catalog(&[&drill])),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn empty_request_and_blank_names_are_rejected() {
        let drill = item("Drill", ItemKind::Tool, 5);
        let items = catalog(&[&drill]);

        let mut cmd = borrow(drill.id_typed(), 1);
        cmd.lines.clear();
        assert!(matches!(plan_checkout(&cmd, &items), Err(DomainError::Validation(_))));

        let mut cmd = borrow(drill.id_typed(), 1);
        cmd.requester_name = "  ".to_string();
        assert!(matches!(plan_checkout(&cmd, &items), Err(DomainError::Validation(_))));

        let mut cmd = borrow(drill.id_typed(), 0);
        cmd.purpose = "x".to_string();
        assert!(matches!(plan_checkout(&cmd, &items), Err(DomainError::Validation(_))));
    }

    #[test]
    fn oversized_quantity_is_a_validation_error() {
        let drill = item("Drill", ItemKind::Tool, 5);
        let err = plan_checkout(&borrow(drill.id_typed(), MAX_STOCK + 1), &catalog(&[&drill]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("exceeds the limit")));
    }
}
