use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{
    AggregateRoot, DomainError, DomainResult, Entity, ItemId, LineId, TransactionId, ValueObject,
};
use stockroom_inventory::{ItemCondition, ItemKind};

/// Material request (consumed immediately) or tool borrowing (returned later).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Request,
    Borrowing,
}

impl TransactionKind {
    /// The only item kind this transaction kind may carry.
    pub fn item_kind(self) -> ItemKind {
        match self {
            TransactionKind::Request => ItemKind::Material,
            TransactionKind::Borrowing => ItemKind::Tool,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Request => "request",
            TransactionKind::Borrowing => "borrowing",
        }
    }
}

impl core::str::FromStr for TransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "request" => Ok(TransactionKind::Request),
            "borrowing" => Ok(TransactionKind::Borrowing),
            _ => Err(DomainError::validation(format!(
                "unknown transaction kind '{s}' (expected request or borrowing)"
            ))),
        }
    }
}

/// Stored transaction status.
///
/// There is deliberately no `Overdue` value: overdue is computed at read time
/// from `expected_return_date` (see [`Transaction::is_overdue`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Active,
    Returned,
    Consumed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Returned => "returned",
            TransactionStatus::Consumed => "consumed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl core::str::FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(TransactionStatus::Active),
            "returned" => Ok(TransactionStatus::Returned),
            "consumed" => Ok(TransactionStatus::Consumed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            _ => Err(DomainError::validation(format!("unknown transaction status '{s}'"))),
        }
    }
}

/// Per-line resolution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStatus {
    Active,
    Returned,
    Consumed,
}

impl LineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LineStatus::Active => "active",
            LineStatus::Returned => "returned",
            LineStatus::Consumed => "consumed",
        }
    }
}

impl core::str::FromStr for LineStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(LineStatus::Active),
            "returned" => Ok(LineStatus::Returned),
            "consumed" => Ok(LineStatus::Consumed),
            _ => Err(DomainError::validation(format!("unknown line status '{s}'"))),
        }
    }
}

/// Three-way outcome for borrowed units in one return call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disposition {
    pub returned: u32,
    pub damaged: u32,
    pub lost: u32,
}

impl ValueObject for Disposition {}

impl Disposition {
    pub fn total(&self) -> u64 {
        self.returned as u64 + self.damaged as u64 + self.lost as u64
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// One item-and-quantity entry of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLine {
    pub id: LineId,
    pub transaction_id: TransactionId,
    pub item_id: ItemId,
    /// Item name at checkout time (kept for history if the item is renamed or deleted).
    pub item_name: String,
    pub quantity: u32,
    pub returned_quantity: u32,
    pub damaged_quantity: u32,
    pub lost_quantity: u32,
    pub consumed_quantity: u32,
    pub condition: ItemCondition,
    pub status: LineStatus,
    pub notes: Option<String>,
}

impl TransactionLine {
    /// Units already dispositioned (returned, damaged or lost).
    pub fn resolved(&self) -> u32 {
        self.returned_quantity + self.damaged_quantity + self.lost_quantity
    }

    /// Units still out with the borrower.
    pub fn remaining(&self) -> u32 {
        self.quantity.saturating_sub(self.resolved())
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved() >= self.quantity
    }

    /// Apply one call's disposition, enforcing `resolved <= quantity`.
    pub fn apply_disposition(&mut self, disposition: &Disposition) -> DomainResult<()> {
        let remaining = self.remaining();
        if disposition.total() > remaining as u64 {
            return Err(DomainError::OverReturn {
                line: self.id.to_string(),
                item: self.item_name.clone(),
                requested: u32::try_from(disposition.total()).unwrap_or(u32::MAX),
                remaining,
            });
        }

        self.returned_quantity += disposition.returned;
        self.damaged_quantity += disposition.damaged;
        self.lost_quantity += disposition.lost;
        if self.is_resolved() {
            self.status = LineStatus::Returned;
        }
        Ok(())
    }
}

impl Entity for TransactionLine {
    type Id = LineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Plain field bag used by storage adapters to rebuild a committed `Transaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTransaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub requester_name: String,
    pub purpose: String,
    pub transaction_date: DateTime<Utc>,
    pub expected_return_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
    pub notes: Option<String>,
    pub lines: Vec<TransactionLine>,
    pub version: u64,
}

/// Aggregate root: one checkout and the lines it owns.
///
/// The version covers the transaction and all of its lines, so two concurrent
/// returns against the same transaction cannot both commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    kind: TransactionKind,
    requester_name: String,
    purpose: String,
    transaction_date: DateTime<Utc>,
    expected_return_date: Option<DateTime<Utc>>,
    return_date: Option<DateTime<Utc>>,
    status: TransactionStatus,
    notes: Option<String>,
    lines: Vec<TransactionLine>,
    version: u64,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn open(
        id: TransactionId,
        kind: TransactionKind,
        requester_name: String,
        purpose: String,
        transaction_date: DateTime<Utc>,
        expected_return_date: Option<DateTime<Utc>>,
        notes: Option<String>,
        lines: Vec<TransactionLine>,
    ) -> Self {
        let status = match kind {
            TransactionKind::Request => TransactionStatus::Consumed,
            TransactionKind::Borrowing => TransactionStatus::Active,
        };
        Self {
            id,
            kind,
            requester_name,
            purpose,
            transaction_date,
            expected_return_date,
            return_date: None,
            status,
            notes,
            lines,
            version: 0,
        }
    }

    pub fn restore(stored: StoredTransaction) -> Self {
        Self {
            id: stored.id,
            kind: stored.kind,
            requester_name: stored.requester_name,
            purpose: stored.purpose,
            transaction_date: stored.transaction_date,
            expected_return_date: stored.expected_return_date,
            return_date: stored.return_date,
            status: stored.status,
            notes: stored.notes,
            lines: stored.lines,
            version: stored.version,
        }
    }

    /// Stamp the version assigned by the store on commit.
    pub fn committed(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn id_typed(&self) -> TransactionId {
        self.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn requester_name(&self) -> &str {
        &self.requester_name
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn transaction_date(&self) -> DateTime<Utc> {
        self.transaction_date
    }

    pub fn expected_return_date(&self) -> Option<DateTime<Utc>> {
        self.expected_return_date
    }

    pub fn return_date(&self) -> Option<DateTime<Utc>> {
        self.return_date
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn lines(&self) -> &[TransactionLine] {
        &self.lines
    }

    pub fn line(&self, line_id: LineId) -> Option<&TransactionLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    pub(crate) fn line_mut(&mut self, line_id: LineId) -> Option<&mut TransactionLine> {
        self.lines.iter_mut().find(|l| l.id == line_id)
    }

    /// Read-time overdue projection: still active and past the expected return date.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Active
            && self.expected_return_date.is_some_and(|due| now > due)
    }

    /// Whether any line still has units out.
    pub fn has_unresolved_lines(&self) -> bool {
        self.lines.iter().any(|l| l.status == LineStatus::Active)
    }

    pub fn references_item(&self, item_id: ItemId) -> bool {
        self.lines.iter().any(|l| l.item_id == item_id)
    }

    /// Transactions may only be deleted once nothing is outstanding.
    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.status == TransactionStatus::Active || self.has_unresolved_lines() {
            return Err(DomainError::invalid_state(format!(
                "transaction {} still has unresolved lines",
                self.id
            )));
        }
        Ok(())
    }

    pub(crate) fn append_notes(&mut self, notes: &str) {
        let notes = notes.trim();
        if notes.is_empty() {
            return;
        }
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{notes}"),
            _ => notes.to_string(),
        });
    }

    /// Close the transaction once every line is resolved.
    pub(crate) fn settle(&mut self, at: DateTime<Utc>) {
        if self.lines.iter().all(|l| l.status == LineStatus::Returned) {
            self.status = TransactionStatus::Returned;
            self.return_date = Some(at);
        }
    }
}

impl AggregateRoot for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
