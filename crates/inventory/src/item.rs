use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{AggregateRoot, DomainError, DomainResult, ItemId};

/// Largest stock level or quantity the ledger accepts (fits a signed 32-bit column).
pub const MAX_STOCK: u32 = i32::MAX as u32;

/// Whether an item is consumed on use or lent out and returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Material,
    Tool,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Material => "material",
            ItemKind::Tool => "tool",
        }
    }
}

impl core::str::FromStr for ItemKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "material" => Ok(ItemKind::Material),
            "tool" => Ok(ItemKind::Tool),
            _ => Err(DomainError::validation(format!(
                "unknown item kind '{s}' (expected material or tool)"
            ))),
        }
    }
}

/// Coarse, item-wide condition flag.
///
/// This is a "last known issue" indicator, not per-unit state: a batch with one
/// damaged unit is flagged as a whole. The activity log holds the per-event detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCondition {
    Good,
    Damaged,
    Lost,
    Incomplete,
}

impl ItemCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemCondition::Good => "good",
            ItemCondition::Damaged => "damaged",
            ItemCondition::Lost => "lost",
            ItemCondition::Incomplete => "incomplete",
        }
    }
}

impl core::str::FromStr for ItemCondition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "good" => Ok(ItemCondition::Good),
            "damaged" => Ok(ItemCondition::Damaged),
            "lost" => Ok(ItemCondition::Lost),
            "incomplete" => Ok(ItemCondition::Incomplete),
            _ => Err(DomainError::validation(format!(
                "unknown condition '{s}' (expected good, damaged, lost or incomplete)"
            ))),
        }
    }
}

/// Derived availability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Available,
    OutOfStock,
}

/// Aggregate root: one Stock Ledger row.
///
/// `available_stock` is unsigned, so the ledger can never go negative; the
/// mutation methods report an error instead of saturating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    name: String,
    kind: ItemKind,
    condition: ItemCondition,
    available_stock: u32,
    min_stock: u32,
    unit: Option<String>,
    location: Option<String>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Plain field bag used by storage adapters to rebuild a committed `Item`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub id: ItemId,
    pub name: String,
    pub kind: ItemKind,
    pub condition: ItemCondition,
    pub available_stock: u32,
    pub min_stock: u32,
    pub unit: Option<String>,
    pub location: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Command: RegisterItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub name: String,
    pub kind: ItemKind,
    pub initial_stock: u32,
    pub min_stock: u32,
    pub unit: Option<String>,
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItem. `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItem {
    pub item_id: ItemId,
    pub name: Option<String>,
    pub min_stock: Option<u32>,
    pub unit: Option<String>,
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RestockItem (goods received).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockItem {
    pub item_id: ItemId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetItemCondition (e.g. back to `Good` after a repair).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetItemCondition {
    pub item_id: ItemId,
    pub condition: ItemCondition,
    pub occurred_at: DateTime<Utc>,
}

impl Item {
    /// Create a new, not-yet-committed item (version 0).
    pub fn register(cmd: &RegisterItem) -> DomainResult<Self> {
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        ensure_within_limit("initial stock", u64::from(cmd.initial_stock))?;
        ensure_within_limit("minimum stock", u64::from(cmd.min_stock))?;

        Ok(Self {
            id: ItemId::new(),
            name: name.to_string(),
            kind: cmd.kind,
            condition: ItemCondition::Good,
            available_stock: cmd.initial_stock,
            min_stock: cmd.min_stock,
            unit: normalize(cmd.unit.as_deref()),
            location: normalize(cmd.location.as_deref()),
            version: 0,
            created_at: cmd.occurred_at,
            updated_at: cmd.occurred_at,
        })
    }

    pub fn restore(stored: StoredItem) -> Self {
        Self {
            id: stored.id,
            name: stored.name,
            kind: stored.kind,
            condition: stored.condition,
            available_stock: stored.available_stock,
            min_stock: stored.min_stock,
            unit: stored.unit,
            location: stored.location,
            version: stored.version,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }

    /// Stamp the version assigned by the store on commit.
    pub fn committed(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn condition(&self) -> ItemCondition {
        self.condition
    }

    pub fn available_stock(&self) -> u32 {
        self.available_stock
    }

    pub fn min_stock(&self) -> u32 {
        self.min_stock
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn status(&self) -> ItemStatus {
        if self.available_stock == 0 {
            ItemStatus::OutOfStock
        } else {
            ItemStatus::Available
        }
    }

    /// At or below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.available_stock <= self.min_stock
    }

    /// Take `quantity` units out of available stock.
    pub fn withdraw(&mut self, quantity: u32, at: DateTime<Utc>) -> DomainResult<()> {
        let remaining = self
            .available_stock
            .checked_sub(quantity)
            .ok_or_else(|| DomainError::InsufficientStock {
                item: self.name.clone(),
                requested: quantity,
                available: self.available_stock,
            })?;
        self.available_stock = remaining;
        self.updated_at = at;
        Ok(())
    }

    /// Put `quantity` units back into available stock.
    pub fn restock(&mut self, quantity: u32, at: DateTime<Utc>) -> DomainResult<()> {
        self.available_stock = self
            .available_stock
            .checked_add(quantity)
            .ok_or_else(|| DomainError::validation(format!("stock of '{}' would overflow", self.name)))?;
        self.updated_at = at;
        Ok(())
    }

    pub fn set_condition(&mut self, condition: ItemCondition, at: DateTime<Utc>) {
        self.condition = condition;
        self.updated_at = at;
    }

    pub fn handle_restock(&mut self, cmd: &RestockItem) -> DomainResult<()> {
        self.ensure_item_id(cmd.item_id)?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("restock quantity must be positive"));
        }
        ensure_within_limit(
            "restocked stock",
            u64::from(self.available_stock) + u64::from(cmd.quantity),
        )?;
        self.restock(cmd.quantity, cmd.occurred_at)
    }

    pub fn handle_set_condition(&mut self, cmd: &SetItemCondition) -> DomainResult<()> {
        self.ensure_item_id(cmd.item_id)?;
        self.set_condition(cmd.condition, cmd.occurred_at);
        Ok(())
    }

    pub fn handle_update(&mut self, cmd: &UpdateItem) -> DomainResult<()> {
        self.ensure_item_id(cmd.item_id)?;
        if let Some(name) = &cmd.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DomainError::validation("name cannot be empty"));
            }
            self.name = name.to_string();
        }
        if let Some(min_stock) = cmd.min_stock {
            ensure_within_limit("minimum stock", u64::from(min_stock))?;
            self.min_stock = min_stock;
        }
        if cmd.unit.is_some() {
            self.unit = normalize(cmd.unit.as_deref());
        }
        if cmd.location.is_some() {
            self.location = normalize(cmd.location.as_deref());
        }
        self.updated_at = cmd.occurred_at;
        Ok(())
    }

    fn ensure_item_id(&self, item_id: ItemId) -> DomainResult<()> {
        if self.id != item_id {
            return Err(DomainError::validation("item_id mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Reject counts above [`MAX_STOCK`].
pub fn ensure_within_limit(what: &str, value: u64) -> DomainResult<()> {
    if value > u64::from(MAX_STOCK) {
        return Err(DomainError::validation(format!(
            "{what} {value} exceeds the limit of {MAX_STOCK}"
        )));
    }
    Ok(())
}

fn normalize(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
