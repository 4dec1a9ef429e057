use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{ItemId, LineId};
use stockroom_events::{ActivityFilter, ActivityKind};
use stockroom_inventory::{Item, ItemStatus};
use stockroom_lending::{
    CheckoutLine, ReturnLine, TransactionFilter, TransactionKind, TransactionStatus,
};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterItemRequest {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub initial_stock: u32,
    #[serde(default)]
    pub min_stock: u32,
    pub unit: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub min_stock: Option<u32>,
    pub unit: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct SetConditionRequest {
    pub condition: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutLineRequest {
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub requester_name: String,
    pub purpose: String,
    pub kind: String,
    pub expected_return_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub lines: Vec<CheckoutLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnLineRequest {
    pub line_id: String,
    #[serde(default)]
    pub return_quantity: u32,
    #[serde(default)]
    pub damaged_quantity: u32,
    #[serde(default)]
    pub lost_quantity: u32,
    pub condition: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnRequest {
    pub lines: Vec<ReturnLineRequest>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemsQuery {
    pub kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionsQuery {
    pub status: Option<String>,
    pub kind: Option<String>,
    pub requester: Option<String>,
    pub overdue: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivitiesQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Comma-separated activity kinds.
    pub kind: Option<String>,
    pub item_id: Option<String>,
    pub transaction_id: Option<String>,
}

// -------------------------
// Request mapping
// -------------------------

impl CheckoutLineRequest {
    pub fn to_line(&self) -> Result<CheckoutLine, Response> {
        Ok(CheckoutLine {
            item_id: errors::parse::<ItemId>(&self.item_id)?,
            quantity: self.quantity,
        })
    }
}

impl ReturnLineRequest {
    pub fn to_line(&self) -> Result<ReturnLine, Response> {
        Ok(ReturnLine {
            line_id: errors::parse::<LineId>(&self.line_id)?,
            returned: self.return_quantity,
            damaged: self.damaged_quantity,
            lost: self.lost_quantity,
            condition: errors::parse_opt(self.condition.as_deref())?,
            notes: self.notes.clone(),
        })
    }
}

impl TransactionsQuery {
    /// `status=overdue` is the read-time overdue projection, not a stored status.
    pub fn to_filter(&self) -> Result<TransactionFilter, Response> {
        let (status, overdue_status) = match self.status.as_deref().map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("overdue") => (None, true),
            other => (errors::parse_opt::<TransactionStatus>(other)?, false),
        };
        Ok(TransactionFilter {
            status,
            kind: errors::parse_opt::<TransactionKind>(self.kind.as_deref())?,
            requester: self
                .requester
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            overdue_only: overdue_status || self.overdue.unwrap_or(false),
        })
    }
}

impl ActivitiesQuery {
    pub fn to_filter(&self) -> Result<ActivityFilter, Response> {
        let kinds = match self.kind.as_deref() {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(errors::parse::<ActivityKind>)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(ActivityFilter {
            from: self.from,
            to: self.to,
            kinds,
            item_id: errors::parse_opt(self.item_id.as_deref())?,
            transaction_id: errors::parse_opt(self.transaction_id.as_deref())?,
        })
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    #[serde(flatten)]
    pub item: Item,
    pub status: ItemStatus,
    pub is_low_stock: bool,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        Self {
            status: item.status(),
            is_low_stock: item.is_low_stock(),
            item,
        }
    }
}

pub fn items_response(items: Vec<Item>) -> Vec<ItemResponse> {
    items.into_iter().map(ItemResponse::from).collect()
}
