//! Stock Ledger domain module.
//!
//! This crate contains business rules for tracked items, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod item;

pub use item::{
    ensure_within_limit, Item, ItemCondition, ItemKind, ItemStatus, RegisterItem, RestockItem,
    SetItemCondition, StoredItem, UpdateItem, MAX_STOCK,
};
