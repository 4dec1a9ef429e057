//! Activity log: the append-only audit trail written by the reconciliation engine.

pub mod activity;
pub mod event;

pub use activity::{ActivityFilter, ActivityKind, ActivityRecord};
pub use event::Event;
