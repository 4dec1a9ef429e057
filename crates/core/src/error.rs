//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant describes a deterministic business failure detected before
/// any state was touched. Storage failures belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A request was malformed or incomplete (missing fields, kind mismatch, empty line list).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced item, transaction or line does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A checkout asked for more units than the item has available.
    #[error("insufficient stock for '{item}': requested {requested}, available {available}")]
    InsufficientStock {
        item: String,
        requested: u32,
        available: u32,
    },

    /// A return disposition exceeds the unresolved quantity of a line.
    #[error(
        "over-return on line {line} ('{item}'): requested {requested}, remaining {remaining}"
    )]
    OverReturn {
        line: String,
        item: String,
        requested: u32,
        remaining: u32,
    },

    /// The operation is not allowed in the target's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable machine-readable code (used by the HTTP layer and in logs).
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::NotFound { .. } => "not_found",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::OverReturn { .. } => "over_return",
            DomainError::InvalidState(_) => "invalid_state",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::Conflict(_) => "conflict",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_names_item_and_quantities() {
        let err = DomainError::InsufficientStock {
            item: "Drill".to_string(),
            requested: 3,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock for 'Drill': requested 3, available 2"
        );
        assert_eq!(err.code(), "insufficient_stock");
    }

    #[test]
    fn not_found_names_entity() {
        let err = DomainError::not_found("item", "abc");
        assert_eq!(err.to_string(), "item not found: abc");
    }
}
