//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity; two with the same attributes are equal.
/// Example: a disposition `{ returned: 2, damaged: 1, lost: 0 }`.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
