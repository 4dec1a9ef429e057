//! Lending domain module: checkouts, returns and the requester directory.
//!
//! Planning functions here are pure: they validate a command against a
//! snapshot and describe the resulting writes. Committing them atomically is
//! the infrastructure layer's job.

pub mod checkout;
pub mod query;
pub mod requester;
pub mod returns;
pub mod transaction;

pub use checkout::{plan_checkout, Checkout, CheckoutLine, CheckoutPlan};
pub use query::{sort_newest_first, TransactionFilter, TransactionView};
pub use requester::{RequesterProfile, RequesterTouch};
pub use returns::{plan_return, return_item_ids, ReturnItems, ReturnLine, ReturnPlan};
pub use transaction::{
    Disposition, LineStatus, StoredTransaction, Transaction, TransactionKind, TransactionLine,
    TransactionStatus,
};
