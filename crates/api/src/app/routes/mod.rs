use axum::Router;

pub mod activities;
pub mod items;
pub mod requesters;
pub mod system;
pub mod transactions;

/// Router for all ledger endpoints.
pub fn router() -> Router {
    Router::new()
        .merge(items::router())
        .merge(transactions::router())
        .merge(activities::router())
        .merge(requesters::router())
}
