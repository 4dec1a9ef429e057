//! Infrastructure layer: ledger stores, the reconciliation engine, config.

pub mod config;
pub mod engine;
pub mod store;


pub use config::{AppConfig, ConfigError};
pub use engine::{EngineError, EngineResult, ReconciliationEngine, DEFAULT_MAX_COMMIT_ATTEMPTS};
pub use store::{
    Committed, InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, Removal, Staged, StoreError,
    UnitOfWork,
};
