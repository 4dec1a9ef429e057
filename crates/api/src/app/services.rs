//! Infrastructure wiring: picks the ledger store and owns the engine.

use std::sync::Arc;

use tracing::info;

use stockroom_infra::{
    AppConfig, EngineError, EngineResult, InMemoryLedgerStore, LedgerStore, PostgresLedgerStore,
    ReconciliationEngine, StoreError,
};

pub type SharedStore = Arc<dyn LedgerStore>;
pub type Engine = ReconciliationEngine<SharedStore>;

pub struct AppServices {
    engine: Arc<Engine>,
}

impl AppServices {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn in_memory() -> Self {
        let store: SharedStore = Arc::new(InMemoryLedgerStore::new());
        Self::new(ReconciliationEngine::new(store))
    }

    /// Postgres when `DATABASE_URL` is set, otherwise in-memory.
    pub async fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        let store: SharedStore = match &config.database_url {
            Some(url) => {
                let store = PostgresLedgerStore::connect(url, config.db_max_connections).await?;
                store.ensure_schema().await?;
                info!(max_connections = config.db_max_connections, "using postgres ledger store");
                Arc::new(store)
            }
            None => {
                info!("DATABASE_URL not set; using in-memory ledger store");
                Arc::new(InMemoryLedgerStore::new())
            }
        };
        Ok(Self::new(ReconciliationEngine::with_max_attempts(
            store,
            config.max_commit_attempts,
        )))
    }

    /// Run an engine call on the blocking pool.
    ///
    /// The engine and its stores are synchronous; the Postgres store drives
    /// its queries with the runtime handle, which is only allowed off the
    /// async worker threads.
    pub async fn run<T, F>(&self, f: F) -> EngineResult<T>
    where
        F: FnOnce(&Engine) -> EngineResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| EngineError::Storage(StoreError::Backend(format!("engine task failed: {e}"))))?
    }
}
