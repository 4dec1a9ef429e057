//! Postgres-backed ledger store.
//!
//! Each unit of work runs inside one SQL transaction. Staged aggregates are
//! written with compare-and-swap statements on their `version` column, so a
//! stale plan affects zero rows and the whole transaction is rolled back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Concurrency` | Two writers inserted the same row |
//! | Database (check constraint violation) | `23514` | `Integrity` | Negative stock or quantity |
//! | Database (foreign key violation) | `23503` | `Integrity` | Line pointing at a missing transaction |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / RowNotFound / Other | N/A | `Backend` | Connection failures, etc. |
//!
//! ## Sync adapter
//!
//! `LedgerStore` is synchronous. The trait impl drives the async methods with
//! the ambient tokio runtime handle, so it must be called from a thread that
//! has entered a runtime but is not itself polling a future (for example
//! inside `tokio::task::spawn_blocking`).

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use stockroom_core::{ActivityId, DomainError, ExpectedVersion, ItemId, LineId, TransactionId};
use stockroom_events::{ActivityFilter, ActivityRecord};
use stockroom_inventory::{Item, StoredItem};
use stockroom_lending::{
    RequesterProfile, RequesterTouch, StoredTransaction, Transaction, TransactionFilter,
    TransactionLine, TransactionStatus,
};

use super::{Committed, LedgerStore, Removal, Staged, StoreError, UnitOfWork};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        condition TEXT NOT NULL,
        available_stock BIGINT NOT NULL CHECK (available_stock >= 0),
        min_stock BIGINT NOT NULL CHECK (min_stock >= 0),
        unit TEXT,
        location TEXT,
        version BIGINT NOT NULL CHECK (version > 0),
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id UUID PRIMARY KEY,
        kind TEXT NOT NULL,
        requester_name TEXT NOT NULL,
        requester_key TEXT NOT NULL,
        purpose TEXT NOT NULL,
        transaction_date TIMESTAMPTZ NOT NULL,
        expected_return_date TIMESTAMPTZ,
        return_date TIMESTAMPTZ,
        status TEXT NOT NULL,
        notes TEXT,
        version BIGINT NOT NULL CHECK (version > 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transaction_lines (
        id UUID PRIMARY KEY,
        transaction_id UUID NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        item_id UUID NOT NULL,
        item_name TEXT NOT NULL,
        quantity BIGINT NOT NULL CHECK (quantity > 0),
        returned_quantity BIGINT NOT NULL CHECK (returned_quantity >= 0),
        damaged_quantity BIGINT NOT NULL CHECK (damaged_quantity >= 0),
        lost_quantity BIGINT NOT NULL CHECK (lost_quantity >= 0),
        consumed_quantity BIGINT NOT NULL CHECK (consumed_quantity >= 0),
        condition TEXT NOT NULL,
        status TEXT NOT NULL,
        notes TEXT,
        CHECK (returned_quantity + damaged_quantity + lost_quantity <= quantity)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS transactions_requester_idx ON transactions (requester_key)",
    "CREATE INDEX IF NOT EXISTS transaction_lines_item_idx ON transaction_lines (item_id)",
    r#"
    CREATE TABLE IF NOT EXISTS activity_records (
        id UUID PRIMARY KEY,
        kind TEXT NOT NULL,
        transaction_id UUID,
        item_id UUID,
        actor TEXT NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL,
        metadata JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS activity_records_occurred_idx ON activity_records (occurred_at, id)",
    r#"
    CREATE TABLE IF NOT EXISTS requester_profiles (
        key TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        usage_count BIGINT NOT NULL,
        last_used_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Postgres-backed ledger store.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    pub async fn fetch_items(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Item>, StoreError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query("SELECT * FROM items WHERE id = ANY($1)")
            .bind(&uuids)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_items", e))?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let item = item_from_row(&row)?;
            out.insert(item.id_typed(), item);
        }
        Ok(out)
    }

    pub async fn fetch_all_items(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query("SELECT * FROM items ORDER BY name ASC, id ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_all_items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    pub async fn fetch_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query("SELECT * FROM transactions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_transaction", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut lines = self.fetch_lines(&[*id.as_uuid()]).await?;
        let lines = lines.remove(id.as_uuid()).unwrap_or_default();
        Ok(Some(transaction_from_row(&row, lines)?))
    }

    pub async fn fetch_transactions(
        &self,
        filter: &TransactionFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM transactions
            WHERE ($1::text IS NULL OR status = $1)
                AND ($2::text IS NULL OR kind = $2)
                AND ($3::text IS NULL OR requester_key = $3)
                AND (NOT $4 OR (status = 'active' AND expected_return_date < $5))
            ORDER BY transaction_date DESC, id DESC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.requester.as_deref().map(RequesterProfile::key))
        .bind(filter.overdue_only)
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_transactions", e))?;

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|r| r.try_get::<Uuid, _>("id"))
            .collect::<Result<_, _>>()
            .map_err(|e| decode_error("transactions", e))?;
        let mut lines = self.fetch_lines(&ids).await?;

        rows.iter()
            .zip(ids.iter())
            .map(|(row, id)| transaction_from_row(row, lines.remove(id).unwrap_or_default()))
            .collect()
    }

    async fn fetch_lines(
        &self,
        transaction_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<TransactionLine>>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM transaction_lines WHERE transaction_id = ANY($1) ORDER BY transaction_id, position",
        )
        .bind(transaction_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_lines", e))?;

        let mut out: HashMap<Uuid, Vec<TransactionLine>> = HashMap::new();
        for row in rows {
            let line = line_from_row(&row)?;
            out.entry(*line.transaction_id.as_uuid()).or_default().push(line);
        }
        Ok(out)
    }

    pub async fn fetch_activities(
        &self,
        filter: &ActivityFilter,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let kinds: Vec<&str> = filter.kinds.iter().map(|k| k.as_str()).collect();
        let rows = sqlx::query(
            r#"
            SELECT * FROM activity_records
            WHERE ($1::timestamptz IS NULL OR occurred_at >= $1)
                AND ($2::timestamptz IS NULL OR occurred_at < $2)
                AND (cardinality($3::text[]) = 0 OR kind = ANY($3))
                AND ($4::uuid IS NULL OR item_id = $4)
                AND ($5::uuid IS NULL OR transaction_id = $5)
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(&kinds)
        .bind(filter.item_id.map(|id| *id.as_uuid()))
        .bind(filter.transaction_id.map(|id| *id.as_uuid()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_activities", e))?;

        rows.iter().map(activity_from_row).collect()
    }

    pub async fn fetch_requester(&self, name: &str) -> Result<Option<RequesterProfile>, StoreError> {
        let row = sqlx::query("SELECT * FROM requester_profiles WHERE key = $1")
            .bind(RequesterProfile::key(name))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_requester", e))?;
        row.as_ref().map(requester_from_row).transpose()
    }

    pub async fn fetch_requesters(&self) -> Result<Vec<RequesterProfile>, StoreError> {
        let rows = sqlx::query("SELECT * FROM requester_profiles ORDER BY key ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_requesters", e))?;
        rows.iter().map(requester_from_row).collect()
    }

    /// Apply a unit of work in one SQL transaction.
    #[instrument(
        skip(self, unit),
        fields(
            items = unit.items.len(),
            transaction = unit.transaction.is_some(),
            activities = unit.activities.len(),
            removals = unit.removals.len()
        ),
        err
    )]
    pub async fn commit_unit(&self, unit: UnitOfWork) -> Result<Committed, StoreError> {
        unit.check_distinct()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Dropping `tx` on an early return rolls it back.
        let mut committed = Committed::default();

        for staged in unit.items {
            committed.items.push(write_item(&mut tx, staged).await?);
        }

        if let Some(staged) = unit.transaction {
            committed.transaction = Some(write_transaction(&mut tx, staged).await?);
        }

        for removal in &unit.removals {
            apply_removal(&mut tx, removal).await?;
        }

        if let Some(touch) = &unit.requester {
            upsert_requester(&mut tx, touch).await?;
        }

        for record in &unit.activities {
            insert_activity(&mut tx, record).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        debug!(items = committed.items.len(), "unit of work committed");
        Ok(committed)
    }
}

type PgTx<'a> = sqlx::Transaction<'a, Postgres>;

fn expected_version(expected: ExpectedVersion) -> Option<i64> {
    match expected {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(v as i64),
    }
}

async fn write_item(tx: &mut PgTx<'_>, staged: Staged<Item>) -> Result<Item, StoreError> {
    let item = staged.value;
    let id = item.id_typed();

    let creating = staged.expected == ExpectedVersion::Exact(0);
    let sql = if creating {
        r#"
        INSERT INTO items (id, name, kind, condition, available_stock, min_stock,
                           unit, location, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, $9, $10)
        ON CONFLICT (id) DO NOTHING
        RETURNING version
        "#
    } else {
        r#"
        UPDATE items
        SET name = $2, kind = $3, condition = $4, available_stock = $5, min_stock = $6,
            unit = $7, location = $8, version = version + 1, created_at = $9, updated_at = $10
        WHERE id = $1 AND ($11::bigint IS NULL OR version = $11)
        RETURNING version
        "#
    };

    let query = sqlx::query_scalar(sql)
        .bind(id.as_uuid())
        .bind(item.name())
        .bind(item.kind().as_str())
        .bind(item.condition().as_str())
        .bind(i64::from(item.available_stock()))
        .bind(i64::from(item.min_stock()))
        .bind(item.unit())
        .bind(item.location())
        .bind(item.created_at())
        .bind(item.updated_at());
    let query = if creating {
        query
    } else {
        query.bind(expected_version(staged.expected))
    };
    let version: Option<i64> = query
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("write_item", e))?;

    match version {
        Some(v) => Ok(item.committed(v as u64)),
        None => Err(StoreError::Concurrency(format!(
            "item {id}: expected {:?}",
            staged.expected
        ))),
    }
}

async fn write_transaction(
    tx: &mut PgTx<'_>,
    staged: Staged<Transaction>,
) -> Result<Transaction, StoreError> {
    let txn = staged.value;
    let id = txn.id_typed();

    let creating = staged.expected == ExpectedVersion::Exact(0);
    let sql = if creating {
        r#"
        INSERT INTO transactions (id, kind, requester_name, purpose, transaction_date,
                                  expected_return_date, return_date, status, notes,
                                  requester_key, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 1)
        ON CONFLICT (id) DO NOTHING
        RETURNING version
        "#
    } else {
        r#"
        UPDATE transactions
        SET kind = $2, requester_name = $3, purpose = $4, transaction_date = $5,
            expected_return_date = $6, return_date = $7, status = $8, notes = $9,
            requester_key = $10, version = version + 1
        WHERE id = $1 AND ($11::bigint IS NULL OR version = $11)
        RETURNING version
        "#
    };

    let query = sqlx::query_scalar(sql)
        .bind(id.as_uuid())
        .bind(txn.kind().as_str())
        .bind(txn.requester_name())
        .bind(txn.purpose())
        .bind(txn.transaction_date())
        .bind(txn.expected_return_date())
        .bind(txn.return_date())
        .bind(txn.status().as_str())
        .bind(txn.notes())
        .bind(RequesterProfile::key(txn.requester_name()));
    let query = if creating {
        query
    } else {
        query.bind(expected_version(staged.expected))
    };
    let version: Option<i64> = query
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("write_transaction", e))?;

    let Some(version) = version else {
        return Err(StoreError::Concurrency(format!(
            "transaction {id}: expected {:?}",
            staged.expected
        )));
    };

    for (position, line) in txn.lines().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO transaction_lines (id, transaction_id, position, item_id, item_name,
                quantity, returned_quantity, damaged_quantity, lost_quantity, consumed_quantity,
                condition, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                returned_quantity = EXCLUDED.returned_quantity,
                damaged_quantity = EXCLUDED.damaged_quantity,
                lost_quantity = EXCLUDED.lost_quantity,
                consumed_quantity = EXCLUDED.consumed_quantity,
                condition = EXCLUDED.condition,
                status = EXCLUDED.status,
                notes = EXCLUDED.notes
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(id.as_uuid())
        .bind(position as i32)
        .bind(line.item_id.as_uuid())
        .bind(&line.item_name)
        .bind(i64::from(line.quantity))
        .bind(i64::from(line.returned_quantity))
        .bind(i64::from(line.damaged_quantity))
        .bind(i64::from(line.lost_quantity))
        .bind(i64::from(line.consumed_quantity))
        .bind(line.condition.as_str())
        .bind(line.status.as_str())
        .bind(line.notes.as_deref())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("write_transaction_line", e))?;
    }

    Ok(txn.committed(version as u64))
}

async fn apply_removal(tx: &mut PgTx<'_>, removal: &Removal) -> Result<(), StoreError> {
    match *removal {
        Removal::Item { id, expected } => {
            let on_loan: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM transaction_lines l
                    JOIN transactions t ON t.id = l.transaction_id
                    WHERE l.item_id = $1 AND t.status = $2
                )
                "#,
            )
            .bind(id.as_uuid())
            .bind(TransactionStatus::Active.as_str())
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("check_item_references", e))?;
            if on_loan {
                return Err(StoreError::Integrity(format!(
                    "item {id} is referenced by an active transaction"
                )));
            }

            let result = sqlx::query(
                "DELETE FROM items WHERE id = $1 AND ($2::bigint IS NULL OR version = $2)",
            )
            .bind(id.as_uuid())
            .bind(expected_version(expected))
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Concurrency(format!(
                    "item {id}: expected {expected:?}"
                )));
            }
        }
        Removal::Transaction { id, expected } => {
            let result = sqlx::query(
                "DELETE FROM transactions WHERE id = $1 AND ($2::bigint IS NULL OR version = $2)",
            )
            .bind(id.as_uuid())
            .bind(expected_version(expected))
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("delete_transaction", e))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Concurrency(format!(
                    "transaction {id}: expected {expected:?}"
                )));
            }
        }
    }
    Ok(())
}

async fn upsert_requester(tx: &mut PgTx<'_>, touch: &RequesterTouch) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO requester_profiles (key, name, usage_count, last_used_at)
        VALUES ($1, $2, 1, $3)
        ON CONFLICT (key) DO UPDATE SET
            usage_count = requester_profiles.usage_count + 1,
            last_used_at = GREATEST(requester_profiles.last_used_at, EXCLUDED.last_used_at)
        "#,
    )
    .bind(RequesterProfile::key(&touch.name))
    .bind(touch.name.trim())
    .bind(touch.at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("upsert_requester", e))?;
    Ok(())
}

async fn insert_activity(tx: &mut PgTx<'_>, record: &ActivityRecord) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO activity_records (id, kind, transaction_id, item_id, actor, occurred_at, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(record.kind.as_str())
    .bind(record.transaction_id.map(|id| *id.as_uuid()))
    .bind(record.item_id.map(|id| *id.as_uuid()))
    .bind(&record.actor)
    .bind(record.occurred_at)
    .bind(&record.metadata)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_activity", e))?;
    Ok(())
}

// Row decoding

fn decode_error(table: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(format!("failed to decode {table} row: {err}"))
}

fn parse_column<T>(table: &str, value: String) -> Result<T, StoreError>
where
    T: FromStr<Err = DomainError>,
{
    value.parse().map_err(|e| decode_error(table, e))
}

fn get<'r, T>(row: &'r PgRow, table: &str, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column).map_err(|e| decode_error(table, e))
}

fn get_count(row: &PgRow, table: &str, column: &str) -> Result<u32, StoreError> {
    let value: i64 = get(row, table, column)?;
    u32::try_from(value).map_err(|e| decode_error(table, e))
}

fn item_from_row(row: &PgRow) -> Result<Item, StoreError> {
    const T: &str = "items";
    let version: i64 = get(row, T, "version")?;
    Ok(Item::restore(StoredItem {
        id: ItemId::from_uuid(get(row, T, "id")?),
        name: get(row, T, "name")?,
        kind: parse_column(T, get(row, T, "kind")?)?,
        condition: parse_column(T, get(row, T, "condition")?)?,
        available_stock: get_count(row, T, "available_stock")?,
        min_stock: get_count(row, T, "min_stock")?,
        unit: get(row, T, "unit")?,
        location: get(row, T, "location")?,
        version: version as u64,
        created_at: get(row, T, "created_at")?,
        updated_at: get(row, T, "updated_at")?,
    }))
}

fn line_from_row(row: &PgRow) -> Result<TransactionLine, StoreError> {
    const T: &str = "transaction_lines";
    Ok(TransactionLine {
        id: LineId::from_uuid(get(row, T, "id")?),
        transaction_id: TransactionId::from_uuid(get(row, T, "transaction_id")?),
        item_id: ItemId::from_uuid(get(row, T, "item_id")?),
        item_name: get(row, T, "item_name")?,
        quantity: get_count(row, T, "quantity")?,
        returned_quantity: get_count(row, T, "returned_quantity")?,
        damaged_quantity: get_count(row, T, "damaged_quantity")?,
        lost_quantity: get_count(row, T, "lost_quantity")?,
        consumed_quantity: get_count(row, T, "consumed_quantity")?,
        condition: parse_column(T, get(row, T, "condition")?)?,
        status: parse_column(T, get(row, T, "status")?)?,
        notes: get(row, T, "notes")?,
    })
}

fn transaction_from_row(
    row: &PgRow,
    lines: Vec<TransactionLine>,
) -> Result<Transaction, StoreError> {
    const T: &str = "transactions";
    let version: i64 = get(row, T, "version")?;
    Ok(Transaction::restore(StoredTransaction {
        id: TransactionId::from_uuid(get(row, T, "id")?),
        kind: parse_column(T, get(row, T, "kind")?)?,
        requester_name: get(row, T, "requester_name")?,
        purpose: get(row, T, "purpose")?,
        transaction_date: get(row, T, "transaction_date")?,
        expected_return_date: get(row, T, "expected_return_date")?,
        return_date: get(row, T, "return_date")?,
        status: parse_column(T, get(row, T, "status")?)?,
        notes: get(row, T, "notes")?,
        lines,
        version: version as u64,
    }))
}

fn activity_from_row(row: &PgRow) -> Result<ActivityRecord, StoreError> {
    const T: &str = "activity_records";
    let transaction_id: Option<Uuid> = get(row, T, "transaction_id")?;
    let item_id: Option<Uuid> = get(row, T, "item_id")?;
    Ok(ActivityRecord {
        id: ActivityId::from_uuid(get(row, T, "id")?),
        kind: parse_column(T, get(row, T, "kind")?)?,
        transaction_id: transaction_id.map(TransactionId::from_uuid),
        item_id: item_id.map(ItemId::from_uuid),
        actor: get(row, T, "actor")?,
        occurred_at: get(row, T, "occurred_at")?,
        metadata: get(row, T, "metadata")?,
    })
}

fn requester_from_row(row: &PgRow) -> Result<RequesterProfile, StoreError> {
    const T: &str = "requester_profiles";
    let usage_count: i64 = get(row, T, "usage_count")?;
    Ok(RequesterProfile {
        name: get(row, T, "name")?,
        usage_count: usage_count as u64,
        last_used_at: get(row, T, "last_used_at")?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Concurrency(msg),
                Some("23503") | Some("23514") => StoreError::Integrity(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

impl PostgresLedgerStore {
    fn block_on<F: Future>(&self, fut: F) -> Result<F::Output, StoreError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            StoreError::Backend(
                "PostgresLedgerStore requires a tokio runtime; call it from spawn_blocking or an entered runtime"
                    .to_string(),
            )
        })?;
        Ok(handle.block_on(fut))
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn load_items(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Item>, StoreError> {
        self.block_on(self.fetch_items(ids))?
    }

    fn load_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        self.block_on(self.fetch_transaction(id))?
    }

    fn commit(&self, unit: UnitOfWork) -> Result<Committed, StoreError> {
        self.block_on(self.commit_unit(unit))?
    }

    fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        self.block_on(self.fetch_all_items())?
    }

    fn list_transactions(
        &self,
        filter: &TransactionFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.block_on(self.fetch_transactions(filter, now))?
    }

    fn activities(&self, filter: &ActivityFilter) -> Result<Vec<ActivityRecord>, StoreError> {
        self.block_on(self.fetch_activities(filter))?
    }

    fn requester(&self, name: &str) -> Result<Option<RequesterProfile>, StoreError> {
        self.block_on(self.fetch_requester(name))?
    }

    fn list_requesters(&self) -> Result<Vec<RequesterProfile>, StoreError> {
        self.block_on(self.fetch_requesters())?
    }
}
