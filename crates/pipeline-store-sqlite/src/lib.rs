// crates/pipeline-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Item Store
// Description: Durable ItemStore backed by SQLite WAL, for the shared data
//              plane (public/hybrid cloudType accounts).
// Purpose: Concrete C2 backend; one table holds every entity kind, keyed by
//          (pk, sk), with secondary index columns for GSI1/GSI2/GSI3.
// Dependencies: pipeline-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Items are stored as a JSON attribute blob alongside their `(pk, sk)` and
//! three nullable GSI partition/sort columns. `query_index` resolves
//! `"gsi1"`/`"gsi2"`/`"gsi3"` to those columns; callers populate them by
//! including `gsi1_pk`/`gsi1_sk` (etc) as ordinary attributes on the item —
//! the store lifts them into indexed columns at write time.
//!
//! Security posture: item attribute values are untrusted; they are bound as
//! SQL parameters, never interpolated into query text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Mutex;

use pipeline_core::Condition;
use pipeline_core::Item;
use pipeline_core::ItemKey;
use pipeline_core::ItemStore;
use pipeline_core::KeyCondition;
use pipeline_core::StoreError;
use pipeline_core::TransactOp;
use pipeline_core::MAX_BATCH_ITEMS;
use rusqlite::Connection;
use rusqlite::OptionalExtension as _;
use rusqlite::params;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version for the item table.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the SQLite item store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Builds a config pointing at `path` with the documented default busy
    /// timeout.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors specific to opening or migrating the SQLite item store.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// The on-disk schema version is newer than this binary understands.
    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaTooNew {
        /// Schema version recorded in the database.
        found: i64,
        /// Highest schema version this binary supports.
        supported: i64,
    },
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// SQLite-backed [`ItemStore`] for the shared data plane.
pub struct SqliteItemStore {
    /// Single connection guarded by a mutex; SQLite serializes writers
    /// anyway and this store does not need read/write connection splitting
    /// at this workload scale.
    conn: Mutex<Connection>,
}

impl SqliteItemStore {
    /// Opens (creating and migrating if needed) a store at `config.path`.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the database cannot be opened, or
    /// [`StoreError::Backend`] if the on-disk schema is from a newer,
    /// unsupported version.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, StoreError> {
        let conn = Connection::open(&config.path).map_err(|err| StoreError::Io(err.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
            .map_err(|err| StoreError::Io(err.to_string()))?;
        conn.pragma_update(None, "journal_mode", "wal").map_err(|err| StoreError::Io(err.to_string()))?;
        conn.pragma_update(None, "synchronous", "normal").map_err(|err| StoreError::Io(err.to_string()))?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Opens an in-memory store, primarily for tests.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the in-memory database cannot be
    /// opened.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|err| StoreError::Io(err.to_string()))?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

/// Creates the item table and records the schema version, if not already
/// present.
fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL);
         CREATE TABLE IF NOT EXISTS items (
             pk TEXT NOT NULL,
             sk TEXT NOT NULL,
             gsi1_pk TEXT,
             gsi1_sk TEXT,
             gsi2_pk TEXT,
             gsi2_sk TEXT,
             gsi3_pk TEXT,
             gsi3_sk TEXT,
             attributes TEXT NOT NULL,
             PRIMARY KEY (pk, sk)
         );
         CREATE INDEX IF NOT EXISTS idx_items_gsi1 ON items (gsi1_pk, gsi1_sk);
         CREATE INDEX IF NOT EXISTS idx_items_gsi2 ON items (gsi2_pk, gsi2_sk);
         CREATE INDEX IF NOT EXISTS idx_items_gsi3 ON items (gsi3_pk, gsi3_sk);",
    )
    .map_err(|err| StoreError::Io(err.to_string()))?;

    let existing: Option<i64> =
        conn.query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| row.get(0)).optional().map_err(
            |err| StoreError::Io(err.to_string()),
        )?;
    match existing {
        None => {
            conn.execute("INSERT INTO schema_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| StoreError::Io(err.to_string()))?;
        }
        Some(found) if found > SCHEMA_VERSION => {
            return Err(StoreError::Backend(
                SqliteStoreError::SchemaTooNew { found, supported: SCHEMA_VERSION }.to_string(),
            ));
        }
        Some(_) => {}
    }
    Ok(())
}

/// Extracts a GSI partition/sort pair from an item's attributes, by
/// convention `{index}_pk`/`{index}_sk` string attributes (e.g. `gsi1_pk`).
fn gsi_fields(item: &Item, index: &str) -> (Option<String>, Option<String>) {
    let pk = item.attributes.get(&format!("{index}_pk")).and_then(|v| v.as_str()).map(str::to_owned);
    let sk = item.attributes.get(&format!("{index}_sk")).and_then(|v| v.as_str()).map(str::to_owned);
    (pk, sk)
}

/// Serializes an item's attribute map to a JSON blob.
fn attributes_blob(item: &Item) -> Result<String, StoreError> {
    serde_json::to_string(&item.attributes).map_err(|err| StoreError::Invalid(err.to_string()))
}

/// Deserializes one row into an [`Item`].
fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    let pk: String = row.get("pk")?;
    let sk: String = row.get("sk")?;
    let attributes_raw: String = row.get("attributes")?;
    let attributes = serde_json::from_str(&attributes_raw).unwrap_or_default();
    Ok(Item { key: ItemKey::new(pk, sk), attributes })
}

fn upsert(conn: &Connection, item: &Item) -> Result<(), StoreError> {
    let (gsi1_pk, gsi1_sk) = gsi_fields(item, "gsi1");
    let (gsi2_pk, gsi2_sk) = gsi_fields(item, "gsi2");
    let (gsi3_pk, gsi3_sk) = gsi_fields(item, "gsi3");
    let attributes = attributes_blob(item)?;
    conn.execute(
        "INSERT INTO items (pk, sk, gsi1_pk, gsi1_sk, gsi2_pk, gsi2_sk, gsi3_pk, gsi3_sk, attributes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(pk, sk) DO UPDATE SET
             gsi1_pk = excluded.gsi1_pk, gsi1_sk = excluded.gsi1_sk,
             gsi2_pk = excluded.gsi2_pk, gsi2_sk = excluded.gsi2_sk,
             gsi3_pk = excluded.gsi3_pk, gsi3_sk = excluded.gsi3_sk,
             attributes = excluded.attributes",
        params![item.key.pk, item.key.sk, gsi1_pk, gsi1_sk, gsi2_pk, gsi2_sk, gsi3_pk, gsi3_sk, attributes],
    )
    .map_err(|err| StoreError::Io(err.to_string()))?;
    Ok(())
}

fn check_condition(conn: &Connection, key: &ItemKey, condition: &Condition) -> Result<bool, StoreError> {
    let existing = fetch(conn, key)?;
    let actual = existing.and_then(|item| item.attributes.get(&condition.attribute).cloned());
    Ok(actual == condition.expected)
}

fn fetch(conn: &Connection, key: &ItemKey) -> Result<Option<Item>, StoreError> {
    conn.query_row("SELECT * FROM items WHERE pk = ?1 AND sk = ?2", params![key.pk, key.sk], row_to_item)
        .optional()
        .map_err(|err| StoreError::Io(err.to_string()))
}

fn range_query(conn: &Connection, condition: &KeyCondition) -> Result<Vec<Item>, StoreError> {
    let like_pattern = format!("{}%", condition.sk_prefix.replace('%', "\\%").replace('_', "\\_"));
    let mut stmt = conn
        .prepare("SELECT * FROM items WHERE pk = ?1 AND sk LIKE ?2 ESCAPE '\\' ORDER BY sk")
        .map_err(|err| StoreError::Io(err.to_string()))?;
    let rows = stmt
        .query_map(params![condition.partition, like_pattern], row_to_item)
        .map_err(|err| StoreError::Io(err.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|err| StoreError::Io(err.to_string()))
}

fn index_columns(index_name: &str) -> Result<(&'static str, &'static str), StoreError> {
    match index_name {
        "gsi1" => Ok(("gsi1_pk", "gsi1_sk")),
        "gsi2" => Ok(("gsi2_pk", "gsi2_sk")),
        "gsi3" => Ok(("gsi3_pk", "gsi3_sk")),
        other => Err(StoreError::Invalid(format!("unknown secondary index: {other}"))),
    }
}

impl ItemStore for SqliteItemStore {
    fn get(&self, key: &ItemKey, _strongly_consistent: bool) -> Result<Option<Item>, StoreError> {
        let conn = lock(&self.conn);
        fetch(&conn, key)
    }

    fn put(&self, item: Item) -> Result<(), StoreError> {
        let conn = lock(&self.conn);
        upsert(&conn, &item)
    }

    fn put_if(&self, item: Item, condition: Condition) -> Result<(), StoreError> {
        let conn = lock(&self.conn);
        if !check_condition(&conn, &item.key, &condition)? {
            return Err(StoreError::Conflict(item.key));
        }
        upsert(&conn, &item)
    }

    fn delete(&self, key: &ItemKey) -> Result<(), StoreError> {
        let conn = lock(&self.conn);
        conn.execute("DELETE FROM items WHERE pk = ?1 AND sk = ?2", params![key.pk, key.sk])
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }

    fn query(&self, condition: &KeyCondition) -> Result<Vec<Item>, StoreError> {
        let conn = lock(&self.conn);
        range_query(&conn, condition)
    }

    fn query_index(&self, index_name: &str, condition: &KeyCondition) -> Result<Vec<Item>, StoreError> {
        let (pk_col, sk_col) = index_columns(index_name)?;
        let conn = lock(&self.conn);
        let like_pattern = format!("{}%", condition.sk_prefix.replace('%', "\\%").replace('_', "\\_"));
        let sql = format!(
            "SELECT * FROM items WHERE {pk_col} = ?1 AND {sk_col} LIKE ?2 ESCAPE '\\' ORDER BY {sk_col}"
        );
        let mut stmt = conn.prepare(&sql).map_err(|err| StoreError::Io(err.to_string()))?;
        let rows = stmt
            .query_map(params![condition.partition, like_pattern], row_to_item)
            .map_err(|err| StoreError::Io(err.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|err| StoreError::Io(err.to_string()))
    }

    fn batch_write(&self, items: Vec<Item>) -> Result<(), StoreError> {
        if items.len() > MAX_BATCH_ITEMS {
            return Err(StoreError::BatchTooLarge { actual: items.len(), max: MAX_BATCH_ITEMS });
        }
        let mut conn = lock(&self.conn);
        let tx = conn.transaction().map_err(|err| StoreError::Io(err.to_string()))?;
        for item in &items {
            upsert(&tx, item)?;
        }
        tx.commit().map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }

    fn transact_write(&self, ops: Vec<TransactOp>) -> Result<(), StoreError> {
        if ops.len() > MAX_BATCH_ITEMS {
            return Err(StoreError::BatchTooLarge { actual: ops.len(), max: MAX_BATCH_ITEMS });
        }
        let mut conn = lock(&self.conn);
        let tx = conn.transaction().map_err(|err| StoreError::Io(err.to_string()))?;
        for op in &ops {
            match op {
                TransactOp::Put(item) => upsert(&tx, item)?,
                TransactOp::PutIf(item, condition) => {
                    if !check_condition(&tx, &item.key, condition)? {
                        return Err(StoreError::Conflict(item.key.clone()));
                    }
                    upsert(&tx, item)?;
                }
                TransactOp::Delete(key) => {
                    tx.execute("DELETE FROM items WHERE pk = ?1 AND sk = ?2", params![key.pk, key.sk])
                        .map_err(|err| StoreError::Io(err.to_string()))?;
                }
            }
        }
        tx.commit().map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }
}

/// Locks the connection mutex, recovering on poison so one panicking caller
/// cannot wedge the store for every other caller.
fn lock(mutex: &Mutex<Connection>) -> std::sync::MutexGuard<'_, Connection> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use pipeline_core::Condition;
    use pipeline_core::Item;
    use pipeline_core::ItemKey;
    use pipeline_core::ItemStore as _;
    use pipeline_core::KeyCondition;
    use serde_json::json;

    use super::SqliteItemStore;

    fn store() -> SqliteItemStore {
        SqliteItemStore::open_in_memory().expect("open in-memory store")
    }

    fn item(pk: &str, sk: &str) -> Item {
        Item { key: ItemKey::new(pk, sk), attributes: [("status".to_owned(), json!("ok"))].into() }
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = store();
        store.put(item("ACCOUNT#1", "PIPELINE#1")).expect("put");
        let fetched = store.get(&ItemKey::new("ACCOUNT#1", "PIPELINE#1"), false).expect("get");
        assert!(fetched.is_some());
    }

    #[test]
    fn query_respects_partition_and_prefix() {
        let store = store();
        store.put(item("ACCOUNT#1", "PIPELINE#1")).expect("put");
        store.put(item("ACCOUNT#1", "EXECUTION#1")).expect("put");
        store.put(item("ACCOUNT#2", "PIPELINE#1")).expect("put");

        let results = store
            .query(&KeyCondition { partition: "ACCOUNT#1".to_owned(), sk_prefix: "PIPELINE#".to_owned() })
            .expect("query");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn put_if_rejects_on_mismatch() {
        let store = store();
        store.put(item("ACCOUNT#1", "EXECUTION#1")).expect("put");
        let result = store.put_if(
            item("ACCOUNT#1", "EXECUTION#1"),
            Condition { attribute: "status".to_owned(), expected: Some(json!("stale")) },
        );
        assert!(result.is_err());
    }

    #[test]
    fn batch_write_over_cap_is_rejected() {
        let store = store();
        let items: Vec<Item> = (0..26).map(|index| item("ACCOUNT#1", &format!("EXECUTION#{index}"))).collect();
        let result = store.batch_write(items);
        assert!(matches!(result, Err(pipeline_core::StoreError::BatchTooLarge { .. })));
    }
}
