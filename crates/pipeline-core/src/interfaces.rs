// crates/pipeline-core/src/interfaces.rs
// ============================================================================
// Module: Item Store Gateway Interface
// Description: Backend-agnostic capability trait over an opaque item store.
// Purpose: Let C2 callers (Tenant Router, Execution Coordinator, Approval
//          Bridge) speak one narrow interface regardless of the concrete
//          backend (SQLite for shared tenants, Postgres for dedicated ones).
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! This mirrors a seam this workspace already uses for its durable run-state
//! store: a small trait returning a typed error enum, implemented once per
//! backend. The Item Store Gateway (C2) is intentionally narrow — callers
//! that need higher-level behavior (tenant routing, transactional
//! sibling-stale marking) build it on top of these primitives rather than
//! the trait growing backend-specific methods.
//!
//! Security posture: item contents are caller-controlled; implementations
//! must not interpolate attribute values into backend query text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Keys & Items
// ============================================================================

/// A primary key: partition key + sort key.
///
/// # Invariants
/// - `pk`/`sk` are opaque strings; the gateway performs no interpretation of
///   their structure beyond exact-match and `begins_with` range queries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    /// Partition key.
    pub pk: String,
    /// Sort key.
    pub sk: String,
}

impl ItemKey {
    /// Builds a key from a partition key and sort key.
    #[must_use]
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self { pk: pk.into(), sk: sk.into() }
    }
}

/// A heterogeneous attribute map, the on-the-wire shape of one item.
pub type AttributeMap = BTreeMap<String, Value>;

/// One stored item: its key plus its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Primary key.
    pub key: ItemKey,
    /// Attribute map (includes the key fields for convenience).
    pub attributes: AttributeMap,
}

/// A type that can be deterministically addressed by a primary key, so the
/// gateway can serialize/deserialize it without callers hand-building key
/// strings.
pub trait ItemRecord: serde::Serialize + for<'de> serde::Deserialize<'de> {
    /// Partition key for this record.
    fn pk(&self) -> String;
    /// Sort key for this record.
    fn sk(&self) -> String;

    /// Converts this record into a generic [`Item`].
    ///
    /// # Errors
    /// Returns an error if the record fails to serialize to a JSON object.
    fn to_item(&self) -> Result<Item, StoreError> {
        let key = ItemKey::new(self.pk(), self.sk());
        let value = serde_json::to_value(self).map_err(|err| StoreError::Invalid(err.to_string()))?;
        let Value::Object(map) = value else {
            return Err(StoreError::Invalid("record did not serialize to an object".to_owned()));
        };
        let attributes = map.into_iter().collect();
        Ok(Item { key, attributes })
    }
}

// ============================================================================
// SECTION: Query Shapes
// ============================================================================

/// A single-partition range query: `PK = partition AND begins_with(SK, sk_prefix)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCondition {
    /// Exact partition key to match.
    pub partition: String,
    /// Sort-key prefix to match (empty matches the whole partition).
    pub sk_prefix: String,
}

/// Conditional-write expression: the item is written only if the
/// caller-supplied attribute equals the expected value (or is absent, when
/// `expected` is `None`).
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Attribute name the condition inspects.
    pub attribute: String,
    /// Expected current value; `None` means "attribute must not exist".
    pub expected: Option<Value>,
}

/// One operation inside a [`ItemStore::transact_write`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactOp {
    /// Unconditional put.
    Put(Item),
    /// Conditional put.
    PutIf(Item, Condition),
    /// Unconditional delete.
    Delete(ItemKey),
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors surfaced by an [`ItemStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend I/O failure (disk, connection, etc).
    #[error("item store io error: {0}")]
    Io(String),
    /// A conditional write's condition was not satisfied.
    #[error("conditional write failed for {0:?}")]
    Conflict(ItemKey),
    /// The requested item does not exist.
    #[error("item not found: {0:?}")]
    NotFound(ItemKey),
    /// Caller-supplied input was structurally invalid.
    #[error("invalid item store request: {0}")]
    Invalid(String),
    /// A `batch_write`/`transact_write` exceeded the backend's per-call item cap.
    #[error("batch of {actual} items exceeds the per-call cap of {max}")]
    BatchTooLarge {
        /// Items the caller supplied.
        actual: usize,
        /// Maximum items accepted per call.
        max: usize,
    },
    /// Backend-specific failure not covered by the variants above.
    #[error("item store backend error: {0}")]
    Backend(String),
}

// ============================================================================
// SECTION: Item Store Trait
// ============================================================================

/// Maximum items accepted by one `batch_write` call (`spec.md` §4.2).
pub const MAX_BATCH_ITEMS: usize = 25;

/// Uniform capability set over an opaque, partitioned item store (C2).
///
/// # Invariants
/// - Last-writer-wins on an identical key for unconditional writes.
/// - `batch_write` rejects (rather than silently chunking) requests over
///   [`MAX_BATCH_ITEMS`]; callers are responsible for chunking larger sets.
pub trait ItemStore: Send + Sync {
    /// Point read by primary key. `strongly_consistent` requests a
    /// consistent read where the backend distinguishes one.
    ///
    /// # Errors
    /// Returns [`StoreError`] on backend failure. A missing item is `Ok(None)`,
    /// not an error.
    fn get(&self, key: &ItemKey, strongly_consistent: bool) -> Result<Option<Item>, StoreError>;

    /// Unconditional point write.
    ///
    /// # Errors
    /// Returns [`StoreError`] on backend failure.
    fn put(&self, item: Item) -> Result<(), StoreError>;

    /// Conditional point write; fails with [`StoreError::Conflict`] if the
    /// condition is not satisfied.
    ///
    /// # Errors
    /// Returns [`StoreError`] on backend failure or condition mismatch.
    fn put_if(&self, item: Item, condition: Condition) -> Result<(), StoreError>;

    /// Point delete by primary key. Deleting an absent item is not an error.
    ///
    /// # Errors
    /// Returns [`StoreError`] on backend failure.
    fn delete(&self, key: &ItemKey) -> Result<(), StoreError>;

    /// Single-partition range read.
    ///
    /// # Errors
    /// Returns [`StoreError`] on backend failure.
    fn query(&self, condition: &KeyCondition) -> Result<Vec<Item>, StoreError>;

    /// Range read over a secondary index by name, using the same
    /// partition/prefix shape as [`ItemStore::query`].
    ///
    /// # Errors
    /// Returns [`StoreError`] on backend failure or an unknown index name.
    fn query_index(&self, index_name: &str, condition: &KeyCondition) -> Result<Vec<Item>, StoreError>;

    /// Unconditional multi-item write, up to [`MAX_BATCH_ITEMS`] items.
    ///
    /// # Errors
    /// Returns [`StoreError::BatchTooLarge`] over the cap, or [`StoreError`]
    /// on backend failure.
    fn batch_write(&self, items: Vec<Item>) -> Result<(), StoreError>;

    /// Atomic multi-item write with per-item conditions, up to
    /// [`MAX_BATCH_ITEMS`] operations.
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if any condition fails (no
    /// operations are applied), [`StoreError::BatchTooLarge`] over the cap,
    /// or [`StoreError`] on backend failure.
    fn transact_write(&self, ops: Vec<TransactOp>) -> Result<(), StoreError>;
}
