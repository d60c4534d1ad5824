// crates/pipeline-engine/src/audit.rs
// ============================================================================
// Module: Audit Recorder (C10)
// Description: Best-effort, never-failing audit trail over the Item Store
//              Gateway.
// Purpose: Persist one AuditRecord per audited action without ever letting
//          a storage failure propagate back to the caller that triggered it.
// Dependencies: pipeline-core, uuid
// ============================================================================

//! ## Overview
//! `spec.md` §9's "never-throw audit" redesign note applies literally here:
//! [`AuditRecorder::record`] returns `Option<AuditRecord>`, not a `Result`.
//! Callers may inspect the returned id but must never branch on its
//! absence — a failed audit write is swallowed, not surfaced.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use pipeline_core::entities::AuditRecord;
use pipeline_core::identifiers::AccountId;
use pipeline_core::identifiers::AuditId;
use pipeline_core::interfaces::ItemRecord as _;
use pipeline_core::time::Timestamp;
use pipeline_core::ItemStore;
use serde_json::Value;

// ============================================================================
// SECTION: Params
// ============================================================================

/// Input to one audit write.
pub struct AuditParams {
    /// Entity kind the audited action concerned (e.g. `"stage"`, `"inbox_item"`).
    pub entity: String,
    /// Account the action concerned, when known.
    pub account_id: Option<AccountId>,
    /// Outcome label (e.g. `"sent"`, `"failed"`, `"suppressed"`).
    pub status: String,
    /// Optional structured detail payload.
    pub detail: Option<Value>,
}

// ============================================================================
// SECTION: Recorder
// ============================================================================

/// Writes audit records to `store`, swallowing any write failure.
pub struct AuditRecorder {
    store: Arc<dyn ItemStore>,
}

impl AuditRecorder {
    /// Builds a recorder writing to `store`.
    #[must_use]
    pub const fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    /// Records one audit entry. Never fails visibly: a storage error yields
    /// `None` rather than propagating.
    #[must_use]
    pub fn record(&self, params: AuditParams) -> Option<AuditRecord> {
        let record = AuditRecord {
            audit_id: AuditId::new(uuid::Uuid::new_v4().to_string()),
            entity: params.entity,
            account_id: params.account_id,
            status: params.status,
            timestamp: Timestamp::now(),
            detail: params.detail,
        };
        let item = record.to_item().ok()?;
        self.store.put(item).ok()?;
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pipeline_core::Condition;
    use pipeline_core::Item;
    use pipeline_core::ItemKey;
    use pipeline_core::ItemStore;
    use pipeline_core::KeyCondition;
    use pipeline_core::StoreError;
    use pipeline_core::TransactOp;

    use super::AuditParams;
    use super::AuditRecorder;

    struct FailingStore;

    impl ItemStore for FailingStore {
        fn get(&self, _key: &ItemKey, _strongly_consistent: bool) -> Result<Option<Item>, StoreError> {
            Ok(None)
        }
        fn put(&self, _item: Item) -> Result<(), StoreError> {
            Err(StoreError::Io("disk full".to_owned()))
        }
        fn put_if(&self, _item: Item, _condition: Condition) -> Result<(), StoreError> {
            Ok(())
        }
        fn delete(&self, _key: &ItemKey) -> Result<(), StoreError> {
            Ok(())
        }
        fn query(&self, _condition: &KeyCondition) -> Result<Vec<Item>, StoreError> {
            Ok(Vec::new())
        }
        fn query_index(&self, _index_name: &str, _condition: &KeyCondition) -> Result<Vec<Item>, StoreError> {
            Ok(Vec::new())
        }
        fn batch_write(&self, _items: Vec<Item>) -> Result<(), StoreError> {
            Ok(())
        }
        fn transact_write(&self, _ops: Vec<TransactOp>) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn failing_store_yields_none_not_panic() {
        let recorder = AuditRecorder::new(Arc::new(FailingStore));
        let result = recorder.record(AuditParams { entity: "stage".to_owned(), account_id: None, status: "failed".to_owned(), detail: None });
        assert!(result.is_none());
    }
}
