// crates/pipeline-core/src/entities.rs
// ============================================================================
// Module: Pipeline Engine Data Model
// Description: Persisted entity shapes stored in the item store (PK/SK + GSIs).
// Purpose: Canonical, serializable records for accounts, pipelines, executions,
//          inbox items, credentials, and audit records.
// Dependencies: crate::identifiers, crate::time, serde
// ============================================================================

//! ## Overview
//! Every type here corresponds to one row of `spec.md` §3's entity table.
//! Each implements [`ItemRecord`] so the Item Store Gateway (C2) can derive a
//! `(pk, sk)` pair without callers hand-assembling key strings. None of these
//! types enforce tenant isolation themselves — that is the Tenant Router's
//! (C1) job; these are plain data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::AccountId;
use crate::identifiers::BuildJobId;
use crate::identifiers::CredentialId;
use crate::identifiers::ExecutionId;
use crate::identifiers::InboxId;
use crate::identifiers::LicenseId;
use crate::identifiers::NodeId;
use crate::identifiers::PipelineId;
use crate::identifiers::ResumeToken;
use crate::identifiers::StageId;
use crate::interfaces::ItemRecord;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Tenant & Licensing
// ============================================================================

/// Data-plane placement for an account.
///
/// # Invariants
/// - `Private` accounts always carry a dedicated store handle; `Public` and
///   `Hybrid` accounts resolve to the shared store for operational records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudType {
    /// Shared data plane.
    Public,
    /// Dedicated data plane.
    Private,
    /// Control plane shared, selected operational records dedicated.
    Hybrid,
}

/// Master tenant record (`PK = ACCOUNT#<id>`, `SK = METADATA`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Tenant identifier.
    pub account_id: AccountId,
    /// Data-plane placement for this account.
    pub cloud_type: CloudType,
    /// Dedicated store name, present when `cloud_type != Public`.
    pub dedicated_store: Option<String>,
}

impl ItemRecord for Account {
    fn pk(&self) -> String {
        format!("ACCOUNT#{}", self.account_id)
    }

    fn sk(&self) -> String {
        "METADATA".to_owned()
    }
}

/// Seat-cap license record (`PK = ACCOUNT#<id>`, `SK = LICENSE#<lid>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Owning account.
    pub account_id: AccountId,
    /// License identifier.
    pub license_id: LicenseId,
    /// Enterprise name the license was issued under.
    pub enterprise: String,
    /// Licensed product name.
    pub product: String,
    /// Purchased seat count.
    pub number_of_users: u32,
    /// License expiry; a license is active iff `end_date` is in the future.
    pub end_date: Timestamp,
}

impl ItemRecord for License {
    fn pk(&self) -> String {
        format!("ACCOUNT#{}", self.account_id)
    }

    fn sk(&self) -> String {
        format!("LICENSE#{}", self.license_id)
    }
}

// ============================================================================
// SECTION: Pipeline Template & Build Job
// ============================================================================

/// Layout-only node entry in a persisted pipeline (`nodes[]`).
///
/// # Invariants
/// - Carries no execution-order information; `yamlContent` is authoritative
///   for ordering (`spec.md` §4.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineNodeLayout {
    /// Node identifier.
    pub node_id: NodeId,
    /// Display name.
    pub name: String,
}

/// Layout-only edge entry in a persisted pipeline (`edges[]`), `source -> target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineEdge {
    /// Upstream node.
    pub source: NodeId,
    /// Downstream node.
    pub target: NodeId,
}

/// Persisted pipeline graph (`PK = ACCOUNT#<id>`, `SK = PIPELINE#<pid>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Owning account.
    pub account_id: AccountId,
    /// Pipeline identifier.
    pub pipeline_id: PipelineId,
    /// Layout-only node list.
    pub nodes: Vec<PipelineNodeLayout>,
    /// Layout-only edge list.
    pub edges: Vec<PipelineEdge>,
    /// Authoritative YAML graph definition.
    pub yaml_content: String,
}

impl ItemRecord for Pipeline {
    fn pk(&self) -> String {
        format!("ACCOUNT#{}", self.account_id)
    }

    fn sk(&self) -> String {
        format!("PIPELINE#{}", self.pipeline_id)
    }
}

/// Per-stage override captured in a build job's `pipelineStagesState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOverride {
    /// Stage this override applies to.
    pub stage_id: StageId,
    /// When `false`, the stage compiles to `SKIPPED` with no handler invocation.
    pub execution_enabled: bool,
    /// When the stage declares a tool but this is `false`, it compiles to `SKIPPED`.
    pub tool_selected: bool,
    /// Credential to resolve for this stage, if any.
    pub credential_id: Option<CredentialId>,
}

/// Binds a pipeline template to runtime configuration
/// (`PK = ACCOUNT#<id>` public or `BUILD_JOB#LIST` private, `SK = BUILD_JOB#<bid>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildJob {
    /// Owning account.
    pub account_id: AccountId,
    /// Build job identifier.
    pub build_job_id: BuildJobId,
    /// Bound pipeline template.
    pub pipeline_id: PipelineId,
    /// Whether this account resolves to a dedicated data plane (affects PK).
    pub is_private: bool,
    /// Per-stage overrides.
    pub pipeline_stages_state: Vec<StageOverride>,
    /// Selected deploy artifacts (SAP Cloud Integration artifact names).
    pub selected_artifacts: Vec<String>,
    /// Target branch, when the Code stage needs one.
    pub branch: Option<String>,
    /// Approver email addresses for Approval stages.
    pub approvers: Vec<String>,
}

impl ItemRecord for BuildJob {
    fn pk(&self) -> String {
        if self.is_private {
            "BUILD_JOB#LIST".to_owned()
        } else {
            format!("ACCOUNT#{}", self.account_id)
        }
    }

    fn sk(&self) -> String {
        format!("BUILD_JOB#{}", self.build_job_id)
    }
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Monotonic stage status (`spec.md` §3 invariant 3).
///
/// # Invariants
/// - Never regresses: `Pending -> Running -> {Success, Failed, Skipped,
///   WaitingApproval}`; from `WaitingApproval` only to `{Success, Failed,
///   Stale}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Completed successfully.
    Success,
    /// Completed with a failure.
    Failed,
    /// Compiled out (execution disabled or tool not selected).
    Skipped,
    /// Suspended pending human approval.
    WaitingApproval,
    /// Superseded by a sibling approval decision.
    Stale,
}

impl StageStatus {
    /// Whether this status accepts no further writes.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped | Self::Stale)
    }
}

/// Result of executing one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage identifier.
    pub stage_id: StageId,
    /// Owning node identifier.
    pub node_id: NodeId,
    /// Current status.
    pub status: StageStatus,
    /// Optional human-readable outcome message.
    pub message: Option<String>,
    /// Wall-clock duration of the attempt, in milliseconds.
    pub duration_ms: u64,
    /// Optional structured data produced by the handler (e.g. GitHub context).
    pub data: Option<serde_json::Value>,
    /// Log lines emitted while executing this stage.
    pub log_lines: Vec<String>,
}

/// Result rollup for one node (an environment vertex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResult {
    /// Node identifier.
    pub node_id: NodeId,
    /// Display name.
    pub name: String,
    /// Tier index this node ran in.
    pub tier: usize,
}

/// Execution-level status.
///
/// # Invariants
/// - Once `{Completed, Failed, Cancelled}`, no further stage writes are
///   accepted (`spec.md` §3 invariant 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Actively running.
    Running,
    /// Suspended awaiting approval.
    Paused,
    /// Every stage reached `{Success, Skipped}`.
    Completed,
    /// At least one stage reached `Failed`.
    Failed,
    /// Explicitly cancelled.
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status accepts no further stage writes.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Persisted suspension marker (`spec.md` §9 redesign of approval callbacks:
/// no long-lived parked coordinator, a fresh one is constructed on resume).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausedMarker {
    /// Suspended execution.
    pub execution_id: ExecutionId,
    /// Stage awaiting approval.
    pub stage_id: StageId,
    /// Opaque token correlating the resumption call to this suspension.
    pub resume_token: ResumeToken,
}

/// One run of a build job (`SK = EXECUTION#<eid>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Owning account.
    pub account_id: AccountId,
    /// Whether this account resolves to a dedicated data plane (affects PK).
    pub is_private: bool,
    /// Execution identifier.
    pub execution_id: ExecutionId,
    /// Bound pipeline.
    pub pipeline_id: PipelineId,
    /// Bound build job.
    pub build_job_id: BuildJobId,
    /// Current execution status.
    pub status: ExecutionStatus,
    /// Per-node result rollups, in tier order.
    pub node_results: Vec<NodeResult>,
    /// Per-stage results, in completion order.
    pub stage_results: Vec<StageResult>,
    /// Totally ordered log lines (`[NODE:<id>]`-prefixed).
    pub logs: Vec<String>,
    /// Snapshot of the execution-scoped shared context (e.g. the GitHub
    /// handler's `{repo, branch, token, basePath}`), persisted so a
    /// freshly constructed coordinator can rebuild it across a
    /// suspend/resume boundary rather than losing cross-tier state.
    pub context: std::collections::BTreeMap<String, serde_json::Value>,
    /// Suspension marker, present only while `status == Paused`.
    pub paused: Option<PausedMarker>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last mutation timestamp.
    pub updated_at: Timestamp,
}

impl ItemRecord for Execution {
    fn pk(&self) -> String {
        if self.is_private {
            "BUILD_JOB#LIST".to_owned()
        } else {
            format!("ACCOUNT#{}", self.account_id)
        }
    }

    fn sk(&self) -> String {
        format!("EXECUTION#{}", self.execution_id)
    }
}

// ============================================================================
// SECTION: Inbox / Approval
// ============================================================================

/// Approval inbox item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxStatus {
    /// Awaiting an approver decision.
    Pending,
    /// Approved by its recipient.
    Approved,
    /// Rejected by its recipient.
    Rejected,
    /// Dismissed without affecting the execution.
    Dismissed,
    /// Superseded because a sibling item was approved or rejected first.
    Stale,
}

impl InboxStatus {
    /// Whether this status accepts no further actioning (`spec.md` §4.9
    /// idempotency: actioning a non-pending item fails with `NotFound`).
    #[must_use]
    pub const fn is_actionable(self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Per-recipient approval request (`SK = INBOX#<iid>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxItem {
    /// Owning account.
    pub account_id: AccountId,
    /// Whether this account resolves to a dedicated data plane (affects PK).
    pub is_private: bool,
    /// Inbox item identifier.
    pub inbox_id: InboxId,
    /// Execution that raised this approval request.
    pub execution_id: ExecutionId,
    /// Stage waiting on this approval.
    pub stage_id: StageId,
    /// Recipient email address.
    pub approver_email: String,
    /// Current status.
    pub status: InboxStatus,
    /// Actor who actioned the item, once actioned.
    pub actioned_by: Option<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Actioning timestamp, once actioned.
    pub actioned_at: Option<Timestamp>,
}

impl ItemRecord for InboxItem {
    fn pk(&self) -> String {
        if self.is_private {
            "INBOX#LIST".to_owned()
        } else {
            format!("ACCOUNT#{}", self.account_id)
        }
    }

    fn sk(&self) -> String {
        format!("INBOX#{}", self.inbox_id)
    }
}

// ============================================================================
// SECTION: Credential
// ============================================================================

/// Stored connector credential (`SK = CREDENTIAL#<cid>`). Values are raw
/// label -> value pairs; the Credential Resolver (C4) is responsible for
/// probing well-known label spellings and redacting them for log surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Owning account.
    pub account_id: AccountId,
    /// Credential identifier.
    pub credential_id: CredentialId,
    /// Connector type this credential is scoped to (e.g. `jira`, `github`, `sap`).
    pub connector_type: String,
    /// Raw label -> value pairs, as originally entered.
    pub fields: std::collections::BTreeMap<String, String>,
}

impl ItemRecord for Credential {
    fn pk(&self) -> String {
        format!("ACCOUNT#{}", self.account_id)
    }

    fn sk(&self) -> String {
        format!("CREDENTIAL#{}", self.credential_id)
    }
}

// ============================================================================
// SECTION: Audit Record
// ============================================================================

/// Immutable audit entry (`PK = NOTIFICATION_AUDIT#<id>`, `SK = METADATA`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Audit record identifier.
    pub audit_id: crate::identifiers::AuditId,
    /// Entity kind the audit record concerns (e.g. `stage`, `notification`).
    pub entity: String,
    /// Account the audited action concerned, when known.
    pub account_id: Option<AccountId>,
    /// Outcome label (e.g. `sent`, `failed`, `suppressed`).
    pub status: String,
    /// Timestamp of the audited attempt.
    pub timestamp: Timestamp,
    /// Optional structured detail payload.
    pub detail: Option<serde_json::Value>,
}

impl ItemRecord for AuditRecord {
    fn pk(&self) -> String {
        format!("NOTIFICATION_AUDIT#{}", self.audit_id)
    }

    fn sk(&self) -> String {
        "METADATA".to_owned()
    }
}
