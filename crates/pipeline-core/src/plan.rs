// crates/pipeline-core/src/plan.rs
// ============================================================================
// Module: Compiled Pipeline IR
// Description: Output shape of the Pipeline Compiler (C5) and Dependency
//              Scheduler (C6); consumed by the Stage Dispatcher (C7) and
//              Execution Coordinator (C8).
// Dependencies: crate::identifiers, serde
// ============================================================================

//! ## Overview
//! A compiled pipeline is a flat `Vec<CompiledNode>`; the Dependency
//! Scheduler turns that into tiers of node indices. Keeping the IR here
//! (rather than in the compiler crate) lets the dispatcher and coordinator
//! depend only on `pipeline-core`, not on the compiler itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::CredentialId;
use crate::identifiers::NodeId;
use crate::identifiers::StageId;

// ============================================================================
// SECTION: Stage Type
// ============================================================================

/// Closed set of stage types (`spec.md` §9 REDESIGN FLAGS: a tagged variant
/// replacing the source's string-keyed dynamic dispatch). Unknown stage-type
/// strings compile to [`StageType::Generic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    /// JIRA issue verification / connectivity probe.
    Plan,
    /// GitHub repository/branch verification.
    Code,
    /// No external call; informational only.
    Build,
    /// SAP Cloud Integration artifact deploy.
    Deploy,
    /// No external call; informational only.
    Test,
    /// Human-in-the-loop approval gate.
    Approval,
    /// No external call; informational only.
    Release,
    /// Fallback for unrecognized stage-type strings.
    Generic,
}

impl StageType {
    /// Parses a stage-type string from stored YAML, falling back to
    /// [`StageType::Generic`] for anything unrecognized (`spec.md` §4.5).
    #[must_use]
    pub fn from_declared(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "plan" => Self::Plan,
            "code" => Self::Code,
            "build" => Self::Build,
            "deploy" => Self::Deploy,
            "test" => Self::Test,
            "approval" => Self::Approval,
            "release" => Self::Release,
            _ => Self::Generic,
        }
    }
}

// ============================================================================
// SECTION: Tool Configuration
// ============================================================================

/// Stage-type-specific tool configuration, carried from YAML into the
/// compiled plan verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "connector")]
pub enum ToolConfig {
    /// JIRA connector configuration.
    Jira {
        /// Base URL of the JIRA instance.
        base_url: String,
        /// Optional issue key to verify; absent means a connectivity probe.
        issue_key: Option<String>,
    },
    /// GitHub connector configuration.
    Github {
        /// Repository owner.
        owner: String,
        /// Repository name.
        repo: String,
        /// Branch to verify.
        branch: String,
    },
    /// SAP Cloud Integration connector configuration.
    Sap {
        /// Base URL of the SAP Cloud Integration tenant.
        base_url: String,
        /// OAuth2 token endpoint.
        token_url: String,
        /// Declared artifacts to deploy.
        artifacts: Vec<SapArtifact>,
    },
    /// No tool configuration (Build/Test/Release/Generic/Approval stages).
    None,
}

/// One SAP Cloud Integration design-time artifact reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SapArtifact {
    /// Artifact name.
    pub name: String,
    /// Artifact type, selecting the design-time collection endpoint.
    pub artifact_type: SapArtifactType,
}

/// SAP design-time artifact type, mapped to its collection endpoint
/// (`spec.md` §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SapArtifactType {
    /// `IntegrationDesigntimeArtifacts`.
    IntegrationFlow,
    /// `ValueMappingDesigntimeArtifacts`.
    ValueMapping,
    /// `MessageMappingDesigntimeArtifacts`.
    MessageMapping,
    /// `ScriptCollectionDesigntimeArtifacts`.
    ScriptCollection,
    /// `ScriptCollectionDesigntimeArtifacts` (alias for a single Groovy script).
    GroovyScript,
    /// `MessageResourcesDesigntimeArtifacts`.
    MessageResource,
}

impl SapArtifactType {
    /// Returns the design-time collection endpoint segment for this artifact type.
    #[must_use]
    pub const fn collection_endpoint(self) -> &'static str {
        match self {
            Self::IntegrationFlow => "IntegrationDesigntimeArtifacts",
            Self::ValueMapping => "ValueMappingDesigntimeArtifacts",
            Self::MessageMapping => "MessageMappingDesigntimeArtifacts",
            Self::ScriptCollection | Self::GroovyScript => "ScriptCollectionDesigntimeArtifacts",
            Self::MessageResource => "MessageResourcesDesigntimeArtifacts",
        }
    }
}

// ============================================================================
// SECTION: Compiled Stage / Node
// ============================================================================

/// One compiled stage within a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledStage {
    /// Stage identifier.
    pub id: StageId,
    /// Display name.
    pub name: String,
    /// Closed stage type.
    pub stage_type: StageType,
    /// Tool configuration, if the stage declares one.
    pub tool_config: ToolConfig,
    /// Whether the build job enabled execution for this stage.
    pub execution_enabled: bool,
    /// Whether the build job selected a tool for this stage.
    pub tool_selected: bool,
    /// Credential to resolve for this stage, if any.
    pub credential_id: Option<CredentialId>,
    /// Approver email addresses, for Approval stages.
    pub approvers: Vec<String>,
    /// Stage ids this stage must follow within its node.
    pub depends_on: Vec<StageId>,
}

impl CompiledStage {
    /// Whether this stage compiles directly to `SKIPPED` with no handler
    /// invocation (`spec.md` §4.5: disabled, or a declared tool not
    /// selected).
    #[must_use]
    pub fn compiles_skipped(&self) -> bool {
        if !self.execution_enabled {
            return true;
        }
        !matches!(self.tool_config, ToolConfig::None) && !self.tool_selected
    }
}

/// One compiled node (an environment vertex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledNode {
    /// Node identifier.
    pub id: NodeId,
    /// Display name.
    pub name: String,
    /// Node identifiers this node depends on (derived from `edges[]`).
    pub depends_on: Vec<NodeId>,
    /// Stages, in their serial execution order within this node.
    pub stages: Vec<CompiledStage>,
}

/// A fully compiled, scheduled pipeline: nodes grouped into parallel tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledPlan {
    /// All compiled nodes, keyed by position for tier indexing.
    pub nodes: Vec<CompiledNode>,
    /// Tiers of node indices into `nodes`; each tier runs in parallel, tiers
    /// run in order.
    pub tiers: Vec<Vec<usize>>,
}

impl CompiledPlan {
    /// Returns the compiled node at `index`.
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&CompiledNode> {
        self.nodes.get(index)
    }

    /// Total number of stages across every node, used for empty-pipeline
    /// short-circuiting (`spec.md` §8 boundary behavior).
    #[must_use]
    pub fn total_stage_count(&self) -> usize {
        self.nodes.iter().map(|node| node.stages.len()).sum()
    }
}
