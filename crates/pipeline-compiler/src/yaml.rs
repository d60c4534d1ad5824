// crates/pipeline-compiler/src/yaml.rs
// ============================================================================
// Module: Pipeline YAML Schema
// Description: Deserialization shape of `Pipeline.yaml_content`.
// Purpose: The authoritative graph the compiler reads; `Pipeline.nodes`/
//          `.edges` are layout-only and never consulted for ordering.
// Dependencies: serde, serde_yaml
// ============================================================================

use serde::Deserialize;

/// Root of a pipeline's authoritative YAML graph.
#[derive(Debug, Clone, Deserialize)]
pub struct YamlPipeline {
    /// Declared nodes, in declaration order.
    #[serde(default)]
    pub nodes: Vec<YamlNode>,
}

/// One declared node (environment) in the YAML graph.
#[derive(Debug, Clone, Deserialize)]
pub struct YamlNode {
    /// Node identifier, matching a `PipelineNodeLayout.node_id`.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Node identifiers this node depends on. When absent, node order falls
    /// back to edge-derived order at the caller.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Declared stages, in declaration order.
    #[serde(default)]
    pub stages: Vec<YamlStage>,
}

/// One declared stage within a node.
#[derive(Debug, Clone, Deserialize)]
pub struct YamlStage {
    /// Stage identifier, unique within the node.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Declared stage type string; unrecognized values compile to `Generic`.
    #[serde(rename = "type", default)]
    pub stage_type: Option<String>,
    /// Stage identifiers this stage must follow within the same node.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Connector-specific configuration block, passed through verbatim.
    #[serde(default)]
    pub tool: Option<YamlToolConfig>,
}

/// Raw connector configuration as declared in YAML, prior to being folded
/// into [`pipeline_core::plan::ToolConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "connector", rename_all = "snake_case")]
pub enum YamlToolConfig {
    /// JIRA connector.
    Jira {
        /// Base URL of the JIRA instance.
        base_url: String,
        /// Optional issue key to verify.
        #[serde(default)]
        issue_key: Option<String>,
    },
    /// GitHub connector.
    Github {
        /// Repository owner.
        owner: String,
        /// Repository name.
        repo: String,
        /// Branch to verify.
        branch: String,
    },
    /// SAP Cloud Integration connector.
    Sap {
        /// Base URL of the SAP Cloud Integration tenant.
        base_url: String,
        /// OAuth2 token endpoint.
        token_url: String,
        /// Declared artifacts, as `(name, artifact_type)` pairs.
        #[serde(default)]
        artifacts: Vec<YamlSapArtifact>,
    },
}

/// One declared SAP artifact reference.
#[derive(Debug, Clone, Deserialize)]
pub struct YamlSapArtifact {
    /// Artifact name.
    pub name: String,
    /// Artifact type string, matched case-sensitively against
    /// [`pipeline_core::plan::SapArtifactType`]'s snake_case spellings.
    pub artifact_type: String,
}

/// Parses `yaml_content` into a [`YamlPipeline`].
///
/// # Errors
/// Returns the underlying `serde_yaml` error on malformed YAML.
pub fn parse(yaml_content: &str) -> Result<YamlPipeline, serde_yaml::Error> {
    serde_yaml::from_str(yaml_content)
}
