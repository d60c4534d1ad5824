// crates/pipeline-compiler/src/compile.rs
// ============================================================================
// Module: Pipeline Compiler (C5)
// Description: Folds a stored Pipeline + BuildJob stage overrides into the
//              compiled IR consumed by the scheduler and dispatcher.
// Dependencies: crate::yaml, pipeline_core::entities, pipeline_core::plan
// ============================================================================

//! ## Overview
//! [`compile`] treats `yaml_content` as the sole source of graph structure;
//! `Pipeline.nodes`/`.edges` are layout hints the UI uses for drawing and are
//! never consulted here. `BuildJob.pipeline_stages_state` supplies the
//! per-stage `execution_enabled`/`tool_selected`/`credential_id` triad that
//! YAML itself does not carry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use pipeline_core::entities::BuildJob;
use pipeline_core::entities::Pipeline;
use pipeline_core::identifiers::CredentialId;
use pipeline_core::identifiers::NodeId;
use pipeline_core::identifiers::StageId;
use pipeline_core::plan::CompiledNode;
use pipeline_core::plan::CompiledStage;
use pipeline_core::plan::SapArtifact;
use pipeline_core::plan::SapArtifactType;
use pipeline_core::plan::StageType;
use pipeline_core::plan::ToolConfig;
use thiserror::Error;

use crate::yaml::YamlSapArtifact;
use crate::yaml::YamlStage;
use crate::yaml::YamlToolConfig;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while compiling a [`Pipeline`] into [`CompiledNode`]s.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    /// `yaml_content` failed to parse.
    #[error("malformed pipeline yaml: {0}")]
    MalformedYaml(String),
    /// A stage declared an unrecognized SAP artifact type.
    #[error("unknown sap artifact type {type_name:?} on stage {stage_id}")]
    UnknownArtifactType {
        /// The stage that declared the artifact.
        stage_id: String,
        /// The unrecognized type string.
        type_name: String,
    },
}

// ============================================================================
// SECTION: Compilation
// ============================================================================

/// Compiles `pipeline` against `build_job`'s per-stage overrides.
///
/// # Errors
/// Returns [`CompileError`] if `yaml_content` does not parse, or declares a
/// SAP artifact with an unrecognized `artifact_type`.
pub fn compile(pipeline: &Pipeline, build_job: &BuildJob) -> Result<Vec<CompiledNode>, CompileError> {
    let graph = crate::yaml::parse(&pipeline.yaml_content).map_err(|err| CompileError::MalformedYaml(err.to_string()))?;

    let overrides: BTreeMap<StageId, &pipeline_core::entities::StageOverride> =
        build_job.pipeline_stages_state.iter().map(|ov| (ov.stage_id.clone(), ov)).collect();

    let mut nodes = Vec::with_capacity(graph.nodes.len());
    for yaml_node in &graph.nodes {
        let node_id = NodeId::from(yaml_node.id.as_str());
        let depends_on = yaml_node.depends_on.iter().map(|raw| NodeId::from(raw.as_str())).collect();

        let mut stages = Vec::with_capacity(yaml_node.stages.len());
        for yaml_stage in &yaml_node.stages {
            stages.push(compile_stage(yaml_stage, &overrides, &build_job.approvers)?);
        }

        nodes.push(CompiledNode { id: node_id, name: yaml_node.name.clone().unwrap_or_else(|| yaml_node.id.clone()), depends_on, stages });
    }
    Ok(nodes)
}

fn compile_stage(
    yaml_stage: &YamlStage,
    overrides: &BTreeMap<StageId, &pipeline_core::entities::StageOverride>,
    build_job_approvers: &[String],
) -> Result<CompiledStage, CompileError> {
    let stage_id = StageId::from(yaml_stage.id.as_str());
    let stage_type = yaml_stage.stage_type.as_deref().map_or(StageType::Generic, StageType::from_declared);
    let tool_config = compile_tool_config(yaml_stage)?;

    let stage_override = overrides.get(&stage_id);
    let execution_enabled = stage_override.is_none_or(|ov| ov.execution_enabled);
    let tool_selected = stage_override.is_some_and(|ov| ov.tool_selected);
    let credential_id: Option<CredentialId> = stage_override.and_then(|ov| ov.credential_id.clone());
    // Approvers are a build-job-level list (`spec.md` §4.9), not a per-stage
    // YAML field; every Approval stage in the pipeline shares it.
    let approvers = if matches!(stage_type, StageType::Approval) { build_job_approvers.to_vec() } else { Vec::new() };

    Ok(CompiledStage {
        id: stage_id,
        name: yaml_stage.name.clone().unwrap_or_else(|| yaml_stage.id.clone()),
        stage_type,
        tool_config,
        execution_enabled,
        tool_selected,
        credential_id,
        approvers,
        depends_on: yaml_stage.depends_on.iter().map(|raw| StageId::from(raw.as_str())).collect(),
    })
}

fn compile_tool_config(yaml_stage: &YamlStage) -> Result<ToolConfig, CompileError> {
    let Some(tool) = &yaml_stage.tool else {
        return Ok(ToolConfig::None);
    };
    match tool {
        YamlToolConfig::Jira { base_url, issue_key } => {
            Ok(ToolConfig::Jira { base_url: base_url.clone(), issue_key: issue_key.clone() })
        }
        YamlToolConfig::Github { owner, repo, branch } => {
            Ok(ToolConfig::Github { owner: owner.clone(), repo: repo.clone(), branch: branch.clone() })
        }
        YamlToolConfig::Sap { base_url, token_url, artifacts } => {
            let compiled_artifacts =
                artifacts.iter().map(|artifact| compile_sap_artifact(&yaml_stage.id, artifact)).collect::<Result<Vec<_>, _>>()?;
            Ok(ToolConfig::Sap { base_url: base_url.clone(), token_url: token_url.clone(), artifacts: compiled_artifacts })
        }
    }
}

fn compile_sap_artifact(stage_id: &str, artifact: &YamlSapArtifact) -> Result<SapArtifact, CompileError> {
    let artifact_type = match artifact.artifact_type.as_str() {
        "integration_flow" => SapArtifactType::IntegrationFlow,
        "value_mapping" => SapArtifactType::ValueMapping,
        "message_mapping" => SapArtifactType::MessageMapping,
        "script_collection" => SapArtifactType::ScriptCollection,
        "groovy_script" => SapArtifactType::GroovyScript,
        "message_resource" => SapArtifactType::MessageResource,
        other => {
            return Err(CompileError::UnknownArtifactType { stage_id: stage_id.to_owned(), type_name: other.to_owned() });
        }
    };
    Ok(SapArtifact { name: artifact.name.clone(), artifact_type })
}

#[cfg(test)]
mod tests {
    use pipeline_core::entities::StageOverride;

    use super::compile;
    use super::CompileError;

    fn pipeline_with_yaml(yaml: &str) -> pipeline_core::entities::Pipeline {
        pipeline_core::entities::Pipeline {
            account_id: "acct-1".into(),
            pipeline_id: "pipe-1".into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            yaml_content: yaml.to_owned(),
        }
    }

    fn build_job(overrides: Vec<StageOverride>) -> pipeline_core::entities::BuildJob {
        pipeline_core::entities::BuildJob {
            account_id: "acct-1".into(),
            build_job_id: "job-1".into(),
            pipeline_id: "pipe-1".into(),
            is_private: false,
            pipeline_stages_state: overrides,
            selected_artifacts: Vec::new(),
            branch: None,
            approvers: Vec::new(),
        }
    }

    #[test]
    fn disabled_stage_compiles_but_reports_disabled() {
        let yaml = "nodes:\n  - id: dev\n    stages:\n      - id: plan\n        type: plan\n";
        let pipeline = pipeline_with_yaml(yaml);
        let job = build_job(vec![StageOverride {
            stage_id: "plan".into(),
            execution_enabled: false,
            tool_selected: false,
            credential_id: None,
        }]);
        let nodes = compile(&pipeline, &job).expect("compiles");
        assert!(nodes[0].stages[0].compiles_skipped());
    }

    #[test]
    fn unknown_stage_type_falls_back_to_generic() {
        let yaml = "nodes:\n  - id: dev\n    stages:\n      - id: mystery\n        type: frobnicate\n";
        let pipeline = pipeline_with_yaml(yaml);
        let job = build_job(Vec::new());
        let nodes = compile(&pipeline, &job).expect("compiles");
        assert_eq!(nodes[0].stages[0].stage_type, pipeline_core::plan::StageType::Generic);
    }

    #[test]
    fn malformed_yaml_is_reported() {
        let pipeline = pipeline_with_yaml("not: [valid");
        let job = build_job(Vec::new());
        assert!(matches!(compile(&pipeline, &job), Err(CompileError::MalformedYaml(_))));
    }

    #[test]
    fn unknown_sap_artifact_type_is_rejected() {
        let yaml = "nodes:\n  - id: dev\n    stages:\n      - id: deploy\n        type: deploy\n        tool:\n          connector: sap\n          base_url: https://sap.example.com\n          token_url: https://sap.example.com/oauth/token\n          artifacts:\n            - name: foo\n              artifact_type: bogus\n";
        let pipeline = pipeline_with_yaml(yaml);
        let job = build_job(Vec::new());
        assert!(matches!(compile(&pipeline, &job), Err(CompileError::UnknownArtifactType { .. })));
    }
}
