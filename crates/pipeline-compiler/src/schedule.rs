// crates/pipeline-compiler/src/schedule.rs
// ============================================================================
// Module: Dependency Scheduler (C6)
// Description: Topological tiering of compiled nodes, with cycle detection.
// Dependencies: pipeline_core::plan
// ============================================================================

//! ## Overview
//! [`schedule`] assigns each node a tier index equal to one more than the
//! maximum tier of its predecessors (roots sit at tier 0), using an
//! iterative depth-first walk with `Visiting`/`Visited` marks to detect
//! cycles without recursion depth concerns on pathological inputs.
//! Within a node, [`order_stages`] linearizes stages by `depends_on`,
//! falling back to declaration order for stages with no explicit
//! dependency — this version has no parallel-stage support.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;

use pipeline_core::identifiers::NodeId;
use pipeline_core::identifiers::StageId;
use pipeline_core::plan::CompiledNode;
use pipeline_core::plan::CompiledStage;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while scheduling compiled nodes or stages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// A node's `depends_on` graph contains a cycle.
    #[error("circular dependency detected at node {node_id}")]
    CircularDependency {
        /// The node whose visit detected the back-edge.
        node_id: NodeId,
    },
    /// A node declared a dependency on a node id that does not exist.
    #[error("node {node_id} depends on unknown node {missing}")]
    UnknownNodeDependency {
        /// The node declaring the dependency.
        node_id: NodeId,
        /// The missing node id it referenced.
        missing: NodeId,
    },
    /// A stage's `depends_on` graph (within one node) contains a cycle.
    #[error("circular dependency detected at stage {stage_id}")]
    CircularStageDependency {
        /// The stage whose visit detected the back-edge.
        stage_id: StageId,
    },
}

// ============================================================================
// SECTION: Node Tiering
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// Assigns each node in `nodes` to a tier; nodes within a tier have no
/// dependency relationship and may run in parallel. Tiers are returned as
/// index lists into `nodes`, preserving declaration order as the tie-break
/// within a tier.
///
/// # Errors
/// Returns [`SchedulerError::CircularDependency`] if the `depends_on` graph
/// has a cycle, or [`SchedulerError::UnknownNodeDependency`] if a node names
/// a dependency that does not exist.
pub fn schedule(nodes: &[CompiledNode]) -> Result<Vec<Vec<usize>>, SchedulerError> {
    let index_by_id: HashMap<&NodeId, usize> = nodes.iter().enumerate().map(|(idx, node)| (&node.id, idx)).collect();

    let mut marks: Vec<Option<Mark>> = vec![None; nodes.len()];
    let mut tier_of: Vec<usize> = vec![0; nodes.len()];

    for start in 0..nodes.len() {
        visit_node(start, nodes, &index_by_id, &mut marks, &mut tier_of)?;
    }

    let max_tier = tier_of.iter().copied().max().unwrap_or(0);
    let mut tiers = vec![Vec::new(); max_tier + 1];
    for (idx, tier) in tier_of.iter().enumerate() {
        tiers[*tier].push(idx);
    }
    Ok(tiers)
}

fn visit_node(
    idx: usize,
    nodes: &[CompiledNode],
    index_by_id: &HashMap<&NodeId, usize>,
    marks: &mut [Option<Mark>],
    tier_of: &mut [usize],
) -> Result<usize, SchedulerError> {
    match marks[idx] {
        Some(Mark::Visited) => return Ok(tier_of[idx]),
        Some(Mark::Visiting) => return Err(SchedulerError::CircularDependency { node_id: nodes[idx].id.clone() }),
        None => {}
    }
    marks[idx] = Some(Mark::Visiting);

    let mut max_pred_tier: Option<usize> = None;
    for dep in &nodes[idx].depends_on {
        let Some(&dep_idx) = index_by_id.get(dep) else {
            return Err(SchedulerError::UnknownNodeDependency { node_id: nodes[idx].id.clone(), missing: dep.clone() });
        };
        let dep_tier = visit_node(dep_idx, nodes, index_by_id, marks, tier_of)?;
        max_pred_tier = Some(max_pred_tier.map_or(dep_tier, |current| current.max(dep_tier)));
    }

    let tier = max_pred_tier.map_or(0, |pred| pred + 1);
    tier_of[idx] = tier;
    marks[idx] = Some(Mark::Visited);
    Ok(tier)
}

// ============================================================================
// SECTION: Stage Ordering
// ============================================================================

/// Linearizes `stages` by `depends_on`, falling back to declaration order
/// for any stage with no explicit dependency.
///
/// # Errors
/// Returns [`SchedulerError::CircularStageDependency`] if the stage
/// dependency graph has a cycle.
pub fn order_stages(stages: &[CompiledStage]) -> Result<Vec<usize>, SchedulerError> {
    let index_by_id: HashMap<&StageId, usize> = stages.iter().enumerate().map(|(idx, stage)| (&stage.id, idx)).collect();

    let mut marks: Vec<Option<Mark>> = vec![None; stages.len()];
    let mut order = Vec::with_capacity(stages.len());

    for start in 0..stages.len() {
        visit_stage(start, stages, &index_by_id, &mut marks, &mut order)?;
    }
    Ok(order)
}

fn visit_stage(
    idx: usize,
    stages: &[CompiledStage],
    index_by_id: &HashMap<&StageId, usize>,
    marks: &mut [Option<Mark>],
    order: &mut Vec<usize>,
) -> Result<(), SchedulerError> {
    match marks[idx] {
        Some(Mark::Visited) => return Ok(()),
        Some(Mark::Visiting) => return Err(SchedulerError::CircularStageDependency { stage_id: stages[idx].id.clone() }),
        None => {}
    }
    marks[idx] = Some(Mark::Visiting);
    for dep in &stages[idx].depends_on {
        if let Some(&dep_idx) = index_by_id.get(dep) {
            visit_stage(dep_idx, stages, index_by_id, marks, order)?;
        }
    }
    marks[idx] = Some(Mark::Visited);
    order.push(idx);
    Ok(())
}

#[cfg(test)]
mod tests {
    use pipeline_core::plan::CompiledNode;
    use pipeline_core::plan::CompiledStage;
    use pipeline_core::plan::StageType;
    use pipeline_core::plan::ToolConfig;

    use super::order_stages;
    use super::schedule;
    use super::SchedulerError;

    fn node(id: &str, depends_on: &[&str]) -> CompiledNode {
        CompiledNode {
            id: id.into(),
            name: id.to_owned(),
            depends_on: depends_on.iter().map(|dep| (*dep).into()).collect(),
            stages: Vec::new(),
        }
    }

    fn stage(id: &str, depends_on: &[&str]) -> CompiledStage {
        CompiledStage {
            id: id.into(),
            name: id.to_owned(),
            stage_type: StageType::Generic,
            tool_config: ToolConfig::None,
            execution_enabled: true,
            tool_selected: false,
            credential_id: None,
            approvers: Vec::new(),
            depends_on: depends_on.iter().map(|dep| (*dep).into()).collect(),
        }
    }

    #[test]
    fn independent_nodes_share_tier_zero() {
        let nodes = vec![node("a", &[]), node("b", &[])];
        let tiers = schedule(&nodes).expect("schedules");
        assert_eq!(tiers, vec![vec![0, 1]]);
    }

    #[test]
    fn dependent_nodes_are_staggered() {
        let nodes = vec![node("a", &[]), node("b", &["a"])];
        let tiers = schedule(&nodes).expect("schedules");
        assert_eq!(tiers, vec![vec![0], vec![1]]);
    }

    #[test]
    fn cycle_is_detected() {
        let nodes = vec![node("a", &["b"]), node("b", &["a"])];
        assert!(matches!(schedule(&nodes), Err(SchedulerError::CircularDependency { .. })));
    }

    #[test]
    fn stage_order_respects_depends_on() {
        let stages = vec![stage("second", &["first"]), stage("first", &[])];
        let order = order_stages(&stages).expect("orders");
        assert_eq!(order, vec![1, 0]);
    }
}
