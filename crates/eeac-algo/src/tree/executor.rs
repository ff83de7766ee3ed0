//! Depth-first execution of a validated tree.
//!
//! Each node receives the outputs of its parent and hands its own outputs to
//! every child unchanged. Sibling subtrees, and the candidates of an
//! evaluator, run on the current rayon pool. A failed or cancelled node
//! cancels its whole subtree; siblings are unaffected.

use std::collections::BTreeMap;
use std::sync::Arc;

use eeac_core::{EeacError, EeacResult, GeneratorCluster, GeneratorTrajectories, NetworkSnapshot};
use itertools::Itertools;
use rayon::prelude::*;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use web_time::Instant;

use super::model::{ExecutionTree, NodeId, NodeKind, NodeType};
use super::report::{CandidateReport, CriticalResult, ExecutionReport, NodeReport, NodeStatus};
use super::validation::IoType;
use crate::cci::{self, CandidateClusters, CciConfig};
use crate::ccs::{self, CcsConfig};
use crate::eac::{self, EacConfig, EacResult};
use crate::gtc::{self, GtcConfig};
use crate::omib::{OmibConfig, OmibModel, StabilityState};
use crate::otc::{self, ClusterResults, OtcConfig};

/// Values flowing from a node to its children.
#[derive(Debug, Clone, Default)]
pub struct NodeData {
    pub trajectories: Option<Arc<GeneratorTrajectories>>,
    pub clusters: Option<Arc<Vec<CandidateClusters>>>,
    pub cluster_results_list: Option<Arc<Vec<ClusterResults>>>,
    pub cluster_results: Option<Arc<ClusterResults>>,
    pub critical: Option<GeneratorCluster>,
    pub non_critical: Option<GeneratorCluster>,
    pub omib: Option<Arc<OmibModel>>,
    pub eac: Option<Arc<EacResult>>,
}

fn require<T>(value: &Option<T>, io: IoType) -> EeacResult<&T> {
    value
        .as_ref()
        .ok_or_else(|| EeacError::Config(format!("missing node input {io:?}")))
}

enum Step {
    Done,
    Cancelled(String),
}

#[derive(Default)]
struct NodeRun {
    output: NodeData,
    inputs: Map<String, Value>,
    outputs: Map<String, Value>,
    plot: Option<Value>,
    candidates: Vec<CandidateReport>,
    warning: Option<String>,
}

#[derive(Default)]
struct SubtreeOutcome {
    reports: Vec<NodeReport>,
    critical_results: Vec<CriticalResult>,
    warnings: Vec<String>,
}

impl SubtreeOutcome {
    fn extend(&mut self, other: SubtreeOutcome) {
        self.reports.extend(other.reports);
        self.critical_results.extend(other.critical_results);
        self.warnings.extend(other.warnings);
    }
}

fn time_ms(seconds: f64) -> Value {
    // Infinite times serialize as null
    json!(seconds * 1000.0)
}

fn results_summary(results: &ClusterResults) -> Value {
    json!({
        "critical_cluster": results.critical_names,
        "stability_state": results.stability_state,
        "swing_state": results.swing_state,
        "critical_angle_deg": results.critical_angle.to_degrees(),
        "maximum_angle_deg": results.maximum_angle.to_degrees(),
        "critical_time_ms": time_ms(results.critical_time),
        "maximum_time_ms": time_ms(results.maximum_time),
    })
}

const PARENT_FAILED: &str = "Execution of parent node failed.";
const PARENT_CANCELLED: &str = "Execution of parent node was cancelled.";

pub struct TreeExecutor<'a> {
    tree: &'a ExecutionTree,
    snapshot: &'a NetworkSnapshot,
    initial: Arc<GeneratorTrajectories>,
}

impl<'a> TreeExecutor<'a> {
    pub fn new(tree: &'a ExecutionTree, snapshot: &'a NetworkSnapshot) -> Self {
        Self {
            tree,
            snapshot,
            initial: Arc::new(GeneratorTrajectories::initial(snapshot)),
        }
    }

    /// Start from known trajectories instead of the snapshot's initial state.
    pub fn with_trajectories(mut self, trajectories: GeneratorTrajectories) -> Self {
        self.initial = Arc::new(trajectories);
        self
    }

    /// Run the whole tree on the current rayon pool.
    pub fn run(&self) -> ExecutionReport {
        let start = Instant::now();
        let input = NodeData {
            trajectories: Some(Arc::clone(&self.initial)),
            ..NodeData::default()
        };
        let outcome = self.run_subtree(self.tree.root(), Ok(&input));
        let nodes: BTreeMap<String, NodeReport> = outcome
            .reports
            .into_iter()
            .map(|report| (report.id.to_string(), report))
            .collect();
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(tree = %self.tree.name, nodes = nodes.len(), elapsed_ms, "execution tree finished");
        ExecutionReport {
            tree: self.tree.name.clone(),
            elapsed_ms,
            nodes,
            critical_results: outcome.critical_results,
            warnings: outcome.warnings,
        }
    }

    fn blank_report(&self, id: NodeId, status: NodeStatus) -> NodeReport {
        let node = self.tree.node(id);
        NodeReport {
            id: node.key.clone(),
            name: node.name.clone(),
            node_type: node.node_type(),
            status,
            elapsed_ms: 0.0,
            display: node.display_report,
            configuration: self.tree.configuration(id),
            inputs: Map::new(),
            outputs: Map::new(),
            cause: None,
            plot: None,
            candidates: Vec::new(),
        }
    }

    fn cancelled_report(&self, id: NodeId, reason: &str) -> NodeReport {
        let mut report = self.blank_report(id, NodeStatus::Cancelled);
        report.cause = Some(reason.to_string());
        report
    }

    fn run_subtree(&self, id: NodeId, input: Result<&NodeData, &str>) -> SubtreeOutcome {
        let node = self.tree.node(id);
        let mut outcome = SubtreeOutcome::default();

        let (report, output, warning) = match input {
            Ok(data) => self.run_node(id, data),
            Err(reason) => (self.cancelled_report(id, reason), None, None),
        };
        let status = report.status;

        if node.node_type() == NodeType::CriticalClusterSelector {
            let selected = output.as_ref().and_then(|data| data.cluster_results.as_ref());
            outcome.critical_results.push(match (status, selected) {
                (NodeStatus::Completed, Some(results)) => CriticalResult::Selected {
                    node_id: node.key.clone(),
                    stability_state: results.stability_state,
                    swing_state: results.swing_state,
                    critical_cluster: results.critical_names.clone(),
                    critical_time: (results.stability_state == StabilityState::PotentiallyStable)
                        .then_some(results.critical_time),
                },
                (NodeStatus::Cancelled, _) => CriticalResult::Cancelled {
                    node_id: node.key.clone(),
                },
                _ => CriticalResult::Failed {
                    node_id: node.key.clone(),
                },
            });
        }
        outcome.warnings.extend(warning);
        outcome.reports.push(report);

        let child_input: Result<&NodeData, &str> = match (status, output.as_ref()) {
            (NodeStatus::Completed, Some(data)) => Ok(data),
            (NodeStatus::Cancelled, _) => Err(PARENT_CANCELLED),
            _ => Err(PARENT_FAILED),
        };
        let children: Vec<SubtreeOutcome> = node
            .children
            .par_iter()
            .map(|child| self.run_subtree(*child, child_input))
            .collect();
        for child in children {
            outcome.extend(child);
        }
        outcome
    }

    fn run_node(&self, id: NodeId, data: &NodeData) -> (NodeReport, Option<NodeData>, Option<String>) {
        let node = self.tree.node(id);
        let label = node.label();
        debug!(node = %label, node_type = %node.node_type(), "node running");

        let start = Instant::now();
        let mut run = NodeRun::default();
        let result = self.execute(id, data, &mut run);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut report = self.blank_report(id, NodeStatus::Running);
        report.elapsed_ms = elapsed_ms;
        report.inputs = run.inputs;
        report.candidates = run.candidates;
        let output = match result {
            Ok(Step::Done) => {
                info!(node = %label, elapsed_ms, "node completed");
                report.status = NodeStatus::Completed;
                report.outputs = run.outputs;
                report.plot = run.plot;
                Some(run.output)
            }
            Ok(Step::Cancelled(reason)) => {
                warn!(node = %label, %reason, "node cancelled");
                report.status = NodeStatus::Cancelled;
                report.cause = Some(reason);
                None
            }
            Err(err) => {
                warn!(node = %label, error = %err, "node failed");
                report.status = NodeStatus::Failed;
                report.cause = Some(err.to_string());
                None
            }
        };
        (report, output, run.warning)
    }

    fn execute(&self, id: NodeId, data: &NodeData, run: &mut NodeRun) -> EeacResult<Step> {
        match &self.tree.node(id).kind {
            NodeKind::Identifier(config) => self.identify(config, data, run),
            NodeKind::Evaluator { sequence } => self.evaluate(sequence, data, run),
            NodeKind::Selector(config) => self.select(config, data, run),
            NodeKind::GeneratorTrajectory(config) => self.generator_trajectories(config, data, run),
            NodeKind::Omib(config) => self.reduce(config, data, run),
            NodeKind::Eac(config) => self.equal_area(config, data, run),
            NodeKind::OmibTrajectory(config) => self.omib_trajectory(config, data, run),
        }
    }

    fn trajectories(&self, data: &NodeData) -> Arc<GeneratorTrajectories> {
        data.trajectories.clone().unwrap_or_else(|| Arc::clone(&self.initial))
    }

    fn identify(&self, config: &CciConfig, data: &NodeData, run: &mut NodeRun) -> EeacResult<Step> {
        let trajectories = self.trajectories(data);
        run.inputs
            .insert("trajectory_samples".into(), json!(trajectories.len()));

        let identification = cci::identify(self.snapshot, &trajectories, config)?;
        let candidates: Vec<Vec<String>> = identification
            .candidates
            .iter()
            .map(|candidate| candidate.critical.names(self.snapshot))
            .collect();
        run.outputs.insert("candidates".into(), json!(candidates));
        if let Some(max) = identification.max_angle_variation {
            run.outputs.insert("max_angle_variation_deg".into(), json!(max));
        }
        if !identification.variation_curves.is_empty() {
            run.plot = Some(serde_json::to_value(&identification.variation_curves)?);
        }
        run.output.clusters = Some(Arc::new(identification.candidates));
        Ok(Step::Done)
    }

    fn evaluate(&self, sequence: &[NodeId], data: &NodeData, run: &mut NodeRun) -> EeacResult<Step> {
        let clusters: &[CandidateClusters] = require(&data.clusters, IoType::Clusters)?;
        run.inputs.insert("candidates".into(), json!(clusters.len()));

        let evaluations: Vec<(CandidateReport, Option<ClusterResults>)> = clusters
            .par_iter()
            .enumerate()
            .map(|(index, candidate)| self.evaluate_candidate(index, candidate, sequence))
            .collect();

        let mut results = Vec::new();
        let mut failed = Vec::new();
        for (report, result) in evaluations {
            match result {
                Some(result) => results.push(result),
                None => failed.push(report.index),
            }
            run.candidates.push(report);
        }
        if !failed.is_empty() {
            run.warning = Some(format!(
                "{} failed candidates: {}",
                failed.len(),
                failed.iter().join(", ")
            ));
            run.outputs.insert("failed_candidates".into(), json!(failed));
        }
        if results.is_empty() {
            return Err(EeacError::CandidateExhaustion(if clusters.is_empty() {
                "no critical cluster candidate to evaluate".into()
            } else {
                "every critical cluster candidate failed".into()
            }));
        }

        run.outputs.insert(
            "results".into(),
            Value::Array(results.iter().map(results_summary).collect()),
        );
        run.output.cluster_results_list = Some(Arc::new(results));
        Ok(Step::Done)
    }

    /// Run an evaluation sequence on one candidate.
    fn evaluate_candidate(
        &self,
        index: usize,
        candidate: &CandidateClusters,
        sequence: &[NodeId],
    ) -> (CandidateReport, Option<ClusterResults>) {
        let mut data = NodeData {
            critical: Some(candidate.critical.clone()),
            non_critical: Some(candidate.non_critical.clone()),
            ..NodeData::default()
        };
        let mut nodes = Vec::with_capacity(sequence.len());
        let mut cause = None;
        for step in sequence {
            if cause.is_some() {
                nodes.push(self.cancelled_report(*step, PARENT_FAILED));
                continue;
            }
            let (report, output, _) = self.run_node(*step, &data);
            match output {
                Some(output) if report.status == NodeStatus::Completed => data = output,
                _ => {
                    cause = Some(
                        report
                            .cause
                            .clone()
                            .unwrap_or_else(|| format!("node {} did not complete", report.id)),
                    )
                }
            }
            nodes.push(report);
        }

        let result = match data.cluster_results {
            Some(results) if cause.is_none() => Some(results.as_ref().clone()),
            None if cause.is_none() => {
                cause = Some("evaluation sequence produced no cluster results".into());
                None
            }
            _ => None,
        };
        if let Some(cause) = &cause {
            warn!(candidate = index, %cause, "critical cluster candidate failed");
        }
        let report = CandidateReport {
            index,
            critical_cluster: candidate.critical.names(self.snapshot),
            status: if result.is_some() {
                NodeStatus::Completed
            } else {
                NodeStatus::Failed
            },
            cause,
            nodes,
        };
        (report, result)
    }

    fn select(&self, config: &CcsConfig, data: &NodeData, run: &mut NodeRun) -> EeacResult<Step> {
        let results = require(&data.cluster_results_list, IoType::ClusterResultsIterator)?;
        run.inputs.insert(
            "results".into(),
            Value::Array(results.iter().map(results_summary).collect()),
        );
        let (index, selected) = ccs::select(results, config.selector_type)
            .ok_or_else(|| EeacError::CandidateExhaustion("no cluster results to select from".into()))?;
        run.outputs.insert("selected_index".into(), json!(index));
        run.outputs.insert("selected".into(), results_summary(selected));
        run.output.cluster_results = Some(Arc::new(selected.clone()));
        Ok(Step::Done)
    }

    fn generator_trajectories(&self, config: &GtcConfig, data: &NodeData, run: &mut NodeRun) -> EeacResult<Step> {
        let results = require(&data.cluster_results, IoType::ClusterResults)?;
        run.inputs.insert("selected".into(), results_summary(results));
        if results.stability_state != StabilityState::PotentiallyStable {
            return Ok(Step::Cancelled(format!(
                "generator trajectories need a potentially stable cluster, got {:?}",
                results.stability_state
            )));
        }

        let trajectories = gtc::update_trajectories(
            self.snapshot,
            results.critical_time,
            results.maximum_time,
            config,
        )?;
        let times: Vec<f64> = trajectories
            .observation_times()
            .iter()
            .map(|t| t * 1000.0)
            .collect();
        run.outputs.insert("observation_times_ms".into(), json!(times));
        let curves = gtc::angle_curves(self.snapshot, &trajectories, &config.generators_to_plot);
        if !curves.is_empty() {
            run.plot = Some(serde_json::to_value(&curves)?);
        }

        run.output = NodeData {
            trajectories: Some(Arc::new(trajectories)),
            critical: Some(results.critical_cluster.clone()),
            non_critical: Some(results.non_critical_cluster.clone()),
            ..NodeData::default()
        };
        Ok(Step::Done)
    }

    fn reduce(&self, config: &OmibConfig, data: &NodeData, run: &mut NodeRun) -> EeacResult<Step> {
        let critical = require(&data.critical, IoType::CritCluster)?;
        let non_critical = require(&data.non_critical, IoType::NonCritCluster)?;
        let trajectories = self.trajectories(data);
        run.inputs
            .insert("critical_cluster".into(), json!(critical.names(self.snapshot)));
        run.inputs
            .insert("trajectory_samples".into(), json!(trajectories.len()));

        let omib = OmibModel::build(self.snapshot, &trajectories, critical, non_critical, config.omib_type)?;
        run.outputs.insert("omib_type".into(), json!(omib.omib_type));
        run.outputs.insert("inertia".into(), json!(omib.inertia));
        run.outputs
            .insert("mechanical_power".into(), json!(omib.mechanical_power));
        run.outputs
            .insert("initial_angle_deg".into(), json!(omib.initial_angle.to_degrees()));
        run.outputs.insert("swing_state".into(), json!(omib.swing_state));
        run.outputs
            .insert("update_angles".into(), json!(omib.update_angles().len()));
        run.output.omib = Some(Arc::new(omib));
        Ok(Step::Done)
    }

    fn equal_area(&self, config: &EacConfig, data: &NodeData, run: &mut NodeRun) -> EeacResult<Step> {
        let omib = require(&data.omib, IoType::Omib)?;
        run.inputs.insert("critical_cluster".into(), json!(omib.critical_names));

        let result = eac::solve(omib, config)?;
        run.outputs
            .insert("stability_state".into(), json!(result.stability_state));
        run.outputs.insert(
            "critical_angle_deg".into(),
            json!(result.critical_angle.to_degrees().value()),
        );
        run.outputs.insert(
            "maximum_angle_deg".into(),
            json!(result.maximum_angle.to_degrees().value()),
        );
        if let Some(plot) = &result.area_plot {
            run.plot = Some(serde_json::to_value(plot)?);
        }
        run.output = NodeData {
            omib: Some(Arc::clone(omib)),
            eac: Some(Arc::new(result)),
            ..NodeData::default()
        };
        Ok(Step::Done)
    }

    fn omib_trajectory(&self, config: &OtcConfig, data: &NodeData, run: &mut NodeRun) -> EeacResult<Step> {
        let omib = require(&data.omib, IoType::Omib)?;
        let eac = require(&data.eac, IoType::CritAngle)?;
        run.inputs.insert(
            "critical_angle_deg".into(),
            json!(eac.critical_angle.to_degrees().value()),
        );
        run.inputs.insert(
            "maximum_angle_deg".into(),
            json!(eac.maximum_angle.to_degrees().value()),
        );

        let results = otc::compute(omib, eac, config)?;
        let summary = results_summary(&results);
        if let Value::Object(map) = summary {
            run.outputs.extend(map);
        }
        if !results.trajectory.is_empty() {
            run.plot = Some(serde_json::to_value(&results.trajectory)?);
        }
        run.output.cluster_results = Some(Arc::new(results));
        Ok(Step::Done)
    }
}

/// Run a validated tree on one network snapshot.
pub fn execute(tree: &ExecutionTree, snapshot: &NetworkSnapshot) -> ExecutionReport {
    TreeExecutor::new(tree, snapshot).run()
}
