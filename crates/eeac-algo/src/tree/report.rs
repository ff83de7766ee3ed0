//! Execution reports, written once per node by the executor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::model::{NodeKey, NodeType};
use crate::omib::{StabilityState, SwingState};

/// Node lifecycle: CONFIGURED → RUNNING → COMPLETED | FAILED | CANCELLED.
///
/// Only the node whose own execution errored is `Failed`. Every node below
/// it is `Cancelled`, with the parent failure or cancellation as its cause,
/// so a report tells the origin of a failure apart from its consequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Configured,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub id: NodeKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub node_type: NodeType,
    pub status: NodeStatus,
    pub elapsed_ms: f64,
    pub display: bool,
    pub configuration: Map<String, Value>,
    pub inputs: Map<String, Value>,
    pub outputs: Map<String, Value>,
    /// Failure or cancellation cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Points for an external renderer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<Value>,
    /// Evaluator nodes only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateReport>,
}

/// One evaluation sequence run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub index: usize,
    pub critical_cluster: Vec<String>,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub nodes: Vec<NodeReport>,
}

/// Verdict of a selector node, as reported in the run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum CriticalResult {
    Selected {
        node_id: NodeKey,
        stability_state: StabilityState,
        swing_state: SwingState,
        critical_cluster: Vec<String>,
        /// s; present for potentially stable results only
        #[serde(default, skip_serializing_if = "Option::is_none")]
        critical_time: Option<f64>,
    },
    #[serde(rename = "failed")]
    Failed { node_id: NodeKey },
    #[serde(rename = "cancelled")]
    Cancelled { node_id: NodeKey },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub tree: String,
    pub elapsed_ms: f64,
    pub nodes: BTreeMap<String, NodeReport>,
    /// Selector verdicts in depth-first order
    pub critical_results: Vec<CriticalResult>,
    /// Failed candidate warnings in depth-first order
    pub warnings: Vec<String>,
}

impl ExecutionReport {
    /// Verdict of the last selector in depth-first order.
    pub fn critical_result(&self) -> Option<&CriticalResult> {
        self.critical_results.last()
    }

    pub fn node(&self, id: &NodeKey) -> Option<&NodeReport> {
        self.nodes.get(&id.to_string())
    }

    /// Human-readable rendering of the reports flagged for display.
    pub fn render_displayed(&self) -> String {
        let mut text = String::new();
        for report in self.nodes.values().filter(|r| r.display || r.status == NodeStatus::Failed) {
            let label = match &report.name {
                Some(name) => format!("{}_{}", report.id, name),
                None => report.id.to_string(),
            };
            text.push_str(&format!("Report for node {label} ({}):\n", report.node_type));
            text.push_str(&format!("\tStatus: {:?}\n", report.status));
            if let Some(cause) = &report.cause {
                text.push_str(&format!("\tCause: {cause}\n"));
            }
            text.push_str(&format!("\tExecution time: {:.3} ms\n", report.elapsed_ms));
            for (key, value) in &report.outputs {
                text.push_str(&format!("\t{key}: {value}\n"));
            }
        }
        text
    }
}
