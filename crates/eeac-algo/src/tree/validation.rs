//! Structural checks run before any numeric work.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::model::{ExecutionTree, NodeId, NodeKind, NodeType};

/// Kind of data flowing between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IoType {
    Network,
    DynamicGenerators,
    Clusters,
    ClusterResultsIterator,
    ClusterResults,
    CritCluster,
    NonCritCluster,
    Omib,
    CritAngle,
    MaxAngle,
}

/// Inputs available to the root node.
pub const GLOBAL_INPUTS: [IoType; 2] = [IoType::Network, IoType::DynamicGenerators];

impl NodeType {
    pub fn inputs(self) -> &'static [IoType] {
        use IoType::*;
        match self {
            NodeType::CriticalClustersIdentifier => &[Network, DynamicGenerators],
            NodeType::CriticalClustersEvaluator => &[Network, Clusters],
            NodeType::CriticalClusterSelector => &[ClusterResultsIterator],
            NodeType::GeneratorTrajectoryCalculator => &[Network, ClusterResults],
            NodeType::Omib => &[Network, CritCluster, NonCritCluster],
            NodeType::Eac => &[Omib],
            NodeType::OmibTrajectoryCalculator => &[CritAngle, MaxAngle, Omib],
        }
    }

    pub fn outputs(self) -> &'static [IoType] {
        use IoType::*;
        match self {
            NodeType::CriticalClustersIdentifier => &[Clusters],
            NodeType::CriticalClustersEvaluator => &[ClusterResultsIterator],
            NodeType::CriticalClusterSelector => &[ClusterResults],
            NodeType::GeneratorTrajectoryCalculator => &[CritCluster, NonCritCluster, DynamicGenerators],
            NodeType::Omib => &[Omib],
            NodeType::Eac => &[Omib, CritAngle, MaxAngle],
            NodeType::OmibTrajectoryCalculator => &[ClusterResults],
        }
    }

    /// Only selectors and OMIB trajectory calculators end a branch.
    pub fn can_be_leaf(self) -> bool {
        matches!(
            self,
            NodeType::CriticalClusterSelector | NodeType::OmibTrajectoryCalculator
        )
    }
}

/// Inputs of `consumer` not covered by `available` (NETWORK is always there).
fn missing_inputs(consumer: NodeType, available: &[IoType]) -> Vec<IoType> {
    consumer
        .inputs()
        .iter()
        .copied()
        .filter(|input| *input != IoType::Network && !available.contains(input))
        .collect()
}

struct Checker<'a> {
    tree: &'a ExecutionTree,
    issues: Vec<String>,
}

impl Checker<'_> {
    fn label(&self, id: NodeId) -> String {
        self.tree.node(id).label()
    }

    fn check_link(&mut self, parent: Option<NodeId>, available: &[IoType], child: NodeId) {
        let child_type = self.tree.node(child).node_type();
        let missing = missing_inputs(child_type, available);
        if !missing.is_empty() {
            let source = parent.map_or_else(|| "global inputs".to_string(), |p| format!("node {}", self.label(p)));
            self.issues.push(format!(
                "node {} ({child_type}) needs {missing:?}, not provided by {source}",
                self.label(child)
            ));
        }
        if let NodeKind::Omib(config) = &self.tree.node(child).kind {
            if config.omib_type.is_dynamic() && !available.contains(&IoType::DynamicGenerators) {
                self.issues.push(format!(
                    "node {}: {} needs generator trajectories from a parent GeneratorTrajectoryCalculator",
                    self.label(child),
                    config.omib_type
                ));
            }
        }
    }

    fn check_node(&mut self, id: NodeId) {
        let node = self.tree.node(id);
        if node.children.is_empty() && !node.node_type().can_be_leaf() {
            self.issues
                .push(format!("node {} ({}) cannot be a leaf", self.label(id), node.node_type()));
        }
        match &node.kind {
            NodeKind::Identifier(config) => {
                for issue in config.issues() {
                    self.issues.push(format!("node {}: {issue}", self.label(id)));
                }
            }
            NodeKind::Evaluator { sequence } => self.check_sequence(id, sequence),
            _ => {}
        }
        let outputs = node.node_type().outputs();
        for child in &node.children {
            self.check_link(Some(id), outputs, *child);
            self.check_node(*child);
        }
    }

    fn check_sequence(&mut self, evaluator: NodeId, sequence: &[NodeId]) {
        let (Some(first), Some(last)) = (sequence.first(), sequence.last()) else {
            self.issues.push(format!(
                "node {}: evaluation sequence is empty",
                self.label(evaluator)
            ));
            return;
        };
        self.check_link(Some(evaluator), &[IoType::CritCluster, IoType::NonCritCluster], *first);
        for pair in sequence.windows(2) {
            let outputs = self.tree.node(pair[0]).node_type().outputs();
            self.check_link(Some(pair[0]), outputs, pair[1]);
        }
        if !self
            .tree
            .node(*last)
            .node_type()
            .outputs()
            .contains(&IoType::ClusterResults)
        {
            self.issues.push(format!(
                "node {}: evaluation sequence must end with a node producing cluster results",
                self.label(evaluator)
            ));
        }
        for step in sequence {
            if let NodeKind::Identifier(config) = &self.tree.node(*step).kind {
                for issue in config.issues() {
                    self.issues.push(format!("node {}: {issue}", self.label(*step)));
                }
            }
        }
    }
}

/// Every structural issue of a tree.
pub(crate) fn issues(tree: &ExecutionTree) -> Vec<String> {
    let mut checker = Checker {
        tree,
        issues: Vec::new(),
    };

    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for (_, node) in tree.nodes() {
        *seen.entry(node.key.to_string()).or_default() += 1;
    }
    let duplicates: BTreeSet<&String> = seen.iter().filter(|(_, count)| **count > 1).map(|(key, _)| key).collect();
    for key in duplicates {
        checker.issues.push(format!("duplicate node id {key}"));
    }

    checker.check_link(None, &GLOBAL_INPUTS, tree.root());
    checker.check_node(tree.root());
    checker.issues
}
