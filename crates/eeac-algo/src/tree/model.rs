//! Tree documents (JSON) and their arena form.

use std::fmt;
use std::fs;
use std::path::Path;

use eeac_core::{EeacError, EeacResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cci::CciConfig;
use crate::ccs::CcsConfig;
use crate::eac::EacConfig;
use crate::gtc::GtcConfig;
use crate::omib::OmibConfig;
use crate::otc::OtcConfig;

/// Node identifier as written in the tree document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeKey {
    Number(i64),
    Text(String),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Number(n) => write!(f, "{n}"),
            NodeKey::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    CriticalClustersIdentifier,
    CriticalClustersEvaluator,
    CriticalClusterSelector,
    GeneratorTrajectoryCalculator,
    #[serde(rename = "OMIB")]
    Omib,
    #[serde(rename = "EAC")]
    Eac,
    #[serde(rename = "OMIBTrajectoryCalculator")]
    OmibTrajectoryCalculator,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::CriticalClustersIdentifier => "CriticalClustersIdentifier",
            NodeType::CriticalClustersEvaluator => "CriticalClustersEvaluator",
            NodeType::CriticalClusterSelector => "CriticalClusterSelector",
            NodeType::GeneratorTrajectoryCalculator => "GeneratorTrajectoryCalculator",
            NodeType::Omib => "OMIB",
            NodeType::Eac => "EAC",
            NodeType::OmibTrajectoryCalculator => "OMIBTrajectoryCalculator",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level tree document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    pub name: String,
    pub root: NodeDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: NodeKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub configuration: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EvaluatorConfiguration {
    evaluation_sequence: EvaluationSequence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EvaluationSequence {
    nodes: Vec<NodeDocument>,
}

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Typed node payload, one variant per node type.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Identifier(CciConfig),
    /// Linear chain run once per candidate cluster
    Evaluator { sequence: Vec<NodeId> },
    Selector(CcsConfig),
    GeneratorTrajectory(GtcConfig),
    Omib(OmibConfig),
    Eac(EacConfig),
    OmibTrajectory(OtcConfig),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Identifier(_) => NodeType::CriticalClustersIdentifier,
            NodeKind::Evaluator { .. } => NodeType::CriticalClustersEvaluator,
            NodeKind::Selector(_) => NodeType::CriticalClusterSelector,
            NodeKind::GeneratorTrajectory(_) => NodeType::GeneratorTrajectoryCalculator,
            NodeKind::Omib(_) => NodeType::Omib,
            NodeKind::Eac(_) => NodeType::Eac,
            NodeKind::OmibTrajectory(_) => NodeType::OmibTrajectoryCalculator,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub key: NodeKey,
    pub name: Option<String>,
    pub kind: NodeKind,
    pub display_report: bool,
    /// Belongs to an evaluation sequence rather than to the tree itself
    pub in_sequence: bool,
    pub children: Vec<NodeId>,
}

impl TreeNode {
    #[inline]
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// `<id>_<name>`, or the id alone for unnamed nodes.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{}_{}", self.key, name),
            None => self.key.to_string(),
        }
    }
}

enum ParsedKind {
    Ready(NodeKind),
    Evaluator(Vec<NodeDocument>),
}

fn typed<T: DeserializeOwned>(doc: &NodeDocument, configuration: Map<String, Value>) -> Result<T, String> {
    serde_json::from_value(Value::Object(configuration))
        .map_err(|e| format!("node {}: invalid {} configuration: {e}", doc.id, doc.node_type))
}

fn config_map<T: Serialize>(config: &T) -> Map<String, Value> {
    match serde_json::to_value(config) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Execution tree held as an arena; the root is the first node.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionTree {
    pub name: String,
    nodes: Vec<TreeNode>,
}

impl ExecutionTree {
    /// Build and validate a tree, collecting every issue found.
    pub fn from_document(document: &TreeDocument) -> EeacResult<Self> {
        let mut tree = Self {
            name: document.name.clone(),
            nodes: Vec::new(),
        };
        let mut issues = Vec::new();
        tree.insert(&document.root, false, &mut issues);
        if tree.nodes.is_empty() {
            return Err(EeacError::Validation(issues));
        }
        issues.extend(super::validation::issues(&tree));
        if issues.is_empty() {
            Ok(tree)
        } else {
            Err(EeacError::Validation(issues))
        }
    }

    pub fn from_json_str(json: &str) -> EeacResult<Self> {
        let document: TreeDocument = serde_json::from_str(json).map_err(|e| match e.classify() {
            serde_json::error::Category::Data => EeacError::Config(format!("tree document: {e}")),
            _ => EeacError::Parse(format!("tree document: {e}")),
        })?;
        Self::from_document(&document)
    }

    pub fn from_path(path: impl AsRef<Path>) -> EeacResult<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    fn insert(&mut self, doc: &NodeDocument, in_sequence: bool, issues: &mut Vec<String>) -> Option<NodeId> {
        let mut configuration = doc.configuration.clone();
        let display_report = match configuration.remove("display_report") {
            None => false,
            Some(Value::Bool(flag)) => flag,
            Some(other) => {
                issues.push(format!("node {}: display_report must be a boolean, got {other}", doc.id));
                false
            }
        };

        let parsed = match doc.node_type {
            NodeType::CriticalClustersIdentifier => typed(doc, configuration).map(|c| ParsedKind::Ready(NodeKind::Identifier(c))),
            NodeType::CriticalClustersEvaluator => typed::<EvaluatorConfiguration>(doc, configuration)
                .map(|c| ParsedKind::Evaluator(c.evaluation_sequence.nodes)),
            NodeType::CriticalClusterSelector => typed(doc, configuration).map(|c| ParsedKind::Ready(NodeKind::Selector(c))),
            NodeType::GeneratorTrajectoryCalculator => {
                typed(doc, configuration).map(|c| ParsedKind::Ready(NodeKind::GeneratorTrajectory(c)))
            }
            NodeType::Omib => typed(doc, configuration).map(|c| ParsedKind::Ready(NodeKind::Omib(c))),
            NodeType::Eac => typed(doc, configuration).map(|c| ParsedKind::Ready(NodeKind::Eac(c))),
            NodeType::OmibTrajectoryCalculator => {
                typed(doc, configuration).map(|c| ParsedKind::Ready(NodeKind::OmibTrajectory(c)))
            }
        };
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(issue) => {
                issues.push(issue);
                return None;
            }
        };

        let id = NodeId(self.nodes.len());
        let (kind, sequence) = match parsed {
            ParsedKind::Ready(kind) => (kind, None),
            ParsedKind::Evaluator(sequence) => (NodeKind::Evaluator { sequence: Vec::new() }, Some(sequence)),
        };
        self.nodes.push(TreeNode {
            key: doc.id.clone(),
            name: doc.name.clone(),
            kind,
            display_report,
            in_sequence,
            children: Vec::new(),
        });

        if let Some(sequence) = sequence {
            let ids: Vec<NodeId> = sequence
                .iter()
                .filter_map(|step| self.insert(step, true, issues))
                .collect();
            self.nodes[id.0].kind = NodeKind::Evaluator { sequence: ids };
        }

        if in_sequence && !doc.children.is_empty() {
            issues.push(format!(
                "node {}: evaluation sequence nodes cannot have children",
                doc.id
            ));
            return Some(id);
        }
        for child in &doc.children {
            if let Some(child_id) = self.insert(child, false, issues) {
                self.nodes[id.0].children.push(child_id);
            }
        }
        Some(id)
    }

    /// Document form, with every configuration default made explicit.
    pub fn to_document(&self) -> TreeDocument {
        TreeDocument {
            name: self.name.clone(),
            root: self.node_document(self.root()),
        }
    }

    fn node_document(&self, id: NodeId) -> NodeDocument {
        let node = self.node(id);
        NodeDocument {
            id: node.key.clone(),
            name: node.name.clone(),
            node_type: node.node_type(),
            configuration: self.configuration(id),
            children: node.children.iter().map(|child| self.node_document(*child)).collect(),
        }
    }

    /// Configuration of a node as JSON key/value pairs.
    pub fn configuration(&self, id: NodeId) -> Map<String, Value> {
        let node = self.node(id);
        let mut map = match &node.kind {
            NodeKind::Identifier(config) => config_map(config),
            NodeKind::Evaluator { sequence } => {
                let nodes: Vec<NodeDocument> = sequence.iter().map(|step| self.node_document(*step)).collect();
                config_map(&EvaluatorConfiguration {
                    evaluation_sequence: EvaluationSequence { nodes },
                })
            }
            NodeKind::Selector(config) => config_map(config),
            NodeKind::GeneratorTrajectory(config) => config_map(config),
            NodeKind::Omib(config) => config_map(config),
            NodeKind::Eac(config) => config_map(config),
            NodeKind::OmibTrajectory(config) => config_map(config),
        };
        if node.display_report {
            map.insert("display_report".into(), Value::Bool(true));
        }
        map
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    /// Every node, evaluation sequence steps included.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &TreeNode)> + '_ {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Tree nodes in depth-first pre-order (evaluation sequences excluded).
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.node(id).children.iter().rev());
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests_support::REFERENCE_TREE;

    #[test]
    fn test_parses_reference_tree() {
        let tree = ExecutionTree::from_json_str(REFERENCE_TREE).unwrap();
        assert_eq!(tree.name, "reference");
        let order: Vec<String> = tree
            .depth_first()
            .iter()
            .map(|id| tree.node(*id).key.to_string())
            .collect();
        assert_eq!(order, vec!["0", "1", "2", "3", "4", "5", "6"]);
        let NodeKind::Evaluator { sequence } = &tree.node(NodeId(1)).kind else {
            panic!("node 1 is an evaluator");
        };
        assert_eq!(sequence.len(), 3);
        assert!(sequence.iter().all(|id| tree.node(*id).in_sequence));
        assert_eq!(tree.node(tree.root()).label(), "0_identifier");
        assert!(tree.node(tree.root()).display_report);
    }

    #[test]
    fn test_document_round_trip() {
        let tree = ExecutionTree::from_json_str(REFERENCE_TREE).unwrap();
        let json = serde_json::to_string(&tree.to_document()).unwrap();
        let reparsed = ExecutionTree::from_json_str(&json).unwrap();
        assert_eq!(tree, reparsed);
    }

    #[test]
    fn test_configuration_errors_are_collected() {
        let json = r#"{
            "name": "broken",
            "root": {
                "id": 0,
                "type": "CriticalClustersIdentifier",
                "configuration": {"identifier_type": "ACC", "thresold": 0.4},
                "children": []
            }
        }"#;
        let Err(EeacError::Validation(issues)) = ExecutionTree::from_json_str(json) else {
            panic!("expected validation error");
        };
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("thresold"));
    }

    #[test]
    fn test_unknown_node_type_is_config_error() {
        let json = r#"{"name": "t", "root": {"id": 0, "type": "Magic", "configuration": {}}}"#;
        assert!(matches!(ExecutionTree::from_json_str(json), Err(EeacError::Config(_))));
        assert!(matches!(ExecutionTree::from_json_str("{"), Err(EeacError::Parse(_))));
    }

    #[test]
    fn test_text_ids() {
        assert_eq!(NodeKey::Text("cci".into()).to_string(), "cci");
        let key: NodeKey = serde_json::from_str("7").unwrap();
        assert_eq!(key, NodeKey::Number(7));
    }
}
