//! Execution trees.
//!
//! A tree document names the algorithm of every node and its configuration.
//! Loading a document checks the whole structure up front (input/output
//! compatibility of every link, leaf types, evaluation sequences) and reports
//! every issue at once. Execution then walks the tree depth first:
//!
//! ```text
//! CCI ─▶ CCE [OMIB ─▶ EAC ─▶ OTC] per candidate ─▶ CCS ─▶ GTC ─▶ OMIB ─▶ EAC ─▶ OTC
//! ```

mod executor;
mod model;
mod report;
mod validation;

pub use executor::{execute, NodeData, TreeExecutor};
pub use model::{ExecutionTree, NodeDocument, NodeId, NodeKey, NodeKind, NodeType, TreeDocument, TreeNode};
pub use report::{CandidateReport, CriticalResult, ExecutionReport, NodeReport, NodeStatus};
pub use validation::{IoType, GLOBAL_INPUTS};
