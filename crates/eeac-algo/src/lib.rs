//! # eeac-algo: Extended Equal Area Criterion
//!
//! Transient stability screening of a fault: the multi-machine system is
//! split into a critical and a non-critical cluster, reduced to a One
//! Machine Infinite Bus (OMIB) equivalent, and the equal area criterion
//! gives its critical clearing angle and time.
//!
//! ## Building blocks
//!
//! | Module | Role |
//! |--------|------|
//! | [`cci`] | Critical cluster candidates (ACC, COMP, TRAJ, CONS, DFT) |
//! | [`omib`] | OMIB reduction (ZOOMIB, COOMIB, DOMIB and revised variants) |
//! | [`eac`] | Critical and maximum angles from the equal area criterion |
//! | [`otc`] | OMIB trajectory and critical time (Taylor series or RK4) |
//! | [`gtc`] | Per-generator Taylor trajectories around the critical time |
//! | [`ccs`] | Selection among evaluated candidates |
//!
//! The blocks are chained by an execution [`tree`] read from JSON, and
//! [`batch`] runs one tree against many fault cases.
//!
//! ## Example
//!
//! ```ignore
//! use eeac_algo::tree::{execute, ExecutionTree};
//! use eeac_core::NetworkSnapshot;
//!
//! let tree = ExecutionTree::from_path("tree.json")?;
//! let snapshot = NetworkSnapshot::from_path("fault.json")?;
//! let report = execute(&tree, &snapshot);
//! println!("{:?}", report.critical_result());
//! ```

pub mod batch;
pub mod cci;
pub mod ccs;
pub mod eac;
pub mod gtc;
pub mod omib;
pub mod otc;
pub mod tree;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use batch::{run_fault_cases, FaultCase, RunConfig};
pub use cci::{CandidateClusters, CciConfig, IdentifierType};
pub use eac::{EacConfig, EacResult};
pub use omib::{OmibModel, OmibType, StabilityState, SwingState};
pub use otc::{ClusterResults, OtcConfig};
pub use tree::{execute, ExecutionReport, ExecutionTree};
