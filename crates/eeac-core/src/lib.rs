//! # eeac-core: Transient Stability Data Model
//!
//! Data structures shared by the Extended Equal Area Criterion (EEAC) engine.
//!
//! ## Design Philosophy
//!
//! A fault case is analysed from an immutable [`NetworkSnapshot`]:
//! - **Generators**: inertia, internal EMF, pre-fault rotor angle, power output
//! - **Regimes**: admittance matrices reduced onto the generator internal
//!   nodes for the pre-fault, during-fault and post-fault networks
//!
//! Everything the algorithms derive from it (clusters, trajectories, OMIB
//! models) refers to generators through [`GeneratorId`], the generator's
//! position in the snapshot.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eeac_core::*;
//!
//! let snapshot = NetworkSnapshot::from_path("fault_case.json")?;
//! let critical = GeneratorCluster::new(snapshot.generator_id("G1"));
//! let non_critical = critical.complement(&snapshot);
//! let trajectories = GeneratorTrajectories::initial(&snapshot);
//! println!(
//!     "{} critical / {} non-critical, {} sample(s)",
//!     critical.len(),
//!     non_critical.len(),
//!     trajectories.len()
//! );
//! # Ok::<(), EeacError>(())
//! ```
//!
//! ## Modules
//!
//! - [`network`]: snapshot, generators, regime admittances
//! - [`reduction`]: bus-level case to snapshot (Kron reduction)
//! - [`trajectory`]: per-generator angle/speed samples
//! - [`cluster`]: generator clusters and partial centers of angle
//! - [`units`]: degree/millisecond/power conversions
//! - [`error`]: error taxonomy

pub mod cluster;
pub mod error;
pub mod network;
pub mod reduction;
pub mod trajectory;
pub mod units;

pub use cluster::GeneratorCluster;
pub use error::{EeacError, EeacResult};
pub use network::{
    AdmittanceMatrix, FaultDistances, Generator, GeneratorSource, IslandSummary, NetworkRegime,
    NetworkSnapshot, RegimeAdmittances,
};
pub use reduction::BusCase;
pub use trajectory::{GeneratorTrajectories, TrajectorySample};

use serde::{Deserialize, Serialize};

/// Position of a generator in its [`NetworkSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratorId(usize);

impl GeneratorId {
    #[inline]
    pub fn new(value: usize) -> Self {
        GeneratorId(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Absolute-tolerance comparison used for angles and times.
#[inline]
pub fn is_close(a: f64, b: f64, abs_tol: f64) -> bool {
    a == b || (a - b).abs() <= abs_tol.max(1e-9 * a.abs().max(b.abs()))
}
