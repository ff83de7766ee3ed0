//! Generator clusters and their aggregate quantities.

use serde::{Deserialize, Serialize};

use crate::network::NetworkSnapshot;
use crate::GeneratorId;

/// Ordered set of generators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratorCluster {
    members: Vec<GeneratorId>,
}

impl GeneratorCluster {
    pub fn new(members: impl IntoIterator<Item = GeneratorId>) -> Self {
        let mut members: Vec<GeneratorId> = members.into_iter().collect();
        members.sort_unstable();
        members.dedup();
        Self { members }
    }

    /// Every generator of the snapshot not in `self`.
    pub fn complement(&self, snapshot: &NetworkSnapshot) -> Self {
        Self::new(snapshot.generator_ids().filter(|id| !self.contains(*id)))
    }

    #[inline]
    pub fn members(&self) -> &[GeneratorId] {
        &self.members
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: GeneratorId) -> bool {
        self.members.binary_search(&id).is_ok()
    }

    /// Sorted generator names.
    pub fn names(&self, snapshot: &NetworkSnapshot) -> Vec<String> {
        let mut names: Vec<String> = self
            .members
            .iter()
            .map(|id| snapshot.generator(*id).name.clone())
            .collect();
        names.sort();
        names
    }

    /// Σ M_i = Σ 2H_i
    pub fn total_inertia(&self, snapshot: &NetworkSnapshot) -> f64 {
        self.members
            .iter()
            .map(|id| snapshot.generator(*id).inertia_coefficient())
            .sum()
    }

    /// Σ P_i (pu)
    pub fn total_active_power(&self, snapshot: &NetworkSnapshot) -> f64 {
        self.members
            .iter()
            .map(|id| snapshot.generator(*id).active_power)
            .sum()
    }

    /// Partial center of angle ΣM_iδ_i / ΣM_i for the given rotor angles.
    ///
    /// A cluster without inertia has no defined center; 0 is returned.
    pub fn center_of_angle(&self, snapshot: &NetworkSnapshot, angles: &[f64]) -> f64 {
        let total = self.total_inertia(snapshot);
        if total == 0.0 {
            return 0.0;
        }
        let weighted: f64 = self
            .members
            .iter()
            .map(|id| snapshot.generator(*id).inertia_coefficient() * angles[id.value()])
            .sum();
        weighted / total
    }
}
