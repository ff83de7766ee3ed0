use std::collections::BTreeSet;

use eeac_core::{GeneratorCluster, GeneratorId, NetworkSnapshot};
use itertools::Itertools;

use super::CandidateClusters;

/// Build the ordered candidate list from ranked machines (most critical last).
///
/// By default candidates are the suffixes of the ranking, smallest first.
/// With `try_all` every non-empty combination is tried, the largest sets
/// first. Candidates below `min_power` (pu) or leaving no non-critical
/// machine are skipped; `max` > 0 caps the list.
pub fn enumerate_candidates(
    snapshot: &NetworkSnapshot,
    machines: &[GeneratorId],
    try_all: bool,
    max: usize,
    min_power: Option<f64>,
) -> Vec<CandidateClusters> {
    let mut sets: Vec<Vec<GeneratorId>> = if try_all {
        (1..=machines.len())
            .flat_map(|size| machines.iter().copied().combinations(size))
            .collect()
    } else {
        (0..machines.len()).map(|start| machines[start..].to_vec()).collect()
    };
    sets.reverse();

    let mut candidates = Vec::new();
    for set in sets {
        if max > 0 && candidates.len() >= max {
            break;
        }
        let critical = GeneratorCluster::new(set);
        if let Some(min_power) = min_power {
            if critical.total_active_power(snapshot).abs() < min_power {
                continue;
            }
        }
        let non_critical = critical.complement(snapshot);
        if non_critical.is_empty() {
            continue;
        }
        candidates.push(CandidateClusters { critical, non_critical });
    }
    candidates
}

/// Concatenate two candidate lists, dropping repeated critical sets, then
/// order by cluster size (stable) and cap at `max` when positive.
pub(super) fn merge_unique(
    first: Vec<CandidateClusters>,
    second: Vec<CandidateClusters>,
    max: usize,
) -> Vec<CandidateClusters> {
    let mut seen = BTreeSet::new();
    let mut merged: Vec<CandidateClusters> = first
        .into_iter()
        .chain(second)
        .filter(|candidate| seen.insert(candidate.critical.members().to_vec()))
        .collect();
    merged.sort_by_key(|candidate| candidate.critical.len());
    if max > 0 {
        merged.truncate(max);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::four_machine_snapshot;

    fn ids(values: &[usize]) -> Vec<GeneratorId> {
        values.iter().copied().map(GeneratorId::new).collect()
    }

    fn members(candidates: &[CandidateClusters]) -> Vec<Vec<usize>> {
        candidates
            .iter()
            .map(|c| c.critical.members().iter().map(|id| id.value()).collect())
            .collect()
    }

    #[test]
    fn test_suffixes_smallest_first() {
        let snapshot = four_machine_snapshot();
        let candidates = enumerate_candidates(&snapshot, &ids(&[2, 1, 0]), false, 0, None);
        assert_eq!(members(&candidates), vec![vec![0], vec![0, 1], vec![0, 1, 2]]);
        for candidate in &candidates {
            assert_eq!(candidate.critical.len() + candidate.non_critical.len(), 4);
        }
    }

    #[test]
    fn test_full_set_is_never_a_candidate() {
        let snapshot = four_machine_snapshot();
        let candidates = enumerate_candidates(&snapshot, &ids(&[3, 2, 1, 0]), false, 0, None);
        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| !c.non_critical.is_empty()));
    }

    #[test]
    fn test_all_combinations_capped() {
        let snapshot = four_machine_snapshot();
        let all = enumerate_candidates(&snapshot, &ids(&[1, 0]), true, 0, None);
        assert_eq!(members(&all), vec![vec![0, 1], vec![0], vec![1]]);
        let capped = enumerate_candidates(&snapshot, &ids(&[1, 0]), true, 2, None);
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn test_minimum_power_filter() {
        let snapshot = four_machine_snapshot();
        // G2 and G3 produce 0.1 pu each
        let candidates = enumerate_candidates(&snapshot, &ids(&[2, 1, 0]), false, 0, Some(0.95));
        assert_eq!(members(&candidates), vec![vec![0, 1], vec![0, 1, 2]]);
    }

    #[test]
    fn test_merge_drops_duplicates() {
        let snapshot = four_machine_snapshot();
        let first = enumerate_candidates(&snapshot, &ids(&[1, 0]), false, 0, None);
        let second = enumerate_candidates(&snapshot, &ids(&[0]), false, 0, None);
        let merged = merge_unique(first, second, 0);
        assert_eq!(members(&merged), vec![vec![0], vec![0, 1]]);
        assert_eq!(merge_unique(merged, Vec::new(), 1).len(), 1);
    }
}
