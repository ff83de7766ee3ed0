//! Turning a criterion ranking into ordered candidate machines.
//!
//! Both selections return machines ordered so that the most critical one
//! comes last.

use std::collections::BTreeSet;

use eeac_core::{EeacError, EeacResult, GeneratorId, NetworkSnapshot};
use tracing::trace;

/// Machines whose |criterion| exceeds `threshold` × the largest one.
///
/// When a minimum power is set and the selected machines do not reach it,
/// the threshold is lowered by `decrement` and the selection repeated.
pub fn threshold_candidates(
    snapshot: &NetworkSnapshot,
    criteria: &[f64],
    threshold: f64,
    decrement: f64,
    min_power: Option<f64>,
    never_critical: &BTreeSet<GeneratorId>,
) -> EeacResult<Vec<GeneratorId>> {
    let mut ranked: Vec<(GeneratorId, f64)> = snapshot
        .generator_ids()
        .map(|id| (id, criteria[id.value()].abs()))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    let max = ranked.last().map_or(0.0, |(_, criterion)| *criterion);
    if !max.is_finite() {
        return Err(EeacError::DegenerateModel(
            "infinite identification criterion".into(),
        ));
    }
    let eligible = ranked.iter().filter(|(id, _)| !never_critical.contains(id)).count();

    let mut threshold = threshold;
    loop {
        let candidates: Vec<GeneratorId> = ranked
            .iter()
            .filter(|(id, criterion)| *criterion > threshold * max && !never_critical.contains(id))
            .map(|(id, _)| *id)
            .collect();
        let Some(min_power) = min_power else {
            return Ok(candidates);
        };
        let power: f64 = candidates
            .iter()
            .map(|id| snapshot.generator(*id).active_power)
            .sum();
        if power.abs() >= min_power || candidates.len() == eligible {
            return Ok(candidates);
        }
        threshold -= decrement;
        trace!(threshold, power, "cluster below minimum power, lowering threshold");
        if threshold <= 0.0 {
            return Err(EeacError::CandidateExhaustion(format!(
                "no machine set reaches the minimum cluster power of {min_power:.4} pu"
            )));
        }
    }
}

/// Machines beyond the widest gap in the sorted variations.
///
/// A gap below a negative variation marks a backswing: the machines under
/// it are returned, the most negative last. Also returns the largest
/// |variation| among `eligible`.
pub fn gap_candidates(eligible: &[GeneratorId], variations: &[f64]) -> EeacResult<(Vec<GeneratorId>, f64)> {
    let mut ordered = eligible.to_vec();
    ordered.sort_by(|a, b| variations[a.value()].total_cmp(&variations[b.value()]));
    if ordered.is_empty() {
        return Err(EeacError::CandidateExhaustion(
            "no generator eligible to be critical".into(),
        ));
    }
    let max_variation = ordered
        .iter()
        .map(|id| variations[id.value()].abs())
        .fold(0.0, f64::max);
    if ordered.len() == 1 {
        return Ok((ordered, max_variation));
    }

    let mut widest = 0;
    let mut widest_gap = f64::NEG_INFINITY;
    for (k, pair) in ordered.windows(2).enumerate() {
        let gap = (variations[pair[1].value()] - variations[pair[0].value()]).abs();
        if gap > widest_gap {
            widest = k;
            widest_gap = gap;
        }
    }

    let candidates = if variations[ordered[widest].value()] < 0.0 {
        ordered[..=widest].iter().rev().copied().collect()
    } else {
        ordered[widest + 1..].to_vec()
    };
    Ok((candidates, max_variation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::four_machine_snapshot;

    fn ids(values: &[usize]) -> Vec<GeneratorId> {
        values.iter().copied().map(GeneratorId::new).collect()
    }

    #[test]
    fn test_gap_forward_swing() {
        let variations = [0.6, 0.01, 0.02, 0.5];
        let (candidates, max) = gap_candidates(&ids(&[0, 1, 2, 3]), &variations).unwrap();
        assert_eq!(candidates, ids(&[3, 0]));
        assert_eq!(max, 0.6);
    }

    #[test]
    fn test_gap_backswing() {
        let variations = [-0.5, -0.45, 0.01, 0.02];
        let (candidates, max) = gap_candidates(&ids(&[0, 1, 2, 3]), &variations).unwrap();
        assert_eq!(candidates, ids(&[1, 0]));
        assert_eq!(max, 0.5);
    }

    #[test]
    fn test_gap_max_variation_ignores_ineligible_machines() {
        let variations = [-0.9, 0.05, -0.3, 0.1];
        let (candidates, max) = gap_candidates(&ids(&[1, 2, 3]), &variations).unwrap();
        assert_eq!(candidates, ids(&[2]));
        assert_eq!(max, 0.3);
    }

    #[test]
    fn test_gap_needs_eligible_generators() {
        assert!(matches!(
            gap_candidates(&[], &[0.1]),
            Err(EeacError::CandidateExhaustion(_))
        ));
        let (single, _) = gap_candidates(&ids(&[2]), &[0.0, 0.0, 0.3]).unwrap();
        assert_eq!(single, ids(&[2]));
    }

    #[test]
    fn test_threshold_excludes_never_critical() {
        let snapshot = four_machine_snapshot();
        let never = BTreeSet::from([GeneratorId::new(0)]);
        let criteria = [10.0, 1.0, 6.0, 8.0];
        let candidates = threshold_candidates(&snapshot, &criteria, 0.5, 0.1, None, &never).unwrap();
        assert_eq!(candidates, ids(&[2, 3]));
    }

    #[test]
    fn test_threshold_exhaustion() {
        let snapshot = four_machine_snapshot();
        let criteria = [0.0; 4];
        let err = threshold_candidates(&snapshot, &criteria, 0.5, 0.1, Some(0.5), &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, EeacError::CandidateExhaustion(_)));
        let infinite = [f64::INFINITY, 1.0, 1.0, 1.0];
        assert!(threshold_candidates(&snapshot, &infinite, 0.5, 0.1, None, &BTreeSet::new()).is_err());
    }
}
