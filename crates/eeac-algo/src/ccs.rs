//! Critical cluster selection (CCS) among sibling evaluations.

use serde::{Deserialize, Serialize};

use crate::otc::ClusterResults;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SelectorType {
    /// Lowest critical time
    #[default]
    #[serde(rename = "MIN")]
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CcsConfig {
    pub selector_type: SelectorType,
}

/// Index and value of the selected result. Ties keep the first result.
pub fn select<'a>(results: &'a [ClusterResults], selector: SelectorType) -> Option<(usize, &'a ClusterResults)> {
    match selector {
        SelectorType::Min => results
            .iter()
            .enumerate()
            .reduce(|best, candidate| {
                if candidate.1.critical_time < best.1.critical_time {
                    candidate
                } else {
                    best
                }
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omib::{StabilityState, SwingState};
    use eeac_core::{GeneratorCluster, GeneratorId};

    fn result(generator: usize, critical_time: f64) -> ClusterResults {
        ClusterResults {
            critical_cluster: GeneratorCluster::new([GeneratorId::new(generator)]),
            non_critical_cluster: GeneratorCluster::default(),
            critical_names: vec![format!("G{}", generator + 1)],
            stability_state: StabilityState::PotentiallyStable,
            swing_state: SwingState::Forward,
            critical_angle: 1.0,
            maximum_angle: 2.0,
            critical_time,
            maximum_time: critical_time * 2.0,
            trajectory: Vec::new(),
        }
    }

    #[test]
    fn test_lowest_critical_time_wins() {
        let results = [result(0, 0.162), result(1, 0.150)];
        let (index, selected) = select(&results, SelectorType::Min).unwrap();
        assert_eq!(index, 1);
        assert_eq!(selected.critical_names, vec!["G2"]);
    }

    #[test]
    fn test_ties_keep_first() {
        let results = [result(2, f64::INFINITY), result(0, 0.15), result(1, 0.15)];
        let (index, _) = select(&results, SelectorType::Min).unwrap();
        assert_eq!(index, 1);
        assert!(select(&[], SelectorType::Min).is_none());
    }

    #[test]
    fn test_selector_type_parses() {
        let config: CcsConfig = serde_json::from_str(r#"{"selector_type": "MIN"}"#).unwrap();
        assert_eq!(config.selector_type, SelectorType::Min);
        assert!(serde_json::from_str::<CcsConfig>(r#"{"selector_type": "MAX"}"#).is_err());
    }
}
