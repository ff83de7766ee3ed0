//! Equal Area Criterion (EAC) solver.
//!
//! ## Algorithm
//!
//! For a clearing angle δc, the OMIB accelerates along the during-fault
//! curve from δ0 to δc and then decelerates along the post-fault curve. It
//! comes back if some return angle δr satisfies
//!
//! ```text
//! A_during(δ0, δc) + A_post(δc, δr) ≤ 0,    A(a, b) = ∫_a^b (Pm − Pe(δ)) dδ
//! ```
//!
//! Clearing angles are scanned from δ0 in the swing direction, first with a
//! coarse step (15 increments) and then with the configured increment once a
//! clearing angle without return is met. Return angles are searched the same
//! way (coarse step of 20 increments). Areas are integrated in closed form on
//! each curve segment.
//!
//! | Outcome | Verdict |
//! |---------|---------|
//! | no return angle even when clearing at δ0 | `UNSTABLE` (δ0, δ0) |
//! | last clearing angle with a return angle found | `POTENTIALLY_STABLE` (δc, δr) |
//! | return angles up to the maximum integration angle | `STABLE` |

use std::f64::consts::PI;

use eeac_core::units::{Degrees, Radians};
use eeac_core::{EeacError, EeacResult, NetworkRegime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::omib::{OmibModel, StabilityState, SwingState};

const EXPLORATION_ANGLE_FACTOR: f64 = 15.0;
const EXPLORATION_LAST_ANGLE_FACTOR: f64 = 20.0;
const AREA_PLOT_SAMPLES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EacConfig {
    pub angle_increment: Degrees,
    pub max_integration_angle: Degrees,
    pub plot_area_graph: bool,
}

impl Default for EacConfig {
    fn default() -> Self {
        Self {
            angle_increment: Degrees(1.0),
            max_integration_angle: Degrees(360.0),
            plot_area_graph: false,
        }
    }
}

/// Critical and maximum angles of an OMIB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EacResult {
    pub stability_state: StabilityState,
    pub swing_state: SwingState,
    /// Critical clearing angle (rad)
    pub critical_angle: Radians,
    /// Maximum angle reached when cleared at the critical angle (rad)
    pub maximum_angle: Radians,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_plot: Option<AreaPlot>,
}

/// Power curves around the equal-area balance, for an external renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaPlot {
    pub initial_angle: f64,
    pub critical_angle: f64,
    pub maximum_angle: f64,
    pub mechanical_power: f64,
    pub points: Vec<AreaPlotPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaPlotPoint {
    pub angle: f64,
    pub during_fault_power: f64,
    pub post_fault_power: f64,
}

/// ∫_from^to (Pm − Pe(δ)) dδ along one curve.
fn segment_area(omib: &OmibModel, regime: NetworkRegime, from: f64, to: f64) -> f64 {
    let curve = omib.properties(regime, Some(from));
    (omib.mechanical_power - curve.constant_power) * (to - from)
        + curve.maximum_power * ((to - curve.angle_shift).cos() - (from - curve.angle_shift).cos())
}

/// Power area between two OMIB angles, split at the regime update angles.
pub fn power_area(omib: &OmibModel, regime: NetworkRegime, from: f64, to: f64) -> f64 {
    let factor = omib.swing_factor();
    let mut start = from;
    let mut area = 0.0;
    for update in omib.regime_update_angles(regime).skip(1) {
        if factor * update.angle <= factor * from {
            continue;
        }
        if factor * update.angle >= factor * to {
            break;
        }
        area += segment_area(omib, regime, start, update.angle);
        start = update.angle;
    }
    area + segment_area(omib, regime, start, to)
}

/// Apply the equal area criterion to an OMIB.
pub fn solve(omib: &OmibModel, config: &EacConfig) -> EeacResult<EacResult> {
    if !(config.angle_increment.value() > 0.0) {
        return Err(EeacError::Config(format!(
            "angle increment must be positive, got {}",
            config.angle_increment
        )));
    }
    if !(config.max_integration_angle.value() > 0.0) {
        return Err(EeacError::Config(format!(
            "maximum integration angle must be positive, got {}",
            config.max_integration_angle
        )));
    }

    let (stability_state, critical_angle, maximum_angle) = search_angles(omib, config);
    debug!(
        state = ?stability_state,
        critical_angle,
        maximum_angle,
        "equal area criterion applied"
    );

    let area_plot = config
        .plot_area_graph
        .then(|| area_plot(omib, critical_angle, maximum_angle));

    Ok(EacResult {
        stability_state,
        swing_state: omib.swing_state,
        critical_angle: Radians(critical_angle),
        maximum_angle: Radians(maximum_angle),
        area_plot,
    })
}

fn search_angles(omib: &OmibModel, config: &EacConfig) -> (StabilityState, f64, f64) {
    let factor = omib.swing_factor();
    let max_angle = config.max_integration_angle.to_radians().value();
    let increment = config.angle_increment.to_radians().value() * factor;
    let big_increment = increment * EXPLORATION_ANGLE_FACTOR;
    let big_last_increment = increment * EXPLORATION_LAST_ANGLE_FACTOR;
    let initial = omib.initial_angle;
    let post_fault = NetworkRegime::PostFault;

    let mut angle = initial;
    let mut last_angle = angle + big_increment;
    let mut candidate: Option<(f64, f64)> = None;
    let mut acceleration_area = 0.0;
    let mut angle_exploration = true;

    while angle * factor < max_angle {
        let mut last_exploration = true;
        while last_angle * factor <= max_angle {
            let deceleration_area = power_area(omib, post_fault, angle, last_angle);
            if acceleration_area + deceleration_area <= 0.0 {
                if last_exploration {
                    last_exploration = false;
                    last_angle -= big_last_increment;
                } else {
                    candidate = Some((angle, last_angle));
                    break;
                }
            }
            last_angle += if last_exploration { big_last_increment } else { increment };
        }

        if last_angle * factor > max_angle {
            let (critical, maximum) = match candidate {
                Some((critical, maximum)) if critical != initial => (critical, maximum),
                _ => return (StabilityState::Unstable, initial, initial),
            };
            let electric_power = omib.electric_power(post_fault, maximum);
            if factor * omib.mechanical_power <= factor * electric_power {
                if angle_exploration {
                    angle_exploration = false;
                    angle -= big_increment;
                } else {
                    return (StabilityState::PotentiallyStable, critical, maximum);
                }
            }
        }

        angle += if angle_exploration { big_increment } else { increment };
        last_angle = angle + big_increment;
        acceleration_area = power_area(omib, NetworkRegime::DuringFault, initial, angle);
    }

    let bound = max_angle * factor;
    (StabilityState::Stable, bound, bound)
}

fn area_plot(omib: &OmibModel, critical_angle: f64, maximum_angle: f64) -> AreaPlot {
    let factor = omib.swing_factor();
    let start = omib.initial_angle - factor * PI / 6.0;
    let end = maximum_angle + factor * PI / 6.0;
    let step = (end - start) / (AREA_PLOT_SAMPLES - 1) as f64;
    let points = (0..AREA_PLOT_SAMPLES)
        .map(|k| {
            let angle = start + step * k as f64;
            AreaPlotPoint {
                angle,
                during_fault_power: omib.electric_power(NetworkRegime::DuringFault, angle),
                post_fault_power: omib.electric_power(NetworkRegime::PostFault, angle),
            }
        })
        .collect();
    AreaPlot {
        initial_angle: omib.initial_angle,
        critical_angle,
        maximum_angle,
        mechanical_power: omib.mechanical_power,
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omib::OmibType;
    use crate::test_utils::two_machine_snapshot;
    use eeac_core::{GeneratorCluster, GeneratorId, GeneratorTrajectories, NetworkSnapshot};

    fn omib(snapshot: &NetworkSnapshot) -> OmibModel {
        let trajectories = GeneratorTrajectories::initial(snapshot);
        let cc = GeneratorCluster::new([GeneratorId::new(0)]);
        let ncc = cc.complement(snapshot);
        OmibModel::build(snapshot, &trajectories, &cc, &ncc, OmibType::Zoomib).unwrap()
    }

    fn config(increment: f64, max: f64) -> EacConfig {
        EacConfig {
            angle_increment: Degrees(increment),
            max_integration_angle: Degrees(max),
            plot_area_graph: false,
        }
    }

    #[test]
    fn test_terminal_fault_matches_classical_critical_angle() {
        let snapshot = two_machine_snapshot(0.5, None, 0.5);
        let omib = omib(&snapshot);
        let result = solve(&omib, &config(0.1, 360.0)).unwrap();

        let pmax = 2.2_f64;
        let delta0 = (0.8 / pmax).asin();
        let delta_max = PI - delta0;
        let expected = ((0.8 / pmax) * (delta_max - delta0) + delta_max.cos()).acos();

        assert_eq!(result.stability_state, StabilityState::PotentiallyStable);
        assert_eq!(result.swing_state, SwingState::Forward);
        assert!((result.critical_angle.value() - expected).abs() < 5e-3);
        assert!((result.maximum_angle.value() - delta_max).abs() < 5e-2);
        assert!(result.maximum_angle.value() <= delta_max);
    }

    #[test]
    fn test_terminal_fault_is_never_stable() {
        let snapshot = two_machine_snapshot(0.5, None, 0.5);
        let result = solve(&omib(&snapshot), &config(0.1, 270.0)).unwrap();
        assert_ne!(result.stability_state, StabilityState::Stable);
    }

    #[test]
    fn test_refining_increment_does_not_lower_critical_angle() {
        let snapshot = two_machine_snapshot(0.5, None, 0.6);
        let omib = omib(&snapshot);
        let coarse = solve(&omib, &config(1.0, 360.0)).unwrap();
        let medium = solve(&omib, &config(0.5, 360.0)).unwrap();
        let fine = solve(&omib, &config(0.1, 360.0)).unwrap();
        assert_eq!(coarse.stability_state, fine.stability_state);
        assert!(medium.critical_angle.value() >= coarse.critical_angle.value() - 1e-3);
        assert!(fine.critical_angle.value() >= medium.critical_angle.value() - 1e-3);
    }

    #[test]
    fn test_unstable_when_post_fault_cannot_carry_power() {
        // Post-fault tie too weak to transfer Pm
        let snapshot = two_machine_snapshot(0.5, None, 2.0);
        let omib = omib(&snapshot);
        let result = solve(&omib, &config(0.5, 360.0)).unwrap();
        assert_eq!(result.stability_state, StabilityState::Unstable);
        assert_eq!(result.critical_angle.value(), omib.initial_angle);
        assert_eq!(result.maximum_angle.value(), omib.initial_angle);
    }

    #[test]
    fn test_backward_swing_mirrors_the_forward_search() {
        let forward = solve(&omib(&two_machine_snapshot(0.5, None, 0.5)), &config(0.1, 360.0)).unwrap();

        // Same fault with G1 importing the power it exported
        let mut snapshot = two_machine_snapshot(0.5, None, 0.5);
        snapshot.generators[0].active_power = -0.8;
        snapshot.generators[1].active_power = 0.8;
        snapshot.generators[0].initial_angle = -snapshot.generators[0].initial_angle;
        let backward_omib = omib(&snapshot);
        let backward = solve(&backward_omib, &config(0.1, 360.0)).unwrap();

        assert_eq!(backward.swing_state, SwingState::Backward);
        assert_eq!(backward.stability_state, StabilityState::PotentiallyStable);
        assert!(backward.critical_angle.value() < backward_omib.initial_angle);
        assert!(backward.maximum_angle.value() < backward.critical_angle.value());
        assert!((backward.critical_angle.value() + forward.critical_angle.value()).abs() < 2e-3);
        assert!((backward.maximum_angle.value() + forward.maximum_angle.value()).abs() < 2e-3);
    }

    #[test]
    fn test_rejects_non_positive_increment() {
        let snapshot = two_machine_snapshot(0.5, None, 0.5);
        assert!(solve(&omib(&snapshot), &config(0.0, 360.0)).is_err());
        assert!(solve(&omib(&snapshot), &config(1.0, -10.0)).is_err());
    }

    #[test]
    fn test_area_plot_brackets_the_swing() {
        let snapshot = two_machine_snapshot(0.5, None, 0.5);
        let mut cfg = config(0.5, 360.0);
        cfg.plot_area_graph = true;
        let result = solve(&omib(&snapshot), &cfg).unwrap();
        let plot = result.area_plot.unwrap();
        assert_eq!(plot.points.len(), 200);
        assert!(plot.points[0].angle < plot.initial_angle);
        assert!(plot.points[199].angle > plot.maximum_angle);
        assert!(plot.points.iter().all(|p| p.during_fault_power == 0.0));
    }

    #[test]
    fn test_closed_form_area_matches_quadrature() {
        let snapshot = two_machine_snapshot(0.5, Some(1.0), 0.7);
        let omib = omib(&snapshot);
        let (a, b) = (0.4, 1.9);
        let n = 20_000;
        let h = (b - a) / n as f64;
        let numeric: f64 = (0..n)
            .map(|k| {
                let x = a + (k as f64 + 0.5) * h;
                (omib.mechanical_power - omib.electric_power(NetworkRegime::PostFault, x)) * h
            })
            .sum();
        assert!((power_area(&omib, NetworkRegime::PostFault, a, b) - numeric).abs() < 1e-6);
    }
}
