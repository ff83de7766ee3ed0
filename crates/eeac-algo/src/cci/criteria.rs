//! Per-generator ranking criteria, indexed by generator.

use eeac_core::units::{Milliseconds, Radians};
use eeac_core::{EeacError, EeacResult, GeneratorTrajectories, NetworkRegime, NetworkSnapshot};

use super::VariationCurve;

/// Initial during-fault acceleration p·(P_i − Pe_i) / M_i.
pub fn acceleration_criteria(snapshot: &NetworkSnapshot, trajectories: &GeneratorTrajectories) -> Vec<f64> {
    let angles = &trajectories.initial_sample().angles;
    let pulse = snapshot.pulse();
    snapshot
        .generator_ids()
        .map(|id| {
            let generator = snapshot.generator(id);
            let electric_power = snapshot.electric_power(NetworkRegime::DuringFault, id, angles);
            pulse * (generator.active_power - electric_power) / generator.inertia_coefficient()
        })
        .collect()
}

/// Acceleration divided by the summed pre- and post-fault distances to the
/// fault location.
pub fn composite_criteria(snapshot: &NetworkSnapshot, trajectories: &GeneratorTrajectories) -> EeacResult<Vec<f64>> {
    let distances = snapshot
        .fault_distances
        .as_ref()
        .ok_or_else(|| EeacError::Config("composite identification needs fault distances".into()))?;
    Ok(acceleration_criteria(snapshot, trajectories)
        .into_iter()
        .enumerate()
        .map(|(i, acceleration)| {
            let mut distance = distances.pre_fault[i] + distances.post_fault[i];
            if distance == 0.0 {
                distance += f64::EPSILON;
            }
            acceleration / distance
        })
        .collect())
}

/// Rotor angle variation (rad) between t = 0 and an observation moment.
pub fn trajectory_variations(trajectories: &GeneratorTrajectories, moment: i64) -> EeacResult<Vec<f64>> {
    let sample = trajectories.sample_at_moment(moment).ok_or_else(|| {
        EeacError::Config(format!(
            "observation moment {moment} out of range ({} samples)",
            trajectories.len()
        ))
    })?;
    let initial = &trajectories.initial_sample().angles;
    Ok(sample
        .angles
        .iter()
        .zip(initial)
        .map(|(angle, start)| angle - start)
        .collect())
}

/// Second and fourth angle derivatives at fault inception.
fn inception_derivatives(snapshot: &NetworkSnapshot, trajectories: &GeneratorTrajectories) -> (Vec<f64>, Vec<f64>) {
    let angles = &trajectories.initial_sample().angles;
    let (a, b) = snapshot.coupling_matrices(NetworkRegime::DuringFault, angles);
    let pulse = snapshot.pulse();
    let n = snapshot.len();

    let second: Vec<f64> = snapshot
        .generator_ids()
        .map(|id| {
            let generator = snapshot.generator(id);
            let i = id.value();
            let coupled: f64 = a[i].iter().sum();
            pulse * (generator.active_power - coupled) / generator.inertia_coefficient()
        })
        .collect();
    let fourth = (0..n)
        .map(|i| {
            let coupled: f64 = (0..n).map(|j| b[i][j] * (second[i] - second[j])).sum();
            pulse * coupled / snapshot.generators[i].inertia_coefficient()
        })
        .collect();
    (second, fourth)
}

fn taylor_variation(second: f64, fourth: f64, time: f64) -> f64 {
    let radians = second * time.powi(2) / 2.0 + fourth * time.powi(4) / 24.0;
    Radians(radians).to_degrees().value()
}

/// Fourth-order Taylor angle variation (deg) `time` seconds into the fault.
pub fn during_fault_variations(snapshot: &NetworkSnapshot, trajectories: &GeneratorTrajectories, time: f64) -> Vec<f64> {
    let (second, fourth) = inception_derivatives(snapshot, trajectories);
    second
        .iter()
        .zip(&fourth)
        .map(|(d2, d4)| taylor_variation(*d2, *d4, time))
        .collect()
}

/// Variation curves of every generator over the given fault durations.
pub(super) fn during_fault_curves(
    snapshot: &NetworkSnapshot,
    trajectories: &GeneratorTrajectories,
    times: &[Milliseconds],
) -> Vec<VariationCurve> {
    let (second, fourth) = inception_derivatives(snapshot, trajectories);
    snapshot
        .generator_ids()
        .map(|id| {
            let i = id.value();
            VariationCurve {
                generator: snapshot.generator(id).name.clone(),
                points: times
                    .iter()
                    .map(|t| (t.value(), taylor_variation(second[i], fourth[i], t.to_seconds().value())))
                    .collect(),
            }
        })
        .collect()
}
