//! Generator trajectory calculator (GTC).
//!
//! Advances every generator rotor angle along a time grid spanning the fault
//! (until the critical clearing time) and the post-fault period (until the
//! maximum time) with a fourth-order Taylor series of the multi-machine swing
//! equations. The resulting [`GeneratorTrajectories`] feed dynamic OMIB
//! models and trajectory-based cluster identification.

use eeac_core::units::Milliseconds;
use eeac_core::{
    is_close, EeacError, EeacResult, GeneratorTrajectories, NetworkRegime, NetworkSnapshot, TrajectorySample,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

const TIME_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotKeyword {
    #[serde(rename = "ALL")]
    All,
    #[serde(rename = "NONE")]
    None,
}

/// Generators whose angle curves are attached to the node report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneratorsToPlot {
    Keyword(PlotKeyword),
    Names(Vec<String>),
}

impl Default for GeneratorsToPlot {
    fn default() -> Self {
        GeneratorsToPlot::Keyword(PlotKeyword::None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GtcConfig {
    pub nb_during_fault_intervals: usize,
    pub nb_post_fault_intervals: usize,
    /// Extra fault duration used only for the post-fault points
    pub critical_time_shift: Milliseconds,
    pub generators_to_plot: GeneratorsToPlot,
}

impl Default for GtcConfig {
    fn default() -> Self {
        Self {
            nb_during_fault_intervals: 5,
            nb_post_fault_intervals: 5,
            critical_time_shift: Milliseconds(0.0),
            generators_to_plot: GeneratorsToPlot::default(),
        }
    }
}

/// Rotor angle curve of one generator, in ms and degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleCurve {
    pub generator: String,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Copy)]
struct GridTime {
    time: f64,
    regime: NetworkRegime,
}

fn time_grid(transition: f64, last: f64, shift: f64, during: usize, post: usize) -> Vec<GridTime> {
    let at = |time: f64, regime: NetworkRegime| GridTime { time, regime };
    let mut grid = Vec::with_capacity(during + post + 2);
    grid.push(at(0.0, NetworkRegime::DuringFault));
    let during_interval = transition / during as f64;
    grid.extend((1..during).map(|i| at(i as f64 * during_interval, NetworkRegime::DuringFault)));
    if shift > 0.0 {
        grid.push(at(transition, NetworkRegime::DuringFault));
        grid.push(at(transition + shift, NetworkRegime::PostFault));
    } else {
        grid.push(at(transition, NetworkRegime::PostFault));
    }
    let post_interval = (last - transition) / post as f64;
    grid.extend((1..post).map(|i| at(transition + i as f64 * post_interval, NetworkRegime::PostFault)));
    grid.push(at(last, NetworkRegime::PostFault));
    grid
}

/// Advance all rotor angles from `from` by `dt` in `regime`.
fn taylor_step(snapshot: &NetworkSnapshot, from: &TrajectorySample, regime: NetworkRegime, dt: f64) -> (Vec<f64>, Vec<f64>) {
    let n = snapshot.len();
    let pulse = snapshot.pulse();
    let (a, b) = snapshot.coupling_matrices(regime, &from.angles);
    let inertia: Vec<f64> = snapshot.generators.iter().map(|g| g.inertia_coefficient()).collect();

    let d1: Vec<f64> = from.speeds.iter().map(|w| w * pulse).collect();
    let d2: Vec<f64> = (0..n)
        .map(|i| (snapshot.generators[i].active_power - a[i].iter().sum::<f64>()) * pulse / inertia[i])
        .collect();
    let d3: Vec<f64> = (0..n)
        .map(|i| (0..n).map(|j| b[i][j] * (d1[i] - d1[j])).sum::<f64>() * pulse / inertia[i])
        .collect();
    let d4: Vec<f64> = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| a[i][j] * (d1[i] - d1[j]).powi(2) + b[i][j] * (d2[i] - d2[j]))
                .sum::<f64>()
                * pulse
                / inertia[i]
        })
        .collect();
    let d5: Vec<f64> = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| {
                    let dd1 = d1[i] - d1[j];
                    3.0 * a[i][j] * dd1 * (d2[i] - d2[j]) + b[i][j] * (d3[i] - d3[j] - dd1.powi(3))
                })
                .sum::<f64>()
                * pulse
                / inertia[i]
        })
        .collect();

    let (t, t2, t3, t4) = (dt, dt.powi(2), dt.powi(3), dt.powi(4));
    let angles = (0..n)
        .map(|i| from.angles[i] + t * d1[i] + t2 * d2[i] / 2.0 + t3 * d3[i] / 6.0 + t4 * d4[i] / 24.0)
        .collect();
    let speeds = (0..n)
        .map(|i| from.speeds[i] + (t * d2[i] + t2 * d3[i] / 2.0 + t3 * d4[i] / 6.0 + t4 * d5[i] / 24.0) / pulse)
        .collect();
    (angles, speeds)
}

/// Generator trajectories for a fault cleared at `transition_time` (s),
/// sampled until `last_time` (s).
pub fn update_trajectories(
    snapshot: &NetworkSnapshot,
    transition_time: f64,
    last_time: f64,
    config: &GtcConfig,
) -> EeacResult<GeneratorTrajectories> {
    if is_close(transition_time, 0.0, TIME_TOLERANCE)
        || last_time < transition_time
        || is_close(transition_time, last_time, TIME_TOLERANCE)
        || !last_time.is_finite()
    {
        return Err(EeacError::Config(format!(
            "invalid trajectory update times: transition {transition_time} s, last {last_time} s"
        )));
    }
    if config.nb_during_fault_intervals == 0 || config.nb_post_fault_intervals == 0 {
        return Err(EeacError::Config("interval counts must be positive".into()));
    }
    if let Some(generator) = snapshot.generators.iter().find(|g| g.inertia_coefficient() == 0.0) {
        return Err(EeacError::DegenerateModel(format!(
            "generator '{}' has no inertia",
            generator.name
        )));
    }

    let shift = config.critical_time_shift.to_seconds().value();
    let grid = time_grid(
        transition_time,
        last_time,
        shift,
        config.nb_during_fault_intervals,
        config.nb_post_fault_intervals,
    );

    let initial = GeneratorTrajectories::initial(snapshot);
    let mut samples = vec![initial.initial_sample().clone()];
    let mut current = samples[0].clone();
    for window in grid.windows(2) {
        let (from, to) = (window[0], window[1]);
        let (angles, speeds) = taylor_step(snapshot, &current, from.regime, to.time - from.time);
        current = TrajectorySample {
            time: to.time,
            regime: to.regime,
            angles,
            speeds,
        };
        samples.push(current.clone());
    }

    if shift > 0.0 {
        // Drop the shifted clearing point; the clearing sample starts the post-fault period
        let transition_index = config.nb_during_fault_intervals;
        samples.remove(transition_index + 1);
        samples[transition_index].regime = NetworkRegime::PostFault;
    }

    debug!(
        samples = samples.len(),
        transition_time,
        last_time,
        "generator trajectories updated"
    );
    GeneratorTrajectories::from_samples(samples)
}

/// Angle curves selected by `selection`, for the report.
pub fn angle_curves(
    snapshot: &NetworkSnapshot,
    trajectories: &GeneratorTrajectories,
    selection: &GeneratorsToPlot,
) -> Vec<AngleCurve> {
    let selected = |name: &str| match selection {
        GeneratorsToPlot::Keyword(PlotKeyword::All) => true,
        GeneratorsToPlot::Keyword(PlotKeyword::None) => false,
        GeneratorsToPlot::Names(names) => names.iter().any(|n| n == name),
    };
    snapshot
        .generator_ids()
        .filter(|id| selected(&snapshot.generator(*id).name))
        .map(|id| AngleCurve {
            generator: snapshot.generator(id).name.clone(),
            points: trajectories
                .angle_series(id)
                .into_iter()
                .map(|(time, angle)| (time * 1000.0, angle.to_degrees()))
                .collect(),
        })
        .collect()
}
