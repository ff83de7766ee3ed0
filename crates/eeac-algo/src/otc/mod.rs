//! OMIB trajectory calculators (OTC).
//!
//! Turn the critical and maximum angles of an OMIB into times. Starting from
//! rest at δ0 in the during-fault regime, the OMIB is walked from stop to
//! stop: the next requested angle, the next update angle, or the transition
//! angle at which the fault is cleared. Each stop-to-stop segment is solved
//! by a [`SegmentSolver`]:
//!
//! - [`TaylorSeries`]: fourth-order Taylor expansion of the swing equation,
//!   inverted with a polynomial root search
//! - [`NumericalIntegrator`]: fixed-step RK4 integration of the swing equation

mod numerical;
pub mod poly;
mod taylor;

pub use numerical::NumericalIntegrator;
pub use taylor::TaylorSeries;

use eeac_core::units::Degrees;
use eeac_core::{is_close, EeacError, EeacResult, GeneratorCluster, NetworkRegime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::eac::EacResult;
use crate::omib::{OmibModel, StabilityState, SwingState};

/// Critical times above this value (s) are reported as always stable.
const MAX_CRITICAL_TIME: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalculatorType {
    #[serde(rename = "TAYL")]
    Taylor,
    #[serde(rename = "NUM")]
    Numerical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OtcConfig {
    pub calculator_type: CalculatorType,
    /// Shift of the transition angle, used only for the stops beyond it
    pub critical_angle_shift: Degrees,
}

impl Default for OtcConfig {
    fn default() -> Self {
        Self {
            calculator_type: CalculatorType::Taylor,
            critical_angle_shift: Degrees(0.0),
        }
    }
}

/// State of the OMIB at one stop of its trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    /// Regime applying from this point on
    pub regime: NetworkRegime,
    /// s
    pub time: f64,
    /// rad
    pub angle: f64,
    /// pu
    pub speed: f64,
}

/// Time needed by an OMIB to move between two angles in a given regime.
pub trait SegmentSolver: Send + Sync {
    fn solve_segment(
        &self,
        omib: &OmibModel,
        from: &TrajectoryPoint,
        to_angle: f64,
        to_regime: NetworkRegime,
    ) -> EeacResult<TrajectoryPoint>;
}

impl CalculatorType {
    pub fn solver(self) -> Box<dyn SegmentSolver> {
        match self {
            CalculatorType::Taylor => Box::new(TaylorSeries),
            CalculatorType::Numerical => Box::new(NumericalIntegrator::default()),
        }
    }
}

/// Outcome of the evaluation of one critical cluster candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResults {
    pub critical_cluster: GeneratorCluster,
    pub non_critical_cluster: GeneratorCluster,
    pub critical_names: Vec<String>,
    pub stability_state: StabilityState,
    pub swing_state: SwingState,
    /// rad
    pub critical_angle: f64,
    /// rad
    pub maximum_angle: f64,
    /// s, infinite when always stable
    pub critical_time: f64,
    /// s, infinite when always stable
    pub maximum_time: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trajectory: Vec<TrajectoryPoint>,
}

/// Walk the OMIB trajectory and return the times of `angles`, together with
/// every computed point.
///
/// `angles` must be ordered in the swing direction. The regime switches to
/// post-fault at `transition_angle` shifted by `transition_shift` (rad).
pub fn trajectory_times(
    solver: &dyn SegmentSolver,
    omib: &OmibModel,
    angles: &[f64],
    transition_angle: f64,
    transition_shift: f64,
) -> EeacResult<(Vec<f64>, Vec<TrajectoryPoint>)> {
    let factor = omib.swing_factor();
    let transition = transition_angle + transition_shift * factor;
    let mut updates = omib
        .update_angles()
        .iter()
        .map(|u| u.angle)
        .filter(|angle| *angle != omib.initial_angle)
        .peekable();

    let mut from = TrajectoryPoint {
        regime: NetworkRegime::DuringFault,
        time: 0.0,
        angle: omib.initial_angle,
        speed: 0.0,
    };
    let mut current = NetworkRegime::DuringFault;
    let mut points = vec![from];
    let mut times = Vec::with_capacity(angles.len());
    let mut targets = angles.iter().copied().peekable();

    while let Some(&angle) = targets.peek() {
        let update = updates.peek().copied();
        let mut target = angle;
        for stop in update
            .into_iter()
            .chain((current == NetworkRegime::DuringFault).then_some(transition))
        {
            if factor * stop < factor * target {
                target = stop;
            }
        }

        let mut regime = from.regime;
        let reached = is_close(target, angle, 0.0);
        if update.is_some_and(|u| is_close(target, u, 0.0)) {
            regime = current;
            updates.next();
        }
        if current == NetworkRegime::DuringFault && is_close(target, transition, 0.0) {
            regime = NetworkRegime::PostFault;
            current = NetworkRegime::PostFault;
        }

        let to = solve_with_retry(solver, omib, &from, target, regime)?;
        if reached {
            times.push(to.time);
            targets.next();
        }
        points.push(to);
        from = to;
    }

    Ok((times, points))
}

fn solve_with_retry(
    solver: &dyn SegmentSolver,
    omib: &OmibModel,
    from: &TrajectoryPoint,
    target: f64,
    regime: NetworkRegime,
) -> EeacResult<TrajectoryPoint> {
    if target == from.angle {
        return Ok(TrajectoryPoint { regime, ..*from });
    }
    match solver.solve_segment(omib, from, target, regime) {
        Ok(point) => Ok(point),
        Err(EeacError::NonConvergence(reason)) => {
            let reduction = if target != 0.0 {
                target.signum() * (target - omib.initial_angle).abs() / 10.0
            } else {
                -omib.initial_angle / 10.0
            };
            debug!(target, reduction, %reason, "retrying trajectory segment with a reduced target");
            solver.solve_segment(omib, from, target - reduction, regime)
        }
        Err(other) => Err(other),
    }
}

/// Critical and maximum times of an OMIB whose angles were found by EAC.
pub fn compute(omib: &OmibModel, eac: &EacResult, config: &OtcConfig) -> EeacResult<ClusterResults> {
    let critical_angle = eac.critical_angle.value();
    let maximum_angle = eac.maximum_angle.value();
    let mut stability_state = eac.stability_state;

    let (mut critical_time, mut maximum_time, trajectory) = if stability_state == StabilityState::Stable {
        (f64::INFINITY, f64::INFINITY, Vec::new())
    } else {
        let solver = config.calculator_type.solver();
        let shift = config.critical_angle_shift.to_radians().value();
        let (times, points) = trajectory_times(
            solver.as_ref(),
            omib,
            &[critical_angle, maximum_angle],
            critical_angle,
            shift,
        )?;
        match times.as_slice() {
            [critical, maximum] => (*critical, *maximum, points),
            _ => {
                return Err(EeacError::NonConvergence(
                    "trajectory walk did not reach every requested angle".into(),
                ))
            }
        }
    };

    if critical_time > MAX_CRITICAL_TIME {
        critical_time = f64::INFINITY;
        maximum_time = f64::INFINITY;
        stability_state = StabilityState::Stable;
    }

    debug!(
        critical_time,
        maximum_time,
        state = ?stability_state,
        calculator = ?config.calculator_type,
        "OMIB trajectory computed"
    );

    Ok(ClusterResults {
        critical_cluster: omib.critical.clone(),
        non_critical_cluster: omib.non_critical.clone(),
        critical_names: omib.critical_names.clone(),
        stability_state,
        swing_state: omib.swing_state,
        critical_angle,
        maximum_angle,
        critical_time,
        maximum_time,
        trajectory,
    })
}
