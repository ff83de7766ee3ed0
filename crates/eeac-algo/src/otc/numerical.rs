use eeac_core::{EeacError, EeacResult, NetworkRegime};

use super::{SegmentSolver, TrajectoryPoint};
use crate::omib::OmibModel;

/// Fixed-step RK4 integration of the OMIB swing equation
///
/// ```text
/// dδ/dt = p·ω
/// dω/dt = (Pm − Pe(δ)) / M
/// ```
///
/// stopped at the first step over which δ crosses the target angle. The
/// crossing time and speed are interpolated linearly inside that step.
#[derive(Debug, Clone, Copy)]
pub struct NumericalIntegrator {
    /// Integration step (s)
    pub step: f64,
    /// Absolute time (s) after which the target is considered unreachable
    pub horizon: f64,
}

impl Default for NumericalIntegrator {
    fn default() -> Self {
        Self {
            step: 1e-4,
            horizon: 10.0,
        }
    }
}

impl NumericalIntegrator {
    fn derivatives(omib: &OmibModel, regime: NetworkRegime, angle: f64, speed: f64) -> (f64, f64) {
        let electric_power = omib.electric_power(regime, angle);
        (
            omib.pulse * speed,
            (omib.mechanical_power - electric_power) / omib.inertia,
        )
    }

    fn rk4(&self, omib: &OmibModel, regime: NetworkRegime, angle: f64, speed: f64) -> (f64, f64) {
        let h = self.step;
        let (k1a, k1s) = Self::derivatives(omib, regime, angle, speed);
        let (k2a, k2s) = Self::derivatives(omib, regime, angle + h / 2.0 * k1a, speed + h / 2.0 * k1s);
        let (k3a, k3s) = Self::derivatives(omib, regime, angle + h / 2.0 * k2a, speed + h / 2.0 * k2s);
        let (k4a, k4s) = Self::derivatives(omib, regime, angle + h * k3a, speed + h * k3s);
        (
            angle + h / 6.0 * (k1a + 2.0 * k2a + 2.0 * k3a + k4a),
            speed + h / 6.0 * (k1s + 2.0 * k2s + 2.0 * k3s + k4s),
        )
    }
}

impl SegmentSolver for NumericalIntegrator {
    fn solve_segment(
        &self,
        omib: &OmibModel,
        from: &TrajectoryPoint,
        to_angle: f64,
        to_regime: NetworkRegime,
    ) -> EeacResult<TrajectoryPoint> {
        if omib.inertia == 0.0 {
            return Err(EeacError::DegenerateModel("OMIB has no inertia".into()));
        }

        let initial_gap = from.angle - to_angle;
        let mut time = from.time;
        let mut angle = from.angle;
        let mut speed = from.speed;
        while time < self.horizon {
            let (next_angle, next_speed) = self.rk4(omib, from.regime, angle, speed);
            let gap = next_angle - to_angle;
            if gap == 0.0 || gap.signum() != initial_gap.signum() {
                let previous_gap = angle - to_angle;
                let fraction = previous_gap / (previous_gap - gap);
                return Ok(TrajectoryPoint {
                    regime: to_regime,
                    time: time + fraction * self.step,
                    angle: to_angle,
                    speed: speed + fraction * (next_speed - speed),
                });
            }
            time += self.step;
            angle = next_angle;
            speed = next_speed;
        }

        Err(EeacError::NonConvergence(format!(
            "angle {to_angle:.6} rad not reached within {} s",
            self.horizon
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omib::OmibType;
    use crate::test_utils::two_machine_snapshot;
    use eeac_core::{GeneratorCluster, GeneratorId, GeneratorTrajectories};

    fn omib(x_post: f64) -> OmibModel {
        let snapshot = two_machine_snapshot(0.5, None, x_post);
        let trajectories = GeneratorTrajectories::initial(&snapshot);
        let cc = GeneratorCluster::new([GeneratorId::new(0)]);
        let ncc = cc.complement(&snapshot);
        OmibModel::build(&snapshot, &trajectories, &cc, &ncc, OmibType::Zoomib).unwrap()
    }

    #[test]
    fn test_unreachable_angle_does_not_converge() {
        let omib = omib(0.5);
        // Post-fault swing from rest at δ0 stays at δ0
        let from = TrajectoryPoint {
            regime: NetworkRegime::PostFault,
            time: 0.0,
            angle: omib.initial_angle,
            speed: 0.0,
        };
        let solver = NumericalIntegrator {
            step: 1e-3,
            horizon: 2.0,
        };
        let err = solver
            .solve_segment(&omib, &from, omib.initial_angle + 0.5, NetworkRegime::PostFault)
            .unwrap_err();
        assert!(matches!(err, EeacError::NonConvergence(_)));
    }

    #[test]
    fn test_free_fall_matches_closed_form() {
        let omib = omib(0.5);
        let from = TrajectoryPoint {
            regime: NetworkRegime::DuringFault,
            time: 0.0,
            angle: omib.initial_angle,
            speed: 0.0,
        };
        let point = NumericalIntegrator::default()
            .solve_segment(&omib, &from, omib.initial_angle + 0.3, NetworkRegime::DuringFault)
            .unwrap();
        let acceleration = omib.mechanical_power / omib.inertia;
        let expected = (2.0 * 0.3 / (omib.pulse * acceleration)).sqrt();
        assert!((point.time - expected).abs() < 1e-4);
        assert!((point.speed - acceleration * expected).abs() < 1e-4);
    }
}
