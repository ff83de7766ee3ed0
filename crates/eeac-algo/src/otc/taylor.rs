use eeac_core::{EeacError, EeacResult, NetworkRegime};

use super::poly::positive_real_roots;
use super::{SegmentSolver, TrajectoryPoint};
use crate::omib::OmibModel;

/// Fourth-order Taylor series of the OMIB swing equation.
///
/// With ω the speed deviation (pu) and p the network pulse, the angle moves
/// as δ(t) = δ + ωp·t + Σ_k d_k·p·t^(k+1)/(k+1)! where d_k are the time
/// derivatives of ω. The segment time is the positive real root of this
/// polynomial at the target angle.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaylorSeries;

#[derive(Debug, Clone, Copy)]
struct SpeedDerivatives {
    first: f64,
    second: f64,
    third: f64,
    fourth: f64,
}

fn speed_derivatives(omib: &OmibModel, speed: f64, angle: f64, regime: NetworkRegime) -> SpeedDerivatives {
    let curve = omib.properties(regime, Some(angle));
    let deviation = angle - curve.angle_shift;
    let inverse_inertia = 1.0 / omib.inertia;
    let power_term = inverse_inertia * curve.maximum_power;
    let power_sine = power_term * deviation.sin();
    let power_cosine = power_term * deviation.cos();
    let pulse = omib.pulse;

    let first = inverse_inertia * (omib.mechanical_power - curve.constant_power) - power_sine;
    let second = -power_cosine * speed * pulse;
    let third = power_sine * speed.powi(2) * pulse.powi(2) - first * power_cosine * pulse;
    let fourth = power_cosine * (pulse.powi(3) * speed.powi(3) - pulse * second)
        + 3.0 * power_sine * pulse.powi(2) * speed * first;

    SpeedDerivatives {
        first,
        second,
        third,
        fourth,
    }
}

/// Pick the segment time among the roots of the truncated series.
///
/// Orders are tried from the highest down. When several roots remain, the
/// one closest to the unique root of the quadratic (or linear) truncation is
/// kept, or the smallest one otherwise.
fn select_root(coefficients: &[f64; 5]) -> Option<f64> {
    let roots = (0..4)
        .map(|order| positive_real_roots(&coefficients[order..]))
        .find(|roots| !roots.is_empty())?;
    if roots.len() == 1 {
        return Some(roots[0]);
    }
    let reference = (2..4)
        .map(|order| positive_real_roots(&coefficients[order..]))
        .find(|roots| roots.len() == 1)
        .map(|roots| roots[0]);
    match reference {
        Some(reference) => roots
            .into_iter()
            .min_by(|a, b| (a - reference).abs().total_cmp(&(b - reference).abs())),
        None => roots.into_iter().min_by(f64::total_cmp),
    }
}

impl SegmentSolver for TaylorSeries {
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
        let pulse = omib.pulse;
        let d = speed_derivatives(omib, from.speed, from.angle, from.regime);

        let coefficients = [
            d.third * pulse / 24.0,
            d.second * pulse / 6.0,
            d.first * pulse / 2.0,
            from.speed * pulse,
            from.angle - to_angle,
        ];
        let time = select_root(&coefficients).ok_or_else(|| {
            EeacError::NonConvergence(format!("no positive time found to reach angle {to_angle:.6} rad"))
        })?;

        let speed = from.speed
            + d.first * time
            + d.second * time.powi(2) / 2.0
            + d.third * time.powi(3) / 6.0
            + d.fourth * time.powi(4) / 24.0;

        Ok(TrajectoryPoint {
            regime: to_regime,
            time: from.time + time,
            angle: to_angle,
            speed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_root_prefers_closest_to_low_order() {
        // Quartic roots 0.5 and 1.5; the quadratic truncation
        // -3.25 t² - 11.5 t + 6 has a single positive root near 0.46
        let coefficients = [1.0, 4.0, -3.25, -11.5, 6.0];
        let root = select_root(&coefficients).unwrap();
        assert!((root - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_select_root_falls_back_to_lower_orders() {
        // Linear series t − 2; t² + 1 has no real root at any order
        let coefficients = [0.0, 0.0, 0.0, 1.0, -2.0];
        assert_eq!(select_root(&coefficients), Some(2.0));
        assert_eq!(select_root(&[0.0, 0.0, 1.0, 0.0, 1.0]), None);
    }
}
