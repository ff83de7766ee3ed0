//! One-Machine-Infinite-Bus (OMIB) reduction.
//!
//! A critical cluster (CC) and its complement (NCC) are collapsed into a
//! single equivalent machine whose electric power follows
//!
//! ```text
//! Pe(δ) = Pc + Pmax · sin(δ − ν)
//! ```
//!
//! in each network regime. The curve parameters depend on how the rotor
//! angles inside each cluster deviate from the cluster's partial center of
//! angle (PCOA):
//!
//! | Variant | Deviation δ_i − PCOA | Curves |
//! |---------|----------------------|--------|
//! | ZOOMIB  | 0 (rigid clusters)   | one per regime |
//! | COOMIB  | frozen at t = 0      | one per regime |
//! | DOMIB   | per trajectory sample | one per regime and sample |
//!
//! The `R` prefixed variants differ only in the initial OMIB angle, taken from
//! the rotor angles (PCOA_cc − PCOA_ncc) rather than from the pre-fault
//! power balance.

use std::fmt;

use eeac_core::{
    is_close, EeacError, EeacResult, GeneratorCluster, GeneratorTrajectories, NetworkRegime,
    NetworkSnapshot, TrajectorySample,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tolerance used to recognise the initial OMIB angle.
const INITIAL_ANGLE_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OmibType {
    Zoomib,
    Rzoomib,
    Coomib,
    Rcoomib,
    Domib,
    Rdomib,
}

impl OmibType {
    /// Initial angle taken from the rotor angles instead of the power balance.
    pub fn is_revised(self) -> bool {
        matches!(self, OmibType::Rzoomib | OmibType::Rcoomib | OmibType::Rdomib)
    }

    /// Curves follow the generator trajectories.
    pub fn is_dynamic(self) -> bool {
        matches!(self, OmibType::Domib | OmibType::Rdomib)
    }

    fn deviation(self) -> Deviation {
        match self {
            OmibType::Zoomib | OmibType::Rzoomib => Deviation::Zero,
            OmibType::Coomib | OmibType::Rcoomib => Deviation::Constant,
            OmibType::Domib | OmibType::Rdomib => Deviation::Dynamic,
        }
    }
}

impl fmt::Display for OmibType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OmibType::Zoomib => "ZOOMIB",
            OmibType::Rzoomib => "RZOOMIB",
            OmibType::Coomib => "COOMIB",
            OmibType::Rcoomib => "RCOOMIB",
            OmibType::Domib => "DOMIB",
            OmibType::Rdomib => "RDOMIB",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OmibConfig {
    pub omib_type: OmibType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deviation {
    Zero,
    Constant,
    Dynamic,
}

/// Direction in which the OMIB angle moves during the fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwingState {
    Forward,
    Backward,
}

impl SwingState {
    /// +1 for forward swings, −1 for backward swings.
    #[inline]
    pub fn factor(self) -> f64 {
        match self {
            SwingState::Forward => 1.0,
            SwingState::Backward => -1.0,
        }
    }
}

/// Stability verdict of an OMIB model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StabilityState {
    /// Always stable up to the maximum integration angle
    Stable,
    /// Stable if cleared before the critical angle
    PotentiallyStable,
    /// Unstable whatever the clearing time
    Unstable,
}

/// Parameters of one OMIB electric power curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveProperties {
    /// ν (rad)
    pub angle_shift: f64,
    /// Pc (pu)
    pub constant_power: f64,
    /// Pmax (pu)
    pub maximum_power: f64,
}

impl CurveProperties {
    #[inline]
    pub fn electric_power(&self, angle: f64) -> f64 {
        self.constant_power + self.maximum_power * (angle - self.angle_shift).sin()
    }
}

/// OMIB angle at which a new curve starts to apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdateAngle {
    pub angle: f64,
    pub time: f64,
    pub regime: NetworkRegime,
    pub curve: CurveProperties,
}

/// OMIB equivalent of a CC/NCC partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmibModel {
    pub omib_type: OmibType,
    pub critical: GeneratorCluster,
    pub non_critical: GeneratorCluster,
    /// Sorted names of the critical generators
    pub critical_names: Vec<String>,
    /// M = M_c·M_n / M_T
    pub inertia: f64,
    /// Pm (pu)
    pub mechanical_power: f64,
    /// δ0 (rad)
    pub initial_angle: f64,
    pub swing_state: SwingState,
    /// 2πf (rad/s)
    pub pulse: f64,
    update_angles: Vec<UpdateAngle>,
}

struct Reducer<'a> {
    snapshot: &'a NetworkSnapshot,
    trajectories: &'a GeneratorTrajectories,
    critical: &'a GeneratorCluster,
    non_critical: &'a GeneratorCluster,
    deviation: Deviation,
    critical_ratio: f64,
    non_critical_ratio: f64,
}

impl Reducer<'_> {
    /// δ_i − PCOA_cluster(i) for every generator, at the given sample.
    fn deviations(&self, sample: &TrajectorySample) -> Vec<f64> {
        let mut deviations = vec![0.0; self.snapshot.len()];
        let sample = match self.deviation {
            Deviation::Zero => return deviations,
            Deviation::Constant => self.trajectories.initial_sample(),
            Deviation::Dynamic => sample,
        };
        for cluster in [self.critical, self.non_critical] {
            let center = cluster.center_of_angle(self.snapshot, &sample.angles);
            for id in cluster.members() {
                deviations[id.value()] = sample.angles[id.value()] - center;
            }
        }
        deviations
    }

    fn curve(&self, regime: NetworkRegime, sample: &TrajectorySample) -> CurveProperties {
        let deviations = self.deviations(sample);
        let y = self.snapshot.admittance(regime);
        let terms = |i: usize, j: usize| {
            let amplitude = self.snapshot.generators[i].internal_voltage * self.snapshot.generators[j].internal_voltage;
            let yij = y.get(i, j);
            let angle = deviations[i] - deviations[j];
            (angle.sin(), angle.cos(), amplitude * yij.re, amplitude * yij.im)
        };

        let (mut c1, mut c2, mut d1, mut d2) = (0.0, 0.0, 0.0, 0.0);
        for i in self.critical.members() {
            for j in self.non_critical.members() {
                let (sin, cos, ag, ab) = terms(i.value(), j.value());
                c1 += sin * ab;
                c2 += cos * ag;
                d1 += cos * ab;
                d2 += sin * ag;
            }
        }
        let internal = |cluster: &GeneratorCluster| {
            let mut total = 0.0;
            for i in cluster.members() {
                for j in cluster.members() {
                    let (sin, cos, ag, ab) = terms(i.value(), j.value());
                    total += cos * ag + sin * ab;
                }
            }
            total
        };
        let critical_power = internal(self.critical);
        let non_critical_power = internal(self.non_critical);

        let ratio_diff = self.non_critical_ratio - self.critical_ratio;
        let c = c1 + c2 * ratio_diff;
        let d = d1 - d2 * ratio_diff;
        CurveProperties {
            angle_shift: -c.atan2(d),
            constant_power: self.non_critical_ratio * critical_power - self.critical_ratio * non_critical_power,
            maximum_power: c.hypot(d),
        }
    }

    fn omib_angle(&self, sample: &TrajectorySample) -> f64 {
        self.critical.center_of_angle(self.snapshot, &sample.angles)
            - self.non_critical.center_of_angle(self.snapshot, &sample.angles)
    }
}

impl OmibModel {
    /// Reduce the CC/NCC partition to its OMIB equivalent.
    pub fn build(
        snapshot: &NetworkSnapshot,
        trajectories: &GeneratorTrajectories,
        critical: &GeneratorCluster,
        non_critical: &GeneratorCluster,
        omib_type: OmibType,
    ) -> EeacResult<Self> {
        if critical.is_empty() || non_critical.is_empty() {
            return Err(EeacError::DegenerateModel(
                "critical and non-critical clusters must both be non-empty".into(),
            ));
        }
        if let Some(shared) = critical.members().iter().find(|id| non_critical.contains(**id)) {
            return Err(EeacError::Config(format!(
                "generator '{}' is in both clusters",
                snapshot.generator(*shared).name
            )));
        }

        let critical_inertia = critical.total_inertia(snapshot);
        let non_critical_inertia = non_critical.total_inertia(snapshot);
        let total_inertia = critical_inertia + non_critical_inertia;
        if total_inertia.abs() < 1e-12 || critical_inertia * non_critical_inertia == 0.0 {
            return Err(EeacError::DegenerateModel(format!(
                "cluster inertia is zero (critical {critical_inertia}, non-critical {non_critical_inertia})"
            )));
        }
        let inertia = critical_inertia * non_critical_inertia / total_inertia;
        let mechanical_power = (non_critical_inertia * critical.total_active_power(snapshot)
            - critical_inertia * non_critical.total_active_power(snapshot))
            / total_inertia;

        let reducer = Reducer {
            snapshot,
            trajectories,
            critical,
            non_critical,
            deviation: omib_type.deviation(),
            critical_ratio: critical_inertia / total_inertia,
            non_critical_ratio: non_critical_inertia / total_inertia,
        };

        let initial = trajectories.initial_sample();
        let pre_fault = reducer.curve(NetworkRegime::PreFault, initial);
        let during_fault = reducer.curve(NetworkRegime::DuringFault, initial);
        let post_fault = reducer.curve(NetworkRegime::PostFault, initial);

        let initial_angle = if omib_type.is_revised() {
            reducer.omib_angle(initial)
        } else {
            if pre_fault.maximum_power == 0.0 {
                return Err(EeacError::DegenerateModel(
                    "pre-fault maximum power is zero, initial angle undefined".into(),
                ));
            }
            let ratio = (mechanical_power - pre_fault.constant_power) / pre_fault.maximum_power;
            if !(-1.0..=1.0).contains(&ratio) {
                return Err(EeacError::DegenerateModel(format!(
                    "no pre-fault equilibrium: (Pm − Pc) / Pmax = {ratio:.4}"
                )));
            }
            pre_fault.angle_shift + ratio.asin()
        };

        let swing_state = if mechanical_power < during_fault.electric_power(initial_angle) {
            SwingState::Backward
        } else {
            SwingState::Forward
        };

        let mut update_angles: Vec<UpdateAngle> = [
            (NetworkRegime::PreFault, pre_fault),
            (NetworkRegime::DuringFault, during_fault),
            (NetworkRegime::PostFault, post_fault),
        ]
        .into_iter()
        .map(|(regime, curve)| UpdateAngle {
            angle: initial_angle,
            time: 0.0,
            regime,
            curve,
        })
        .collect();

        if omib_type.is_dynamic() {
            let factor = swing_state.factor();
            let mut previous = initial_angle;
            for sample in trajectories.samples().iter().skip(1) {
                let angle = reducer.omib_angle(sample);
                if factor * angle < factor * previous {
                    continue;
                }
                previous = angle;
                update_angles.push(UpdateAngle {
                    angle,
                    time: sample.time,
                    regime: sample.regime,
                    curve: reducer.curve(sample.regime, sample),
                });
            }
        }

        debug!(
            omib = %omib_type,
            inertia,
            mechanical_power,
            initial_angle,
            swing = ?swing_state,
            updates = update_angles.len(),
            "OMIB reduced"
        );

        Ok(Self {
            omib_type,
            critical: critical.clone(),
            non_critical: non_critical.clone(),
            critical_names: critical.names(snapshot),
            inertia,
            mechanical_power,
            initial_angle,
            swing_state,
            pulse: snapshot.pulse(),
            update_angles,
        })
    }

    #[inline]
    pub fn swing_factor(&self) -> f64 {
        self.swing_state.factor()
    }

    /// Every update angle, in the order they were computed.
    pub fn update_angles(&self) -> &[UpdateAngle] {
        &self.update_angles
    }

    /// Update angles of one regime, starting with its initial entry.
    pub fn regime_update_angles(&self, regime: NetworkRegime) -> impl Iterator<Item = &UpdateAngle> + '_ {
        self.update_angles.iter().filter(move |u| u.regime == regime)
    }

    /// Curve applying in `regime` at OMIB angle `angle` (initial curve for `None`).
    pub fn properties(&self, regime: NetworkRegime, angle: Option<f64>) -> CurveProperties {
        let entries: Vec<&UpdateAngle> = self.regime_update_angles(regime).collect();
        let initial = entries[0].curve;
        if regime == NetworkRegime::PreFault {
            return initial;
        }
        let Some(angle) = angle else {
            return initial;
        };
        if is_close(angle, self.initial_angle, INITIAL_ANGLE_TOLERANCE) {
            return initial;
        }
        let candidates = if regime == NetworkRegime::PostFault && entries.len() > 1 {
            &entries[1..]
        } else {
            &entries[..]
        };
        let factor = self.swing_factor();
        let position = candidates.partition_point(|u| factor * u.angle <= factor * angle);
        candidates[position.saturating_sub(1)].curve
    }

    /// Pe(δ) in the given regime.
    pub fn electric_power(&self, regime: NetworkRegime, angle: f64) -> f64 {
        self.properties(regime, Some(angle)).electric_power(angle)
    }
}
