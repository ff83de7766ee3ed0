//! Network snapshot handed to the EEAC engine for one fault case.
//!
//! A [`NetworkSnapshot`] holds the synchronous generators and, for each
//! [`NetworkRegime`], the admittance matrix reduced onto the generator
//! internal nodes. The snapshot is read-only during a run and is shared
//! between concurrent branches through an `Arc`.

use std::collections::HashSet;
use std::f64::consts::PI;
use std::fmt;
use std::path::Path;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{EeacError, EeacResult};
use crate::GeneratorId;

/// Network regime around the fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkRegime {
    PreFault,
    DuringFault,
    PostFault,
}

impl NetworkRegime {
    pub const ALL: [NetworkRegime; 3] = [
        NetworkRegime::PreFault,
        NetworkRegime::DuringFault,
        NetworkRegime::PostFault,
    ];
}

impl fmt::Display for NetworkRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NetworkRegime::PreFault => "PRE_FAULT",
            NetworkRegime::DuringFault => "DURING_FAULT",
            NetworkRegime::PostFault => "POST_FAULT",
        };
        f.write_str(label)
    }
}

/// Primary energy source of a generator, used by TSO-specific filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneratorSource {
    Nuclear,
    Hydro,
    Thermal,
    Wind,
    Solar,
    #[default]
    Other,
}

/// Synchronous generator as seen from its internal node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub name: String,
    /// Name of the terminal bus
    #[serde(default)]
    pub bus: String,
    /// Inertia constant H (s) on the system base
    pub inertia: f64,
    /// Internal EMF magnitude |E| (pu)
    pub internal_voltage: f64,
    /// Rotor angle in the pre-fault steady state (rad)
    pub initial_angle: f64,
    /// Active (and mechanical) power output (pu)
    pub active_power: f64,
    /// Rated active power (pu)
    #[serde(default)]
    pub max_active_power: f64,
    #[serde(default)]
    pub source: GeneratorSource,
}

impl Generator {
    /// Inertia coefficient M = 2H.
    #[inline]
    pub fn inertia_coefficient(&self) -> f64 {
        2.0 * self.inertia
    }
}

/// Dense square admittance matrix between generator internal nodes.
///
/// Serialized as nested rows of `[re, im]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Complex64>>", into = "Vec<Vec<Complex64>>")]
pub struct AdmittanceMatrix {
    size: usize,
    entries: Vec<Complex64>,
}

impl AdmittanceMatrix {
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            entries: vec![Complex64::new(0.0, 0.0); size * size],
        }
    }

    pub fn from_fn(size: usize, f: impl Fn(usize, usize) -> Complex64) -> Self {
        let mut entries = Vec::with_capacity(size * size);
        for i in 0..size {
            for j in 0..size {
                entries.push(f(i, j));
            }
        }
        Self { size, entries }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> Complex64 {
        self.entries[i * self.size + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: Complex64) {
        self.entries[i * self.size + j] = value;
    }

    /// Modulus and phase of `Y[i][j]`.
    #[inline]
    pub fn polar(&self, i: usize, j: usize) -> (f64, f64) {
        self.get(i, j).to_polar()
    }

    fn is_finite(&self) -> bool {
        self.entries.iter().all(|y| y.re.is_finite() && y.im.is_finite())
    }
}

impl TryFrom<Vec<Vec<Complex64>>> for AdmittanceMatrix {
    type Error = String;

    fn try_from(rows: Vec<Vec<Complex64>>) -> Result<Self, Self::Error> {
        let size = rows.len();
        if let Some(bad) = rows.iter().position(|row| row.len() != size) {
            return Err(format!(
                "admittance matrix is not square: row {bad} has {} entries, expected {size}",
                rows[bad].len()
            ));
        }
        Ok(Self {
            size,
            entries: rows.into_iter().flatten().collect(),
        })
    }
}

impl From<AdmittanceMatrix> for Vec<Vec<Complex64>> {
    fn from(matrix: AdmittanceMatrix) -> Self {
        matrix
            .entries
            .chunks(matrix.size.max(1))
            .take(matrix.size)
            .map(|row| row.to_vec())
            .collect()
    }
}

/// Reduced admittance matrices for the three regimes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeAdmittances {
    pub pre_fault: AdmittanceMatrix,
    pub during_fault: AdmittanceMatrix,
    pub post_fault: AdmittanceMatrix,
}

impl RegimeAdmittances {
    pub fn get(&self, regime: NetworkRegime) -> &AdmittanceMatrix {
        match regime {
            NetworkRegime::PreFault => &self.pre_fault,
            NetworkRegime::DuringFault => &self.during_fault,
            NetworkRegime::PostFault => &self.post_fault,
        }
    }
}

/// Electrical distance of each generator to the fault location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultDistances {
    pub pre_fault: Vec<f64>,
    pub post_fault: Vec<f64>,
}

/// Generation and load isolated from the main component after clearing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IslandSummary {
    /// Isolated production (MW)
    pub production: f64,
    /// Isolated consumption (MW)
    pub consumption: f64,
    #[serde(default)]
    pub generators: Vec<String>,
    #[serde(default)]
    pub loads: Vec<String>,
}

fn default_base_power() -> f64 {
    100.0
}

fn default_frequency() -> f64 {
    50.0
}

/// Immutable network state for one fault case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    /// System base power (MVA)
    #[serde(default = "default_base_power")]
    pub base_power: f64,
    /// Nominal frequency (Hz)
    #[serde(default = "default_frequency")]
    pub frequency: f64,
    pub generators: Vec<Generator>,
    pub regimes: RegimeAdmittances,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_distances: Option<FaultDistances>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub island: Option<IslandSummary>,
}

impl NetworkSnapshot {
    /// Parse and validate a snapshot from JSON text.
    pub fn from_json_str(json: &str) -> EeacResult<Self> {
        let snapshot: NetworkSnapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Load and validate a snapshot from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> EeacResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Check sizes, finiteness and name uniqueness.
    pub fn validate(&self) -> EeacResult<()> {
        let n = self.generators.len();
        if n == 0 {
            return Err(EeacError::Validation(vec!["network has no generator".into()]));
        }
        let mut issues = Vec::new();
        if !(self.base_power > 0.0) {
            issues.push(format!("base power must be positive, got {}", self.base_power));
        }
        if !(self.frequency > 0.0) {
            issues.push(format!("frequency must be positive, got {}", self.frequency));
        }

        let mut names = HashSet::new();
        for generator in &self.generators {
            if !names.insert(generator.name.as_str()) {
                issues.push(format!("duplicate generator name '{}'", generator.name));
            }
            if !(generator.inertia >= 0.0) {
                issues.push(format!("generator '{}' has negative inertia", generator.name));
            }
            let values = [
                generator.internal_voltage,
                generator.initial_angle,
                generator.active_power,
                generator.max_active_power,
            ];
            if values.iter().any(|v| !v.is_finite()) {
                issues.push(format!("generator '{}' has non-finite values", generator.name));
            }
        }

        for regime in NetworkRegime::ALL {
            let matrix = self.regimes.get(regime);
            if matrix.size() != n {
                issues.push(format!(
                    "{regime} admittance matrix has size {}, expected {n}",
                    matrix.size()
                ));
            } else if !matrix.is_finite() {
                issues.push(format!("{regime} admittance matrix has non-finite entries"));
            }
        }

        if let Some(distances) = &self.fault_distances {
            if distances.pre_fault.len() != n || distances.post_fault.len() != n {
                issues.push(format!("fault distances must have one entry per generator ({n})"));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(EeacError::Validation(issues))
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Angular pulsation 2πf (rad/s).
    #[inline]
    pub fn pulse(&self) -> f64 {
        2.0 * PI * self.frequency
    }

    #[inline]
    pub fn generator(&self, id: GeneratorId) -> &Generator {
        &self.generators[id.value()]
    }

    pub fn generator_ids(&self) -> impl Iterator<Item = GeneratorId> + '_ {
        (0..self.generators.len()).map(GeneratorId::new)
    }

    pub fn generator_id(&self, name: &str) -> Option<GeneratorId> {
        self.generators
            .iter()
            .position(|g| g.name == name)
            .map(GeneratorId::new)
    }

    #[inline]
    pub fn admittance(&self, regime: NetworkRegime) -> &AdmittanceMatrix {
        self.regimes.get(regime)
    }

    /// |E_i|·|E_j|
    #[inline]
    pub fn voltage_product(&self, i: GeneratorId, j: GeneratorId) -> f64 {
        self.generator(i).internal_voltage * self.generator(j).internal_voltage
    }

    /// Initial rotor angles, indexed by generator.
    pub fn initial_angles(&self) -> Vec<f64> {
        self.generators.iter().map(|g| g.initial_angle).collect()
    }

    /// Power coupling matrices a_ij = E_iE_j|Y_ij|cos(δi − δj − θij) and
    /// b_ij = E_iE_j|Y_ij|sin(δi − δj − θij) for the given rotor angles.
    pub fn coupling_matrices(&self, regime: NetworkRegime, angles: &[f64]) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let n = self.len();
        let y = self.admittance(regime);
        let mut a = vec![vec![0.0; n]; n];
        let mut b = vec![vec![0.0; n]; n];
        for i in 0..n {
            let ei = self.generators[i].internal_voltage;
            for j in 0..n {
                let (modulus, phase) = y.polar(i, j);
                let amplitude = ei * self.generators[j].internal_voltage * modulus;
                let angle = angles[i] - angles[j] - phase;
                a[i][j] = amplitude * angle.cos();
                b[i][j] = amplitude * angle.sin();
            }
        }
        (a, b)
    }

    /// Electric power delivered by generator `i` in a regime, for the given rotor angles.
    pub fn electric_power(&self, regime: NetworkRegime, i: GeneratorId, angles: &[f64]) -> f64 {
        let y = self.admittance(regime);
        let ei = self.generator(i).internal_voltage;
        let idx = i.value();
        (0..self.len())
            .map(|j| {
                let (modulus, phase) = y.polar(idx, j);
                ei * self.generators[j].internal_voltage * modulus * (angles[idx] - angles[j] - phase).cos()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_machine() -> NetworkSnapshot {
        let line = AdmittanceMatrix::from_fn(2, |i, j| {
            if i == j {
                Complex64::new(0.0, -2.0)
            } else {
                Complex64::new(0.0, 2.0)
            }
        });
        NetworkSnapshot {
            base_power: 100.0,
            frequency: 50.0,
            generators: vec![
                Generator {
                    name: "G1".into(),
                    bus: "B1".into(),
                    inertia: 3.0,
                    internal_voltage: 1.1,
                    initial_angle: 0.4,
                    active_power: 0.8,
                    max_active_power: 1.0,
                    source: GeneratorSource::Thermal,
                },
                Generator {
                    name: "G2".into(),
                    bus: "B2".into(),
                    inertia: 500.0,
                    internal_voltage: 1.0,
                    initial_angle: 0.0,
                    active_power: -0.8,
                    max_active_power: 10.0,
                    source: GeneratorSource::Other,
                },
            ],
            regimes: RegimeAdmittances {
                pre_fault: line.clone(),
                during_fault: AdmittanceMatrix::zeros(2),
                post_fault: line,
            },
            fault_distances: None,
            island: None,
        }
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let snapshot = two_machine();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed = NetworkSnapshot::from_json_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_rejects_non_square_matrix() {
        let json = r#"{
            "generators": [],
            "regimes": {
                "pre_fault": [[[0.0, 1.0], [0.0, 1.0]], [[0.0, 1.0]]],
                "during_fault": [],
                "post_fault": []
            }
        }"#;
        assert!(NetworkSnapshot::from_json_str(json).is_err());
    }

    #[test]
    fn test_validate_collects_issues() {
        let mut snapshot = two_machine();
        snapshot.generators[1].name = "G1".into();
        snapshot.regimes.during_fault = AdmittanceMatrix::zeros(3);
        match snapshot.validate() {
            Err(EeacError::Validation(issues)) => assert_eq!(issues.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_electric_power_matches_classical_formula() {
        let snapshot = two_machine();
        let angles = snapshot.initial_angles();
        let pe = snapshot.electric_power(NetworkRegime::PreFault, GeneratorId::new(0), &angles);
        // E1·E2·B·sin(δ12) with a lossless line and no self conductance
        let expected = 1.1 * 1.0 * 2.0 * 0.4_f64.sin();
        assert!((pe - expected).abs() < 1e-12);
        assert_eq!(
            snapshot.electric_power(NetworkRegime::DuringFault, GeneratorId::new(0), &angles),
            0.0
        );
    }

    #[test]
    fn test_coupling_matrices_are_consistent_with_electric_power() {
        let snapshot = two_machine();
        let angles = snapshot.initial_angles();
        let (a, _) = snapshot.coupling_matrices(NetworkRegime::PostFault, &angles);
        let row_sum: f64 = a[0].iter().sum();
        let pe = snapshot.electric_power(NetworkRegime::PostFault, GeneratorId::new(0), &angles);
        assert!((row_sum - pe).abs() < 1e-12);
    }

    #[test]
    fn test_pulse_and_lookup() {
        let snapshot = two_machine();
        assert!((snapshot.pulse() - 100.0 * PI).abs() < 1e-12);
        assert_eq!(snapshot.generator_id("G2"), Some(GeneratorId::new(1)));
        assert_eq!(snapshot.generator_id("G9"), None);
        assert_eq!(snapshot.generator(GeneratorId::new(0)).inertia_coefficient(), 6.0);
    }
}
