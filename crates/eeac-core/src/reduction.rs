//! Bus-level case reduction onto generator internal nodes.
//!
//! A [`BusCase`] describes the transmission network around one fault: buses
//! with their load-flow voltages, pi-model branches, constant-admittance
//! loads and generators behind their direct transient reactance. For each
//! regime the full bus admittance matrix is assembled and Kron-reduced:
//!
//! ```text
//! Y_red = Y_gg − Y_gb · Y_bb⁻¹ · Y_bg
//! ```
//!
//! where `g` are the generator internal nodes and `b` the network buses.
//! The during-fault regime shorts the faulted bus to ground (its row and
//! column are removed); the post-fault regime opens the cleared branches.
//!
//! Complex systems are solved through their real 2n×2n embedding with a
//! dense LU factorization.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use faer::{prelude::*, solvers::PartialPivLu, Mat};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{EeacError, EeacResult};
use crate::network::{
    AdmittanceMatrix, FaultDistances, Generator, GeneratorSource, NetworkSnapshot, RegimeAdmittances,
};

fn default_base_power() -> f64 {
    100.0
}

fn default_frequency() -> f64 {
    50.0
}

fn default_voltage() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBus {
    pub name: String,
    /// Load-flow voltage magnitude (pu)
    #[serde(default = "default_voltage")]
    pub voltage_magnitude: f64,
    /// Load-flow voltage angle (rad)
    #[serde(default)]
    pub voltage_angle: f64,
}

/// Pi-model branch, all values in pu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBranch {
    pub name: String,
    pub from: String,
    pub to: String,
    pub resistance: f64,
    pub reactance: f64,
    /// Total line charging susceptance
    #[serde(default)]
    pub susceptance: f64,
}

/// Load modeled as a constant admittance at its load-flow voltage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseLoad {
    pub name: String,
    pub bus: String,
    pub active_power: f64,
    #[serde(default)]
    pub reactive_power: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseGenerator {
    pub name: String,
    pub bus: String,
    pub active_power: f64,
    #[serde(default)]
    pub reactive_power: f64,
    /// Direct transient reactance x'd (pu)
    pub transient_reactance: f64,
    /// Inertia constant H (s) on the system base
    pub inertia: f64,
    #[serde(default)]
    pub max_active_power: f64,
    #[serde(default)]
    pub source: GeneratorSource,
}

/// Bolted three-phase fault and the branches opened to clear it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFault {
    pub bus: String,
    #[serde(default)]
    pub cleared_branches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusCase {
    #[serde(default = "default_base_power")]
    pub base_power: f64,
    #[serde(default = "default_frequency")]
    pub frequency: f64,
    pub buses: Vec<CaseBus>,
    pub branches: Vec<CaseBranch>,
    #[serde(default)]
    pub loads: Vec<CaseLoad>,
    pub generators: Vec<CaseGenerator>,
    pub fault: CaseFault,
}

impl BusCase {
    pub fn from_path(path: impl AsRef<Path>) -> EeacResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Reduce the case to a [`NetworkSnapshot`] for the three regimes.
    pub fn reduce(&self) -> EeacResult<NetworkSnapshot> {
        if self.generators.is_empty() {
            return Err(EeacError::Config("case has no generator".into()));
        }
        let index: HashMap<&str, usize> = self
            .buses
            .iter()
            .enumerate()
            .map(|(i, bus)| (bus.name.as_str(), i))
            .collect();
        let bus_of = |name: &str| -> EeacResult<usize> {
            index
                .get(name)
                .copied()
                .ok_or_else(|| EeacError::Config(format!("unknown bus '{name}'")))
        };

        let fault_bus = bus_of(&self.fault.bus)?;
        let generator_buses = self
            .generators
            .iter()
            .map(|g| bus_of(&g.bus))
            .collect::<EeacResult<Vec<_>>>()?;
        let generator_admittances = self
            .generators
            .iter()
            .map(|g| {
                if g.transient_reactance <= 0.0 {
                    Err(EeacError::Config(format!(
                        "generator '{}' needs a positive transient reactance",
                        g.name
                    )))
                } else {
                    Ok(Complex64::new(0.0, g.transient_reactance).inv())
                }
            })
            .collect::<EeacResult<Vec<_>>>()?;

        let known: HashSet<&str> = self.branches.iter().map(|b| b.name.as_str()).collect();
        if let Some(unknown) = self
            .fault
            .cleared_branches
            .iter()
            .find(|name| !known.contains(name.as_str()))
        {
            return Err(EeacError::Config(format!("unknown cleared branch '{unknown}'")));
        }

        let intact = self.bus_admittance(&index, &generator_buses, &generator_admittances, &HashSet::new())?;
        let opened: HashSet<&str> = self.fault.cleared_branches.iter().map(String::as_str).collect();
        let cleared = self.bus_admittance(&index, &generator_buses, &generator_admittances, &opened)?;

        let pre_fault = kron_reduce(&intact, &generator_buses, &generator_admittances, None)?;
        let during_fault = kron_reduce(&intact, &generator_buses, &generator_admittances, Some(fault_bus))?;
        let post_fault = kron_reduce(&cleared, &generator_buses, &generator_admittances, None)?;

        let fault_distances = FaultDistances {
            pre_fault: fault_distances(&intact, &generator_buses, fault_bus)?,
            post_fault: fault_distances(&cleared, &generator_buses, fault_bus)?,
        };

        let generators = self
            .generators
            .iter()
            .zip(&generator_buses)
            .map(|(g, &bus)| {
                let emf = self.internal_emf(g, bus)?;
                Ok(Generator {
                    name: g.name.clone(),
                    bus: g.bus.clone(),
                    inertia: g.inertia,
                    internal_voltage: emf.norm(),
                    initial_angle: emf.arg(),
                    active_power: g.active_power,
                    max_active_power: g.max_active_power,
                    source: g.source,
                })
            })
            .collect::<EeacResult<Vec<_>>>()?;

        let snapshot = NetworkSnapshot {
            base_power: self.base_power,
            frequency: self.frequency,
            generators,
            regimes: RegimeAdmittances {
                pre_fault,
                during_fault,
                post_fault,
            },
            fault_distances: Some(fault_distances),
            island: None,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// E = V + j·x'd·conj(S / V)
    fn internal_emf(&self, generator: &CaseGenerator, bus: usize) -> EeacResult<Complex64> {
        let voltage = self.bus_voltage(bus);
        if voltage.norm() == 0.0 {
            return Err(EeacError::Config(format!(
                "generator '{}' is connected to a bus without voltage",
                generator.name
            )));
        }
        let power = Complex64::new(generator.active_power, generator.reactive_power);
        let current = (power / voltage).conj();
        Ok(voltage + Complex64::new(0.0, generator.transient_reactance) * current)
    }

    fn bus_voltage(&self, bus: usize) -> Complex64 {
        let b = &self.buses[bus];
        Complex64::from_polar(b.voltage_magnitude, b.voltage_angle)
    }

    /// Bus admittance matrix including loads and generator transient admittances.
    fn bus_admittance(
        &self,
        index: &HashMap<&str, usize>,
        generator_buses: &[usize],
        generator_admittances: &[Complex64],
        opened: &HashSet<&str>,
    ) -> EeacResult<Vec<Vec<Complex64>>> {
        let n = self.buses.len();
        let mut y = vec![vec![Complex64::new(0.0, 0.0); n]; n];
        for branch in &self.branches {
            if opened.contains(branch.name.as_str()) {
                continue;
            }
            let (Some(&f), Some(&t)) = (index.get(branch.from.as_str()), index.get(branch.to.as_str())) else {
                return Err(EeacError::Config(format!(
                    "branch '{}' references an unknown bus",
                    branch.name
                )));
            };
            let z = Complex64::new(branch.resistance, branch.reactance);
            if z.norm() == 0.0 {
                return Err(EeacError::Config(format!("branch '{}' has zero impedance", branch.name)));
            }
            let series = z.inv();
            let shunt = Complex64::new(0.0, branch.susceptance / 2.0);
            y[f][f] += series + shunt;
            y[t][t] += series + shunt;
            y[f][t] -= series;
            y[t][f] -= series;
        }
        for load in &self.loads {
            let bus = index
                .get(load.bus.as_str())
                .copied()
                .ok_or_else(|| EeacError::Config(format!("load '{}' references an unknown bus", load.name)))?;
            let magnitude = self.buses[bus].voltage_magnitude;
            y[bus][bus] += Complex64::new(load.active_power, -load.reactive_power) / (magnitude * magnitude);
        }
        for (&bus, &admittance) in generator_buses.iter().zip(generator_admittances) {
            y[bus][bus] += admittance;
        }
        Ok(y)
    }
}

/// Kron reduction onto the generator internal nodes, optionally shorting one bus.
fn kron_reduce(
    y_bus: &[Vec<Complex64>],
    generator_buses: &[usize],
    generator_admittances: &[Complex64],
    shorted: Option<usize>,
) -> EeacResult<AdmittanceMatrix> {
    let kept: Vec<usize> = (0..y_bus.len()).filter(|&b| Some(b) != shorted).collect();
    let position: HashMap<usize, usize> = kept.iter().enumerate().map(|(k, &b)| (b, k)).collect();
    let y_bb: Vec<Vec<Complex64>> = kept
        .iter()
        .map(|&r| kept.iter().map(|&c| y_bus[r][c]).collect())
        .collect();

    // Y_bg column of generator g holds −y_g on its terminal bus
    let y_bg: Vec<Vec<Complex64>> = generator_buses
        .iter()
        .zip(generator_admittances)
        .map(|(bus, &admittance)| {
            let mut column = vec![Complex64::new(0.0, 0.0); kept.len()];
            if let Some(&row) = position.get(bus) {
                column[row] = -admittance;
            }
            column
        })
        .collect();
    let x = solve_complex(&y_bb, &y_bg)?;

    let n = generator_buses.len();
    Ok(AdmittanceMatrix::from_fn(n, |k, l| {
        let diagonal = if k == l { generator_admittances[k] } else { Complex64::new(0.0, 0.0) };
        match position.get(&generator_buses[k]) {
            Some(&row) => diagonal + generator_admittances[k] * x[l][row],
            None => diagonal,
        }
    }))
}

/// |Z_gg| + |Z_ff| − 2|Z_gf| for each generator terminal bus g and fault bus f.
fn fault_distances(y_bus: &[Vec<Complex64>], generator_buses: &[usize], fault_bus: usize) -> EeacResult<Vec<f64>> {
    let n = y_bus.len();
    let unit = |k: usize| {
        let mut column = vec![Complex64::new(0.0, 0.0); n];
        column[k] = Complex64::new(1.0, 0.0);
        column
    };
    let mut rhs = vec![unit(fault_bus)];
    rhs.extend(generator_buses.iter().map(|&g| unit(g)));
    let z = solve_complex(y_bus, &rhs)?;
    let z_ff = z[0][fault_bus].norm();
    Ok(generator_buses
        .iter()
        .enumerate()
        .map(|(k, &g)| z[k + 1][g].norm() + z_ff - 2.0 * z[0][g].norm())
        .collect())
}

/// Solve `A·X = B` for complex `A` (rows) and right-hand sides `B` (columns).
fn solve_complex(a: &[Vec<Complex64>], rhs: &[Vec<Complex64>]) -> EeacResult<Vec<Vec<Complex64>>> {
    let n = a.len();
    if n == 0 {
        return Ok(rhs.iter().map(|_| Vec::new()).collect());
    }
    // [Re −Im; Im Re]
    let mat = Mat::from_fn(2 * n, 2 * n, |i, j| {
        let value = a[i % n][j % n];
        match (i < n, j < n) {
            (true, true) | (false, false) => value.re,
            (true, false) => -value.im,
            (false, true) => value.im,
        }
    });
    let rhs_mat = Mat::from_fn(2 * n, rhs.len(), |i, c| {
        let value = rhs[c][i % n];
        if i < n {
            value.re
        } else {
            value.im
        }
    });
    let lu = PartialPivLu::new(mat.as_ref());
    let sol = lu.solve(&rhs_mat);

    let mut columns = Vec::with_capacity(rhs.len());
    for c in 0..rhs.len() {
        let column: Vec<Complex64> = (0..n)
            .map(|i| Complex64::new(sol.read(i, c), sol.read(i + n, c)))
            .collect();
        if column.iter().any(|v| !v.re.is_finite() || !v.im.is_finite()) {
            return Err(EeacError::DegenerateModel(
                "singular network admittance matrix (isolated bus or component?)".into(),
            ));
        }
        columns.push(column);
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// G1 - B1 = (two lines) = B2 - G2, fault at B1, one circuit cleared.
    fn case() -> BusCase {
        BusCase {
            base_power: 100.0,
            frequency: 50.0,
            buses: vec![
                CaseBus {
                    name: "B1".into(),
                    voltage_magnitude: 1.0,
                    voltage_angle: 0.2,
                },
                CaseBus {
                    name: "B2".into(),
                    voltage_magnitude: 1.0,
                    voltage_angle: 0.0,
                },
            ],
            branches: vec![
                CaseBranch {
                    name: "L1".into(),
                    from: "B1".into(),
                    to: "B2".into(),
                    resistance: 0.0,
                    reactance: 0.4,
                    susceptance: 0.0,
                },
                CaseBranch {
                    name: "L2".into(),
                    from: "B1".into(),
                    to: "B2".into(),
                    resistance: 0.0,
                    reactance: 0.4,
                    susceptance: 0.0,
                },
            ],
            loads: vec![],
            generators: vec![
                CaseGenerator {
                    name: "G1".into(),
                    bus: "B1".into(),
                    active_power: 0.9,
                    reactive_power: 0.1,
                    transient_reactance: 0.3,
                    inertia: 4.0,
                    max_active_power: 1.0,
                    source: GeneratorSource::Thermal,
                },
                CaseGenerator {
                    name: "G2".into(),
                    bus: "B2".into(),
                    active_power: -0.9,
                    reactive_power: 0.0,
                    transient_reactance: 0.1,
                    inertia: 50.0,
                    max_active_power: 10.0,
                    source: GeneratorSource::Other,
                },
            ],
            fault: CaseFault {
                bus: "B1".into(),
                cleared_branches: vec!["L2".into()],
            },
        }
    }

    fn transfer_susceptance(matrix: &AdmittanceMatrix) -> f64 {
        matrix.get(0, 1).im
    }

    #[test]
    fn test_series_reactances_reduce_to_transfer_admittance() {
        let snapshot = case().reduce().unwrap();
        // Pre-fault: 0.3 + 0.4/2 + 0.1 in series
        assert!((transfer_susceptance(&snapshot.regimes.pre_fault) - 1.0 / 0.6).abs() < 1e-9);
        // Post-fault: one circuit left
        assert!((transfer_susceptance(&snapshot.regimes.post_fault) - 1.0 / 0.8).abs() < 1e-9);
        // Bolted fault on B1 isolates G1 from G2
        assert!(transfer_susceptance(&snapshot.regimes.during_fault).abs() < 1e-12);
        assert!((snapshot.regimes.during_fault.get(0, 0).im + 1.0 / 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_internal_emf_leads_terminal_voltage() {
        let snapshot = case().reduce().unwrap();
        let g1 = &snapshot.generators[0];
        // E = V + j x'd conj(S/V) with V = 1∠0.2
        let v = Complex64::from_polar(1.0, 0.2);
        let e = v + Complex64::new(0.0, 0.3) * (Complex64::new(0.9, 0.1) / v).conj();
        assert!((g1.internal_voltage - e.norm()).abs() < 1e-12);
        assert!((g1.initial_angle - e.arg()).abs() < 1e-12);
        assert!(g1.initial_angle > 0.2);
    }

    #[test]
    fn test_fault_distance_is_zero_at_faulted_bus() {
        let snapshot = case().reduce().unwrap();
        let distances = snapshot.fault_distances.unwrap();
        assert!(distances.pre_fault[0].abs() < 1e-9);
        assert!(distances.pre_fault[1] > 0.0);
        assert!(distances.post_fault[1] > distances.pre_fault[1]);
    }

    #[test]
    fn test_unknown_cleared_branch_is_rejected() {
        let mut case = case();
        case.fault.cleared_branches = vec!["L9".into()];
        assert!(matches!(case.reduce(), Err(EeacError::Config(_))));
    }

    #[test]
    fn test_isolated_bus_is_degenerate() {
        let mut case = case();
        case.buses.push(CaseBus {
            name: "B3".into(),
            voltage_magnitude: 1.0,
            voltage_angle: 0.0,
        });
        assert!(matches!(case.reduce(), Err(EeacError::DegenerateModel(_))));
    }
}
