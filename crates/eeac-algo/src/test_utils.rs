//! Small reference networks shared by unit and integration tests.

use eeac_core::{
    AdmittanceMatrix, FaultDistances, Generator, GeneratorSource, NetworkSnapshot, RegimeAdmittances,
};
use num_complex::Complex64;

/// Admittance of a lossless tie of reactance `x` between two internal nodes.
fn tie(x: Option<f64>) -> AdmittanceMatrix {
    let b = x.map_or(0.0, |x| 1.0 / x);
    AdmittanceMatrix::from_fn(2, |i, j| {
        if i == j {
            Complex64::new(0.0, -b)
        } else {
            Complex64::new(0.0, b)
        }
    })
}

/// Machine G1 (H = 3 s, |E| = 1.1, P = 0.8) against a large machine G2
/// (H = 1000 s, |E| = 1.0) through lossless ties of reactance `x_pre`,
/// `x_during` (`None` = bolted fault at the G1 terminal) and `x_post`.
pub fn two_machine_snapshot(x_pre: f64, x_during: Option<f64>, x_post: f64) -> NetworkSnapshot {
    let pmax = 1.1 / x_pre;
    NetworkSnapshot {
        base_power: 100.0,
        frequency: 50.0,
        generators: vec![
            Generator {
                name: "G1".into(),
                bus: "B1".into(),
                inertia: 3.0,
                internal_voltage: 1.1,
                initial_angle: (0.8 / pmax).asin(),
                active_power: 0.8,
                max_active_power: 1.0,
                source: GeneratorSource::Thermal,
            },
            Generator {
                name: "G2".into(),
                bus: "B2".into(),
                inertia: 1000.0,
                internal_voltage: 1.0,
                initial_angle: 0.0,
                active_power: -0.8,
                max_active_power: 10.0,
                source: GeneratorSource::Other,
            },
        ],
        regimes: RegimeAdmittances {
            pre_fault: tie(Some(x_pre)),
            during_fault: tie(x_during),
            post_fault: tie(Some(x_post)),
        },
        fault_distances: None,
        island: None,
    }
}

/// Four machines at rest; a bolted fault isolates G1 (P = 0.9) while G2-G4
/// (P = 0.1 each) stay meshed.
pub fn four_machine_snapshot() -> NetworkSnapshot {
    let generator = |name: &str, power: f64, pmax: f64, source: GeneratorSource| Generator {
        name: name.into(),
        bus: format!("B{}", &name[1..]),
        inertia: 4.0,
        internal_voltage: 1.0,
        initial_angle: 0.0,
        active_power: power,
        max_active_power: pmax,
        source,
    };
    let mesh = |coupling: &dyn Fn(usize, usize) -> f64| {
        AdmittanceMatrix::from_fn(4, |i, j| {
            if i == j {
                let total: f64 = (0..4).filter(|&k| k != i).map(|k| coupling(i, k)).sum();
                Complex64::new(0.0, -(total + 1.0 / 0.3))
            } else {
                Complex64::new(0.0, coupling(i, j))
            }
        })
    };
    NetworkSnapshot {
        base_power: 100.0,
        frequency: 50.0,
        generators: vec![
            generator("G1", 0.9, 1.0, GeneratorSource::Nuclear),
            generator("G2", 0.1, 0.5, GeneratorSource::Hydro),
            generator("G3", 0.1, 1.0, GeneratorSource::Thermal),
            generator("G4", 0.1, 2.0, GeneratorSource::Hydro),
        ],
        regimes: RegimeAdmittances {
            pre_fault: mesh(&|_, _| 2.0),
            during_fault: mesh(&|i, j| if i == 0 || j == 0 { 0.0 } else { 2.0 }),
            post_fault: mesh(&|i, j| if i == 0 || j == 0 { 1.0 } else { 2.0 }),
        },
        fault_distances: Some(FaultDistances {
            pre_fault: vec![0.0, 0.2, 0.25, 0.3],
            post_fault: vec![0.0, 0.25, 0.3, 0.35],
        }),
        island: None,
    }
}
