use std::fs;

use eeac_core::{BusCase, EeacError, GeneratorCluster, GeneratorTrajectories, NetworkRegime, NetworkSnapshot};
use tempfile::tempdir;

const CASE: &str = r#"{
    "buses": [
        {"name": "B1", "voltage_magnitude": 1.0, "voltage_angle": 0.2},
        {"name": "B2"}
    ],
    "branches": [
        {"name": "L1", "from": "B1", "to": "B2", "resistance": 0.0, "reactance": 0.4},
        {"name": "L2", "from": "B1", "to": "B2", "resistance": 0.0, "reactance": 0.4}
    ],
    "generators": [
        {"name": "G1", "bus": "B1", "active_power": 0.9, "reactive_power": 0.1,
         "transient_reactance": 0.3, "inertia": 4.0, "max_active_power": 1.0, "source": "THERMAL"},
        {"name": "G2", "bus": "B2", "active_power": -0.9,
         "transient_reactance": 0.1, "inertia": 50.0, "max_active_power": 10.0}
    ],
    "fault": {"bus": "B1", "cleared_branches": ["L2"]}
}"#;

#[test]
fn test_case_file_reduces_to_a_loadable_snapshot() {
    let dir = tempdir().unwrap();
    let case_path = dir.path().join("case.json");
    fs::write(&case_path, CASE).unwrap();

    let case = BusCase::from_path(&case_path).unwrap();
    assert_eq!(case.base_power, 100.0);
    let snapshot = case.reduce().unwrap();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.fault_distances.is_some());

    let snapshot_path = dir.path().join("snapshot.json");
    fs::write(&snapshot_path, serde_json::to_string_pretty(&snapshot).unwrap()).unwrap();
    let reloaded = NetworkSnapshot::from_path(&snapshot_path).unwrap();
    assert_eq!(reloaded.generators.len(), snapshot.generators.len());
    for regime in NetworkRegime::ALL {
        let (a, b) = (reloaded.admittance(regime), snapshot.admittance(regime));
        for i in 0..2 {
            for j in 0..2 {
                assert!((a.get(i, j) - b.get(i, j)).norm() < 1e-12);
            }
        }
    }

    // The faulted machine only sees its own shunt during the fault
    let g1 = reloaded.generator_id("G1").unwrap();
    let g2 = reloaded.generator_id("G2").unwrap();
    let angles = reloaded.initial_angles();
    assert!(reloaded.electric_power(NetworkRegime::DuringFault, g1, &angles).abs() < 1e-9);
    assert!(reloaded.electric_power(NetworkRegime::PreFault, g1, &angles) > 0.0);

    let critical = GeneratorCluster::new([g1]);
    assert_eq!(critical.complement(&reloaded).members(), &[g2]);
    let trajectories = GeneratorTrajectories::initial(&reloaded);
    assert!(trajectories.is_initial_only());
}

#[test]
fn test_snapshot_errors_are_classified() {
    let dir = tempdir().unwrap();

    let missing = dir.path().join("missing.json");
    assert!(matches!(NetworkSnapshot::from_path(&missing), Err(EeacError::Io(_))));

    let truncated = dir.path().join("truncated.json");
    fs::write(&truncated, "{\"generators\": [").unwrap();
    assert!(matches!(NetworkSnapshot::from_path(&truncated), Err(EeacError::Parse(_))));

    let empty = dir.path().join("empty.json");
    fs::write(
        &empty,
        r#"{"generators": [], "regimes": {"pre_fault": [], "during_fault": [], "post_fault": []}}"#,
    )
    .unwrap();
    assert!(matches!(NetworkSnapshot::from_path(&empty), Err(EeacError::Validation(_))));
}
