//! Fault-case batches: one tree executed against many snapshots.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use eeac_core::{IslandSummary, NetworkSnapshot};
use itertools::Itertools;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::omib::StabilityState;
use crate::tree::{CriticalResult, ExecutionReport, ExecutionTree, TreeExecutor};

/// File name of the fault summary inside the output directory.
pub const RESULTS_FILE: &str = "critical_cluster_results.json";
const MANIFEST_FILE: &str = "batch_manifest.json";
const REPORT_FILE: &str = "report.json";

/// A named fault and the network it produces.
#[derive(Debug, Clone)]
pub struct FaultCase {
    pub name: String,
    source: CaseSource,
}

#[derive(Debug, Clone)]
enum CaseSource {
    Snapshot(Arc<NetworkSnapshot>),
    /// Loading or reduction failed before execution
    Unavailable(String),
}

impl FaultCase {
    pub fn new(name: impl Into<String>, snapshot: NetworkSnapshot) -> Self {
        Self {
            name: name.into(),
            source: CaseSource::Snapshot(Arc::new(snapshot)),
        }
    }

    /// A fault whose network could not be built; it is reported as an error.
    pub fn unavailable(name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            name: name.into(),
            source: CaseSource::Unavailable(error.to_string()),
        }
    }

    pub fn snapshot(&self) -> Option<&NetworkSnapshot> {
        match &self.source {
            CaseSource::Snapshot(snapshot) => Some(snapshot.as_ref()),
            CaseSource::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Worker threads, 0 = one per CPU
    pub cores: usize,
    pub output_dir: Option<PathBuf>,
    /// Summary path overriding `<output_dir>/critical_cluster_results.json`
    pub json_results: Option<PathBuf>,
    /// Tolerated islanded production (MW)
    pub island_threshold: f64,
    /// Allow writing into an existing output directory
    pub rewrite: bool,
    /// Turn failed candidates into a failure of the whole fault
    pub warn: bool,
    /// Log the displayed node reports of every fault
    pub verbose: bool,
}

/// Per-fault line of the batch manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultCaseRecord {
    pub fault: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchManifest {
    pub created_at: DateTime<Utc>,
    pub tree: String,
    pub num_cases: usize,
    pub cases: Vec<FaultCaseRecord>,
}

pub struct BatchSummary {
    /// Summary entry of every fault, keyed by fault name
    pub results: BTreeMap<String, Value>,
    pub records: Vec<FaultCaseRecord>,
    pub results_path: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
}

fn islanding(island: &IslandSummary) -> Value {
    json!({
        "status": "Islanding",
        "production_loss": format!("{}MW", round2(island.production)),
        "disconnected_production": island.generators.join(", "),
        "consumption_loss": format!("{}MW", round2(island.consumption)),
        "disconnected_consumption": island.loads.join(", "),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Summary entry of one executed fault.
pub fn summarize(report: &ExecutionReport, warn_is_failure: bool) -> Value {
    let warning = (!report.warnings.is_empty()).then(|| report.warnings.join("; "));
    if warn_is_failure {
        if let Some(warning) = &warning {
            return json!({
                "status": "COMPUTATION_FAILURE",
                "failure_report": format!("{warning}. Failure is global because of --warn option."),
            });
        }
    }

    let mut entry = match report.critical_result() {
        Some(CriticalResult::Selected {
            node_id,
            stability_state,
            swing_state,
            critical_cluster,
            critical_time,
        }) => {
            let mut names = critical_cluster.clone();
            names.sort();
            let mut entry = json!({
                "status": stability_state,
                "swing_state": swing_state,
                "critical_cluster": names.join(", "),
                "node_id": node_id,
            });
            if let (StabilityState::PotentiallyStable, Some(time)) = (stability_state, critical_time) {
                entry["CCT"] = json!(round2(time * 1000.0));
            }
            entry
        }
        Some(CriticalResult::Failed { .. }) => json!({"status": "failed"}),
        Some(CriticalResult::Cancelled { .. }) => json!({"status": "cancelled"}),
        None => json!({"status": "failed"}),
    };
    if let Some(warning) = warning {
        entry["warning"] = json!(warning);
    }
    entry
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("serializing results to JSON")?;
    fs::write(path, json).with_context(|| format!("writing '{}'", path.display()))?;
    Ok(())
}

/// Execute `tree` on every fault case in a dedicated pool.
pub fn run_fault_cases(cases: &[FaultCase], tree: &ExecutionTree, config: &RunConfig) -> Result<BatchSummary> {
    if let Some(duplicate) = cases.iter().map(|case| &case.name).duplicates().next() {
        bail!("fault '{duplicate}' is given more than once");
    }
    if let Some(dir) = &config.output_dir {
        if dir.exists() && !config.rewrite {
            bail!(
                "output directory '{}' already exists, use the rewrite option to overwrite it",
                dir.display()
            );
        }
        fs::create_dir_all(dir).with_context(|| format!("creating output directory '{}'", dir.display()))?;
    }

    let thread_count = if config.cores == 0 {
        num_cpus::get()
    } else {
        config.cores
    };
    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .context("building Rayon thread pool for fault cases")?;

    let outcomes: Vec<(Value, FaultCaseRecord)> =
        pool.install(|| cases.par_iter().map(|case| run_case(case, tree, config)).collect());

    let mut results = BTreeMap::new();
    let mut records = Vec::with_capacity(outcomes.len());
    for (result, record) in outcomes {
        results.insert(record.fault.clone(), result);
        records.push(record);
    }
    records.sort_by(|a, b| a.fault.cmp(&b.fault));

    let results_path = config
        .json_results
        .clone()
        .or_else(|| config.output_dir.as_ref().map(|dir| dir.join(RESULTS_FILE)));
    if let Some(path) = &results_path {
        write_json(path, &results)?;
        info!(path = %path.display(), faults = results.len(), "fault summary written");
    }

    let manifest_path = config.output_dir.as_ref().map(|dir| dir.join(MANIFEST_FILE));
    if let Some(path) = &manifest_path {
        let manifest = BatchManifest {
            created_at: Utc::now(),
            tree: tree.name.clone(),
            num_cases: records.len(),
            cases: records.clone(),
        };
        write_json(path, &manifest)?;
    }

    Ok(BatchSummary {
        results,
        records,
        results_path,
        manifest_path,
    })
}

fn run_case(case: &FaultCase, tree: &ExecutionTree, config: &RunConfig) -> (Value, FaultCaseRecord) {
    let start = web_time::Instant::now();
    let mut record = FaultCaseRecord {
        fault: case.name.clone(),
        status: String::new(),
        report: None,
        error: None,
        elapsed_ms: 0.0,
    };

    let result = match evaluate_case(case, tree, config) {
        Ok(CaseOutcome::Island(island)) => {
            warn!(
                fault = %case.name,
                production = island.production,
                threshold = config.island_threshold,
                "islanding over threshold, execution skipped"
            );
            record.status = "islanding".into();
            islanding(island)
        }
        Ok(CaseOutcome::Executed(entry, report_path)) => {
            record.status = "ok".into();
            record.report = report_path.map(|path| path.display().to_string());
            entry
        }
        Err(err) => {
            warn!(fault = %case.name, error = %err, "fault case failed");
            record.status = "error".into();
            record.error = Some(format!("{err:#}"));
            json!({"status": "Error", "error_msg": format!("{err:#}")})
        }
    };
    record.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    (result, record)
}

enum CaseOutcome<'a> {
    Island(&'a IslandSummary),
    Executed(Value, Option<PathBuf>),
}

fn evaluate_case<'a>(case: &'a FaultCase, tree: &ExecutionTree, config: &RunConfig) -> Result<CaseOutcome<'a>> {
    let snapshot = match &case.source {
        CaseSource::Snapshot(snapshot) => snapshot.as_ref(),
        CaseSource::Unavailable(error) => bail!("network for fault '{}' is unavailable: {error}", case.name),
    };
    snapshot
        .validate()
        .with_context(|| format!("invalid network for fault '{}'", case.name))?;
    if let Some(island) = &snapshot.island {
        if island.production > config.island_threshold {
            return Ok(CaseOutcome::Island(island));
        }
        if island.production > 0.0 {
            info!(
                fault = %case.name,
                production = island.production,
                "islanding below threshold, execution carried on"
            );
        }
    }

    let report = TreeExecutor::new(tree, snapshot).run();
    if config.verbose {
        info!(fault = %case.name, "\n{}", report.render_displayed());
    }

    let report_path = match &config.output_dir {
        Some(dir) => {
            let path = dir.join(&case.name).join(REPORT_FILE);
            write_json(&path, &report)?;
            Some(path)
        }
        None => None,
    };
    Ok(CaseOutcome::Executed(summarize(&report, config.warn), report_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::two_machine_snapshot;
    use crate::tree::tests_support::REFERENCE_TREE;
    use tempfile::tempdir;

    fn cases() -> Vec<FaultCase> {
        vec![
            FaultCase::new("fault_b", two_machine_snapshot(0.5, None, 0.5)),
            FaultCase::new("fault_a", two_machine_snapshot(0.5, None, 2.0)),
        ]
    }

    #[test]
    fn test_batch_writes_summary_and_reports() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out");
        let tree = ExecutionTree::from_json_str(REFERENCE_TREE).unwrap();
        let config = RunConfig {
            cores: 2,
            output_dir: Some(output.clone()),
            ..RunConfig::default()
        };
        let summary = run_fault_cases(&cases(), &tree, &config).unwrap();

        let names: Vec<&String> = summary.results.keys().collect();
        assert_eq!(names, vec!["fault_a", "fault_b"]);
        let stable = &summary.results["fault_b"];
        assert_eq!(stable["status"], "POTENTIALLY_STABLE");
        assert_eq!(stable["critical_cluster"], "G1");
        assert!(stable["CCT"].as_f64().unwrap() > 50.0);
        assert_eq!(summary.results["fault_a"]["status"], "UNSTABLE");
        assert!(summary.results["fault_a"].get("CCT").is_none());

        assert!(output.join(RESULTS_FILE).exists());
        assert!(output.join("fault_b").join(REPORT_FILE).exists());
        let manifest: BatchManifest =
            serde_json::from_str(&fs::read_to_string(output.join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(manifest.num_cases, 2);
        assert_eq!(manifest.cases[0].fault, "fault_a");

        // Existing output needs the rewrite option
        assert!(run_fault_cases(&cases(), &tree, &config).is_err());
        let rewrite = RunConfig { rewrite: true, ..config };
        assert!(run_fault_cases(&cases(), &tree, &rewrite).is_ok());
    }

    #[test]
    fn test_islanding_and_invalid_networks() {
        let tree = ExecutionTree::from_json_str(REFERENCE_TREE).unwrap();
        let mut island = two_machine_snapshot(0.5, None, 0.5);
        island.island = Some(IslandSummary {
            production: 120.456,
            consumption: 30.0,
            generators: vec!["G3".into(), "G4".into()],
            loads: vec!["L1".into()],
        });
        let mut invalid = two_machine_snapshot(0.5, None, 0.5);
        invalid.generators.pop();
        let cases = vec![
            FaultCase::new("island", island),
            FaultCase::new("invalid", invalid),
            FaultCase::unavailable("degenerate", "Degenerate model: singular bus admittance matrix"),
        ];
        let config = RunConfig {
            cores: 1,
            island_threshold: 100.0,
            ..RunConfig::default()
        };
        let summary = run_fault_cases(&cases, &tree, &config).unwrap();

        let island = &summary.results["island"];
        assert_eq!(island["status"], "Islanding");
        assert_eq!(island["production_loss"], "120.46MW");
        assert_eq!(island["disconnected_production"], "G3, G4");
        let invalid = &summary.results["invalid"];
        assert_eq!(invalid["status"], "Error");
        assert!(invalid["error_msg"].as_str().unwrap().contains("invalid network"));
        let degenerate = &summary.results["degenerate"];
        assert_eq!(degenerate["status"], "Error");
        assert!(degenerate["error_msg"].as_str().unwrap().contains("singular"));
        assert_eq!(summary.records.iter().filter(|r| r.status == "error").count(), 2);
        assert!(summary.results_path.is_none());
    }

    #[test]
    fn test_warnings_follow_warn_option() {
        let report = ExecutionReport {
            tree: "t".into(),
            elapsed_ms: 1.0,
            nodes: BTreeMap::new(),
            critical_results: vec![CriticalResult::Selected {
                node_id: crate::tree::NodeKey::Number(2),
                stability_state: StabilityState::PotentiallyStable,
                swing_state: crate::omib::SwingState::Forward,
                critical_cluster: vec!["G2".into(), "G1".into()],
                critical_time: Some(0.123456),
            }],
            warnings: vec!["2 failed candidates: 1, 3".into()],
        };
        let entry = summarize(&report, false);
        assert_eq!(entry["critical_cluster"], "G1, G2");
        assert_eq!(entry["CCT"], 123.46);
        assert_eq!(entry["warning"], "2 failed candidates: 1, 3");
        assert_eq!(entry["node_id"], 2);

        let failure = summarize(&report, true);
        assert_eq!(failure["status"], "COMPUTATION_FAILURE");
        assert_eq!(
            failure["failure_report"],
            "2 failed candidates: 1, 3. Failure is global because of --warn option."
        );
    }
}
