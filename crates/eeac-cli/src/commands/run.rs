use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use eeac_algo::batch::{run_fault_cases, FaultCase, RunConfig};
use eeac_algo::tree::ExecutionTree;
use eeac_cli::cli::RunArgs;
use eeac_core::{BusCase, NetworkSnapshot};
use tracing::{info, warn};

use super::fault_name;

/// Snapshots are validated by the batch so that a bad fault only fails itself.
fn load_network(path: &Path) -> Result<FaultCase> {
    let name = fault_name(path)?;
    let text = fs::read_to_string(path).with_context(|| format!("reading network '{}'", path.display()))?;
    let snapshot: NetworkSnapshot =
        serde_json::from_str(&text).with_context(|| format!("parsing network '{}'", path.display()))?;
    Ok(FaultCase::new(name, snapshot))
}

fn load_case(path: &Path) -> Result<FaultCase> {
    let name = fault_name(path)?;
    let case = BusCase::from_path(path).with_context(|| format!("loading case '{}'", path.display()))?;
    Ok(match case.reduce() {
        Ok(snapshot) => FaultCase::new(name, snapshot),
        Err(err) => {
            warn!(fault = %name, error = %err, "case reduction failed");
            FaultCase::unavailable(name, err)
        }
    })
}

pub fn handle(args: &RunArgs) -> Result<()> {
    if args.networks.is_empty() && args.cases.is_empty() {
        bail!("no fault case given, use --network or --case");
    }
    let tree = ExecutionTree::from_path(&args.tree)
        .with_context(|| format!("loading execution tree '{}'", args.tree.display()))?;
    info!(tree = %tree.name, nodes = tree.len(), "execution tree loaded");

    let mut cases = Vec::with_capacity(args.networks.len() + args.cases.len());
    for path in &args.networks {
        cases.push(load_network(path)?);
    }
    for path in &args.cases {
        cases.push(load_case(path)?);
    }

    let config = RunConfig {
        cores: args.cores,
        output_dir: args.output_dir.clone(),
        json_results: args.json_results.clone(),
        island_threshold: args.island_threshold,
        rewrite: args.rewrite,
        warn: args.warn,
        verbose: args.verbose,
    };
    let summary = run_fault_cases(&cases, &tree, &config)?;
    let failures = summary.records.iter().filter(|record| record.status == "error").count();
    info!(faults = summary.records.len(), failures, "run finished");

    println!(
        "{}",
        serde_json::to_string_pretty(&summary.results).context("serializing fault summary")?
    );
    Ok(())
}
