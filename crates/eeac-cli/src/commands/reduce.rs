use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use eeac_core::BusCase;
use tracing::info;

pub fn handle(case: &Path, out: &Path) -> Result<()> {
    let bus_case = BusCase::from_path(case).with_context(|| format!("loading case '{}'", case.display()))?;
    let snapshot = bus_case
        .reduce()
        .with_context(|| format!("reducing case '{}'", case.display()))?;
    let json = serde_json::to_string_pretty(&snapshot).context("serializing snapshot")?;
    fs::write(out, json).with_context(|| format!("writing snapshot '{}'", out.display()))?;
    info!(generators = snapshot.len(), out = %out.display(), "snapshot written");
    println!("{} generators reduced to '{}'", snapshot.len(), out.display());
    Ok(())
}
