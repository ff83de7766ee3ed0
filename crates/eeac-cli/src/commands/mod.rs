pub mod reduce;
pub mod run;
pub mod validate;

use std::path::Path;

use anyhow::{anyhow, Result};

/// Fault name derived from an input file name.
pub fn fault_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("cannot name a fault after '{}'", path.display()))
}
