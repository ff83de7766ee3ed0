use std::path::Path;

use anyhow::{bail, Context, Result};
use eeac_algo::tree::ExecutionTree;
use eeac_core::EeacError;

pub fn handle(path: &Path) -> Result<()> {
    match ExecutionTree::from_path(path) {
        Ok(tree) => {
            println!("tree '{}' is valid: {} nodes", tree.name, tree.len());
            Ok(())
        }
        Err(EeacError::Validation(issues)) => {
            for issue in &issues {
                println!("{issue}");
            }
            bail!("{} issue(s) found in '{}'", issues.len(), path.display())
        }
        Err(err) => Err(err).with_context(|| format!("loading execution tree '{}'", path.display())),
    }
}
