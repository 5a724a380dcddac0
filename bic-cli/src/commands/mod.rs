pub mod build;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};

use bic_core::{RunConfig, RunOptions};

/// Options for a run rooted at `cwd` (or the current directory), seeded
/// from the root `bic.yaml`.
pub fn load_options(cwd: Option<PathBuf>) -> Result<RunOptions> {
    let root = match cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("could not determine current directory")?,
    };
    let root = std::path::absolute(&root)
        .with_context(|| format!("invalid root directory '{}'", root.display()))?;
    if !root.is_dir() {
        anyhow::bail!("root directory '{}' does not exist", root.display());
    }
    let config = RunConfig::load_at(&root).context("failed to load bic.yaml")?;
    Ok(RunOptions::from_config(root, config))
}
