//! Implementation of the `fleetsync digest` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use fleetsync_lib::util::Digest;

/// Print `<digest>  <file>` for each file, in argument order.
pub fn cmd_digest(files: &[PathBuf]) -> Result<()> {
  for file in files {
    let content = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    println!("{}  {}", Digest::compute(&content), file.display());
  }
  Ok(())
}
