//! Implementation of the `fleetsync bundle` commands.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use fleetsync_lib::bundle::{self, BundleFile};
use fleetsync_lib::util::Digest;

use crate::output::{format_bytes, print_stat, print_success, truncate_hash};

/// Pack files into a bundle archive, named by their file names.
pub fn cmd_bundle_pack(files: &[PathBuf], output: &Path) -> Result<()> {
  let mut members = Vec::with_capacity(files.len());
  for file in files {
    let name = file
      .file_name()
      .and_then(|n| n.to_str())
      .with_context(|| format!("invalid file name: {}", file.display()))?;
    let content = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    members.push(BundleFile::new(name, content));
  }

  let archive = bundle::pack(&members)?;
  std::fs::write(output, &archive).with_context(|| format!("failed to write {}", output.display()))?;

  print_success(&format!("Packed {} file(s) into {}", members.len(), output.display()));
  print_stat("Digest", Digest::compute(&archive).as_str());
  print_stat("Size", &format_bytes(archive.len() as u64));
  Ok(())
}

/// Print the members kept when unpacking with the expected digests.
pub fn cmd_bundle_list(archive: &Path, expected: &[String]) -> Result<()> {
  let expected: HashSet<Digest> = expected.iter().map(|d| Digest::parse(d)).collect::<Result<_, _>>()?;
  let content = std::fs::read(archive).with_context(|| format!("failed to read {}", archive.display()))?;

  let members = bundle::unpack(&content, &expected)?;
  let mut digests: Vec<&Digest> = members.keys().collect();
  digests.sort();
  for digest in digests {
    println!("{}  {}", digest, format_bytes(members[digest].len() as u64));
  }

  let missing = expected.len() - members.len();
  if missing > 0 {
    print_stat("Missing", &format!("{missing} of {} ({})", expected.len(), missing_hashes(&expected, &members)));
  }
  Ok(())
}

fn missing_hashes(expected: &HashSet<Digest>, found: &std::collections::HashMap<Digest, Vec<u8>>) -> String {
  let mut missing: Vec<&str> = expected
    .iter()
    .filter(|d| !found.contains_key(*d))
    .map(|d| truncate_hash(d.hex()))
    .collect();
  missing.sort_unstable();
  missing.join(", ")
}
