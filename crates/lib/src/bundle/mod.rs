//! Bundle archive codec.
//!
//! A bundle is a gzip-compressed tar archive holding one descriptor file per
//! deployment. It lets a device fetch its whole desired state in one request on
//! first sync.
//!
//! # Trust model
//!
//! File names inside an archive are never trusted as identifiers. [`unpack`]
//! hashes every member and keeps only content whose digest the caller expects;
//! everything else is discarded.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::{Archive, Builder, EntryType, Header};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::consts::DESCRIPTOR_EXTENSIONS;
use crate::util::digest::Digest;

/// Permissions stored for every member.
const MEMBER_MODE: u32 = 0o600;

/// Errors produced while building or reading a bundle.
#[derive(Debug, Error)]
pub enum BundleError {
  /// Writing the archive failed.
  #[error("failed to build bundle archive: {0}")]
  Build(#[source] std::io::Error),

  /// The archive could not be decompressed or its container format is corrupt.
  #[error("corrupt bundle archive: {0}")]
  Archive(#[source] std::io::Error),

  /// The archive contained no bytes at all.
  #[error("bundle archive is empty")]
  Empty,
}

/// A named blob to place into a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFile {
  pub name: String,
  pub content: Vec<u8>,
}

impl BundleFile {
  pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
    Self {
      name: name.into(),
      content: content.into(),
    }
  }
}

/// Pack files into a `.tar.gz` archive.
///
/// Members are regular files with mode 0600, owner 0:0 and a zero timestamp, so
/// packing the same sequence twice yields identical bytes. Member order follows
/// `files`.
pub fn pack(files: &[BundleFile]) -> Result<Vec<u8>, BundleError> {
  let encoder = GzEncoder::new(Vec::new(), Compression::default());
  let mut builder = Builder::new(encoder);

  for file in files {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(MEMBER_MODE);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(file.content.len() as u64);
    builder
      .append_data(&mut header, &file.name, file.content.as_slice())
      .map_err(BundleError::Build)?;
  }

  let encoder = builder.into_inner().map_err(BundleError::Build)?;
  encoder.finish().map_err(BundleError::Build)
}

/// Unpack an archive, keeping only members whose content digest is expected.
///
/// Directories, non-regular entries and files without a descriptor extension are
/// skipped. A member whose content cannot be read is logged and skipped; the rest
/// are still unpacked. Members with an unexpected digest are discarded with a
/// warning. The result maps each retained digest to its content.
pub fn unpack(archive: &[u8], expected: &HashSet<Digest>) -> Result<HashMap<Digest, Vec<u8>>, BundleError> {
  if archive.is_empty() {
    return Err(BundleError::Empty);
  }

  let mut reader = Archive::new(GzDecoder::new(archive));
  let mut members = HashMap::with_capacity(expected.len());

  for entry in reader.entries().map_err(BundleError::Archive)? {
    let mut entry = entry.map_err(BundleError::Archive)?;

    let entry_type = entry.header().entry_type();
    if entry_type.is_dir() {
      continue;
    }
    let name = entry.path().map_err(BundleError::Archive)?.to_string_lossy().into_owned();
    if !entry_type.is_file() {
      debug!(name = %name, "skipping non-regular bundle entry");
      continue;
    }
    if !has_descriptor_extension(Path::new(&name)) {
      debug!(name = %name, "skipping bundle entry without descriptor extension");
      continue;
    }

    let size = entry.size();
    let Some(content) = read_member(&name, size, &mut entry) else {
      continue;
    };

    let digest = Digest::compute(&content);
    if !expected.contains(&digest) {
      warn!(name = %name, digest = %digest, "bundle entry not referenced by manifest; ignored");
      continue;
    }
    members.insert(digest, content);
  }

  Ok(members)
}

/// Read one member's content. `None` (logged) if the read fails.
fn read_member(name: &str, size: u64, reader: &mut impl Read) -> Option<Vec<u8>> {
  let mut content = Vec::with_capacity(size as usize);
  match reader.read_to_end(&mut content) {
    Ok(_) => Some(content),
    Err(e) => {
      error!(name = %name, error = %e, "failed to read bundle entry, skipped");
      None
    }
  }
}

fn has_descriptor_extension(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| DESCRIPTOR_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
    .unwrap_or(false)
}
