//! On-disk layout of the manifest store.
//!
//! ```text
//! {data_dir}/
//! ├── devices/
//! │   └── <device_id>.json          # DeviceFile: version, bundle digest, id -> digest list
//! └── blobs/
//!     ├── deployments/<algo>/<hex>  # descriptor bytes
//!     └── bundles/<algo>/<hex>      # bundle archives
//! ```
//!
//! Blobs are immutable and written before the device record that references them.
//! Every file is written to a uniquely named temp file in its target directory and
//! renamed into place, so concurrent writers of the same blob never share a temp path.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::util::digest::Digest;

const DEVICES_DIR: &str = "devices";
const BLOBS_DIR: &str = "blobs";

/// Which content-addressed table a blob belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
  Deployment,
  Bundle,
}

impl BlobKind {
  fn dir_name(self) -> &'static str {
    match self {
      BlobKind::Deployment => "deployments",
      BlobKind::Bundle => "bundles",
    }
  }
}

/// Persisted form of one device and its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFile {
  pub device_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub manifest: Option<ManifestFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
  pub version: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bundle_digest: Option<Digest>,
  #[serde(default)]
  pub deployments: Vec<DeploymentEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEntry {
  pub id: String,
  pub digest: Digest,
}

#[derive(Debug, Clone)]
pub struct DiskLayout {
  root: PathBuf,
}

impl DiskLayout {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn devices_dir(&self) -> PathBuf {
    self.root.join(DEVICES_DIR)
  }

  fn device_path(&self, device_id: &str) -> PathBuf {
    self.devices_dir().join(format!("{device_id}.json"))
  }

  pub fn blob_path(&self, kind: BlobKind, digest: &Digest) -> PathBuf {
    self
      .root
      .join(BLOBS_DIR)
      .join(kind.dir_name())
      .join(digest.algorithm())
      .join(digest.hex())
  }

  /// Write a blob unless it already exists.
  ///
  /// Two writers racing on the same digest both succeed; the blob content is identical.
  pub fn write_blob(&self, kind: BlobKind, digest: &Digest, content: &[u8]) -> io::Result<()> {
    let path = self.blob_path(kind, digest);
    if path.is_file() {
      return Ok(());
    }
    write_atomic(&path, content)
  }

  /// Read a blob. `Ok(None)` if it does not exist.
  pub fn read_blob(&self, kind: BlobKind, digest: &Digest) -> io::Result<Option<Vec<u8>>> {
    match fs::read(self.blob_path(kind, digest)) {
      Ok(content) => Ok(Some(content)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e),
    }
  }

  pub fn write_device(&self, record: &DeviceFile) -> io::Result<()> {
    let content = serde_json::to_vec_pretty(record).map_err(io::Error::other)?;
    write_atomic(&self.device_path(&record.device_id), &content)
  }

  /// Load every device record. A missing data directory yields no records.
  pub fn load_devices(&self) -> io::Result<Vec<DeviceFile>> {
    let entries = match fs::read_dir(self.devices_dir()) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e),
    };

    let mut records = Vec::new();
    for entry in entries {
      let path = entry?.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      let content = fs::read(&path)?;
      let record: DeviceFile = serde_json::from_slice(&content)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{}: {e}", path.display())))?;
      records.push(record);
    }
    records.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    Ok(records)
  }
}

fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
  fs::create_dir_all(parent)?;

  let mut temp = NamedTempFile::new_in(parent)?;
  temp.write_all(content)?;
  temp.persist(path).map_err(|e| e.error)?;
  Ok(())
}
