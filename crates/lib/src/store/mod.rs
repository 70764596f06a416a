//! Manifest store.
//!
//! Holds the device registry, one manifest per device and two content-addressed blob
//! tables (descriptors and bundles). Every mutation of a device runs under that
//! device's lock: the deployment set is copied, changed by the caller, then the store
//! derives the new bundle and version from the old and new sets and commits both at
//! once. Reads take the same lock, so a half-applied mutation is never visible.
//!
//! With a data directory the store is persisted through [`disk::DiskLayout`]; the
//! in-memory record is only replaced after the on-disk record has been written.

mod disk;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info};

use crate::bundle::{self, BundleFile};
use crate::manifest::{Bundle, Deployment, DeploymentSet, Manifest};
use crate::util::digest::Digest;

pub use disk::BlobKind;
use disk::{DeploymentEntry, DeviceFile, DiskLayout, ManifestFile};

/// Errors raised by the store and the operations built on it.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("device not found: {0}")]
  DeviceNotFound(String),

  #[error("no manifest stored for device {0}")]
  ManifestNotFound(String),

  #[error("deployment not found: {0}")]
  DeploymentNotFound(String),

  #[error("bundle not found: {0}")]
  BundleNotFound(String),

  #[error("invalid deployment descriptor: {0}")]
  InvalidDescriptor(String),

  #[error("invalid device id '{0}'")]
  InvalidDeviceId(String),

  /// Storage failure. Nothing of the failed operation is visible afterwards.
  #[error("internal store error: {0}")]
  Internal(String),
}

impl StoreError {
  fn internal(context: &str, err: impl std::fmt::Display) -> Self {
    StoreError::Internal(format!("{context}: {err}"))
  }
}

#[derive(Debug, Default)]
struct DeviceRecord {
  manifest: Option<Manifest>,
}

type DeviceSlot = Arc<Mutex<DeviceRecord>>;

#[derive(Debug, Default)]
pub struct ManifestStore {
  devices: RwLock<HashMap<String, DeviceSlot>>,
  deployment_blobs: RwLock<HashMap<Digest, Bytes>>,
  bundle_blobs: RwLock<HashMap<Digest, Bytes>>,
  disk: Option<DiskLayout>,
}

impl ManifestStore {
  /// An empty store that lives only in memory.
  pub fn in_memory() -> Self {
    Self::default()
  }

  /// Open (or create) a store persisted under `data_dir`.
  ///
  /// Every device record is loaded and each referenced blob is read back and checked
  /// against its digest.
  pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
    let layout = DiskLayout::new(data_dir);
    let records = layout
      .load_devices()
      .map_err(|e| StoreError::internal("failed to load device records", e))?;

    let mut devices = HashMap::new();
    let mut deployment_blobs = HashMap::new();
    let mut bundle_blobs = HashMap::new();

    for record in records {
      let manifest = match record.manifest {
        Some(file) => Some(load_manifest(
          &layout,
          &record.device_id,
          file,
          &mut deployment_blobs,
          &mut bundle_blobs,
        )?),
        None => None,
      };
      debug!(device_id = %record.device_id, has_manifest = manifest.is_some(), "loaded device");
      devices.insert(record.device_id, Arc::new(Mutex::new(DeviceRecord { manifest })));
    }

    info!(path = %layout.root().display(), devices = devices.len(), "opened manifest store");

    Ok(Self {
      devices: RwLock::new(devices),
      deployment_blobs: RwLock::new(deployment_blobs),
      bundle_blobs: RwLock::new(bundle_blobs),
      disk: Some(layout),
    })
  }

  /// Register a device. Registering a known device is a no-op.
  pub fn register_device(&self, device_id: &str) -> Result<(), StoreError> {
    validate_device_id(device_id)?;

    let mut devices = self
      .devices
      .write()
      .map_err(|e| StoreError::internal("device registry poisoned", e))?;
    if devices.contains_key(device_id) {
      return Ok(());
    }

    if let Some(disk) = &self.disk {
      disk
        .write_device(&DeviceFile {
          device_id: device_id.to_string(),
          manifest: None,
        })
        .map_err(|e| StoreError::internal("failed to write device record", e))?;
    }

    devices.insert(device_id.to_string(), DeviceSlot::default());
    info!(device_id, "registered device");
    Ok(())
  }

  /// Ids of every registered device, sorted.
  pub fn device_ids(&self) -> Result<Vec<String>, StoreError> {
    let devices = self
      .devices
      .read()
      .map_err(|e| StoreError::internal("device registry poisoned", e))?;
    let mut ids: Vec<String> = devices.keys().cloned().collect();
    ids.sort();
    Ok(ids)
  }

  /// The stored manifest of a device.
  ///
  /// `ManifestNotFound` for a known device that has never been mutated.
  pub fn get_manifest(&self, device_id: &str) -> Result<Manifest, StoreError> {
    let slot = self.device(device_id)?;
    let record = lock(&slot)?;
    record
      .manifest
      .clone()
      .ok_or_else(|| StoreError::ManifestNotFound(device_id.to_string()))
  }

  /// Descriptor bytes stored under `digest`.
  ///
  /// Blobs are not scoped to the device: any stored descriptor is returned for any
  /// known device.
  pub fn get_deployment_content(&self, device_id: &str, digest: &Digest) -> Result<Bytes, StoreError> {
    self.device(device_id)?;
    self
      .read_blob(BlobKind::Deployment, digest)?
      .ok_or_else(|| StoreError::DeploymentNotFound(digest.to_string()))
  }

  /// Bundle archive stored under `digest`. Same scoping as [`Self::get_deployment_content`].
  pub fn get_bundle_content(&self, device_id: &str, digest: &Digest) -> Result<Bytes, StoreError> {
    self.device(device_id)?;
    self
      .read_blob(BlobKind::Bundle, digest)?
      .ok_or_else(|| StoreError::BundleNotFound(digest.to_string()))
  }

  /// Change the deployment set of a device in one transaction.
  ///
  /// `change` receives a copy of the current set (empty if the device has no manifest
  /// yet). If it fails nothing is stored and its error is returned unchanged.
  /// Otherwise the bundle is rebuilt from the resulting set (cleared when empty), the
  /// version advances by one only if the bundle digest changed, and the new manifest
  /// is committed.
  pub fn mutate<T, F>(&self, device_id: &str, change: F) -> Result<T, StoreError>
  where
    F: FnOnce(&mut DeploymentSet) -> Result<T, StoreError>,
  {
    let slot = self.device(device_id)?;
    let mut record = lock(&slot)?;

    let current = record
      .manifest
      .clone()
      .unwrap_or_else(|| Manifest::empty(device_id));
    let mut deployments = current.deployments.clone();
    let value = change(&mut deployments)?;

    let removed: Vec<&str> = current
      .deployments
      .ids()
      .filter(|id| !deployments.contains(id))
      .collect();
    if !removed.is_empty() {
      info!(device_id, removed = ?removed, "deployments removed");
    }

    let bundle = build_bundle(&deployments)?;
    let version = if bundle.as_ref().map(|b| &b.digest) != current.bundle_digest() {
      current.version + 1
    } else {
      info!(device_id, version = current.version, "bundle unchanged, version kept");
      current.version
    };

    let next = Manifest {
      device_id: device_id.to_string(),
      version,
      bundle,
      deployments,
    };
    self.commit(&next)?;

    info!(
      device_id,
      version = next.version,
      deployments = next.deployments.len(),
      bundle_digest = ?next.bundle_digest().map(Digest::as_str),
      "manifest committed"
    );
    record.manifest = Some(next);
    Ok(value)
  }

  fn device(&self, device_id: &str) -> Result<DeviceSlot, StoreError> {
    let devices = self
      .devices
      .read()
      .map_err(|e| StoreError::internal("device registry poisoned", e))?;
    devices
      .get(device_id)
      .cloned()
      .ok_or_else(|| StoreError::DeviceNotFound(device_id.to_string()))
  }

  /// Persist blobs and the device record, then publish blobs in memory.
  fn commit(&self, manifest: &Manifest) -> Result<(), StoreError> {
    if let Some(disk) = &self.disk {
      for deployment in &manifest.deployments {
        disk
          .write_blob(BlobKind::Deployment, deployment.digest(), deployment.descriptor())
          .map_err(|e| StoreError::internal("failed to write deployment blob", e))?;
      }
      if let Some(bundle) = &manifest.bundle {
        disk
          .write_blob(BlobKind::Bundle, &bundle.digest, &bundle.archive)
          .map_err(|e| StoreError::internal("failed to write bundle blob", e))?;
      }
      disk
        .write_device(&device_file(manifest))
        .map_err(|e| StoreError::internal("failed to write device record", e))?;
    }

    {
      let mut blobs = self
        .deployment_blobs
        .write()
        .map_err(|e| StoreError::internal("blob table poisoned", e))?;
      for deployment in &manifest.deployments {
        blobs
          .entry(deployment.digest().clone())
          .or_insert_with(|| deployment.descriptor().clone());
      }
    }
    if let Some(bundle) = &manifest.bundle {
      self
        .bundle_blobs
        .write()
        .map_err(|e| StoreError::internal("blob table poisoned", e))?
        .entry(bundle.digest.clone())
        .or_insert_with(|| bundle.archive.clone());
    }
    Ok(())
  }

  fn read_blob(&self, kind: BlobKind, digest: &Digest) -> Result<Option<Bytes>, StoreError> {
    let table = match kind {
      BlobKind::Deployment => &self.deployment_blobs,
      BlobKind::Bundle => &self.bundle_blobs,
    };
    let cached = table
      .read()
      .map_err(|e| StoreError::internal("blob table poisoned", e))?
      .get(digest)
      .cloned();
    if cached.is_some() {
      return Ok(cached);
    }

    // Blobs written by earlier runs but no longer referenced are only on disk.
    let Some(disk) = &self.disk else {
      return Ok(None);
    };
    if !digest.is_well_formed() {
      return Ok(None);
    }
    let Some(content) = disk
      .read_blob(kind, digest)
      .map_err(|e| StoreError::internal("failed to read blob", e))?
    else {
      return Ok(None);
    };
    if !digest.verify(&content) {
      return Err(StoreError::Internal(format!("blob {digest} does not match its digest")));
    }
    Ok(Some(Bytes::from(content)))
  }
}

fn lock(slot: &DeviceSlot) -> Result<MutexGuard<'_, DeviceRecord>, StoreError> {
  slot
    .lock()
    .map_err(|e| StoreError::internal("device record poisoned", e))
}

/// Device ids become file names, so they are restricted to a safe alphabet.
fn validate_device_id(device_id: &str) -> Result<(), StoreError> {
  let valid = !device_id.is_empty()
    && !device_id.starts_with('.')
    && device_id
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
  if valid {
    Ok(())
  } else {
    Err(StoreError::InvalidDeviceId(device_id.to_string()))
  }
}

/// Pack one `<id>.yaml` member per deployment. `None` for an empty set.
fn build_bundle(deployments: &DeploymentSet) -> Result<Option<Bundle>, StoreError> {
  if deployments.is_empty() {
    return Ok(None);
  }
  let files: Vec<BundleFile> = deployments
    .iter()
    .map(|d| BundleFile::new(d.bundle_file_name(), d.descriptor().to_vec()))
    .collect();
  let archive = bundle::pack(&files).map_err(|e| StoreError::internal("failed to build bundle", e))?;
  Ok(Some(Bundle {
    digest: Digest::compute(&archive),
    archive: Bytes::from(archive),
  }))
}

fn device_file(manifest: &Manifest) -> DeviceFile {
  DeviceFile {
    device_id: manifest.device_id.clone(),
    manifest: Some(ManifestFile {
      version: manifest.version,
      bundle_digest: manifest.bundle_digest().cloned(),
      deployments: manifest
        .deployments
        .iter()
        .map(|d| DeploymentEntry {
          id: d.id().to_string(),
          digest: d.digest().clone(),
        })
        .collect(),
    }),
  }
}

fn load_manifest(
  layout: &DiskLayout,
  device_id: &str,
  file: ManifestFile,
  deployment_blobs: &mut HashMap<Digest, Bytes>,
  bundle_blobs: &mut HashMap<Digest, Bytes>,
) -> Result<Manifest, StoreError> {
  let mut deployments = DeploymentSet::new();
  for entry in file.deployments {
    let content = read_verified(layout, BlobKind::Deployment, &entry.digest)?;
    let deployment = Deployment::new(entry.id, content);
    deployment_blobs.insert(deployment.digest().clone(), deployment.descriptor().clone());
    if !deployments.insert(deployment) {
      return Err(StoreError::Internal(format!("device {device_id} lists a deployment twice")));
    }
  }

  let bundle = match file.bundle_digest {
    Some(digest) => {
      let archive = read_verified(layout, BlobKind::Bundle, &digest)?;
      bundle_blobs.insert(digest.clone(), archive.clone());
      Some(Bundle { digest, archive })
    }
    None => None,
  };

  if bundle.is_none() != deployments.is_empty() {
    return Err(StoreError::Internal(format!(
      "device {device_id} has an inconsistent bundle"
    )));
  }

  Ok(Manifest {
    device_id: device_id.to_string(),
    version: file.version,
    bundle,
    deployments,
  })
}

fn read_verified(layout: &DiskLayout, kind: BlobKind, digest: &Digest) -> Result<Bytes, StoreError> {
  if !digest.is_supported() {
    return Err(StoreError::Internal(format!("unsupported digest in record: {digest}")));
  }
  let content = layout
    .read_blob(kind, digest)
    .map_err(|e| StoreError::internal("failed to read blob", e))?
    .ok_or_else(|| StoreError::Internal(format!("missing blob {digest}")))?;
  if !digest.verify(&content) {
    return Err(StoreError::Internal(format!("blob {digest} does not match its digest")));
  }
  Ok(Bytes::from(content))
}
