//! Deployment use cases on top of the manifest store.
//!
//! Incoming descriptors are parsed, validated, stamped with their deployment id and
//! re-rendered; the rendered bytes are what gets stored and hashed.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};
use uuid::Uuid;

use crate::descriptor::{self, ApplicationDeploymentDescriptor};
use crate::manifest::{Deployment, Manifest};
use crate::store::{ManifestStore, StoreError};
use crate::util::digest::Digest;

#[derive(Debug, Clone)]
pub struct DeploymentService {
  store: Arc<ManifestStore>,
}

impl DeploymentService {
  pub fn new(store: Arc<ManifestStore>) -> Self {
    Self { store }
  }

  pub fn store(&self) -> &ManifestStore {
    &self.store
  }

  /// Add a deployment under a fresh id. A client-supplied id is overwritten.
  pub fn create_deployment(&self, device_id: &str, body: &[u8]) -> Result<Deployment, StoreError> {
    let mut descriptor = parse_descriptor(body)?;
    let id = Uuid::new_v4().to_string();
    descriptor.metadata.annotations.id = Some(id.clone());
    let deployment = Deployment::new(id, render_descriptor(&descriptor)?);

    let created = deployment.clone();
    self.store.mutate(device_id, move |set| {
      set.insert(created);
      Ok(())
    })?;

    info!(
      device_id,
      deployment_id = deployment.id(),
      digest = %deployment.digest(),
      "deployment created"
    );
    Ok(deployment)
  }

  /// Replace an existing deployment in place.
  ///
  /// A descriptor that carries an id must carry `deployment_id`.
  pub fn update_deployment(&self, device_id: &str, deployment_id: &str, body: &[u8]) -> Result<Deployment, StoreError> {
    let mut descriptor = parse_descriptor(body)?;
    if let Some(embedded) = descriptor.deployment_id()
      && embedded != deployment_id
    {
      return Err(StoreError::InvalidDescriptor(format!(
        "descriptor deployment id '{embedded}' does not match '{deployment_id}'"
      )));
    }
    descriptor.metadata.annotations.id = Some(deployment_id.to_string());
    let deployment = Deployment::new(deployment_id, render_descriptor(&descriptor)?);

    let updated = deployment.clone();
    self.store.mutate(device_id, move |set| {
      set
        .replace(updated)
        .map(|_| ())
        .ok_or_else(|| StoreError::DeploymentNotFound(deployment_id.to_string()))
    })?;

    info!(
      device_id,
      deployment_id,
      digest = %deployment.digest(),
      "deployment updated"
    );
    Ok(deployment)
  }

  pub fn delete_deployment(&self, device_id: &str, deployment_id: &str) -> Result<(), StoreError> {
    self.store.mutate(device_id, |set| {
      set
        .remove(deployment_id)
        .map(|_| ())
        .ok_or_else(|| StoreError::DeploymentNotFound(deployment_id.to_string()))
    })?;
    info!(device_id, deployment_id, "deployment deleted");
    Ok(())
  }

  /// The manifest of a device; the implicit empty manifest if none is stored yet.
  pub fn get_manifest(&self, device_id: &str) -> Result<Manifest, StoreError> {
    match self.store.get_manifest(device_id) {
      Err(StoreError::ManifestNotFound(_)) => {
        debug!(device_id, "no manifest stored, serving empty manifest");
        Ok(Manifest::empty(device_id))
      }
      other => other,
    }
  }

  /// Descriptor bytes by digest. `deployment_id` is not checked against the digest.
  pub fn get_deployment(&self, device_id: &str, deployment_id: &str, digest: &Digest) -> Result<Bytes, StoreError> {
    debug!(device_id, deployment_id, %digest, "serving deployment");
    self.store.get_deployment_content(device_id, digest)
  }

  pub fn get_bundle(&self, device_id: &str, digest: &Digest) -> Result<Bytes, StoreError> {
    let archive = self.store.get_bundle_content(device_id, digest)?;
    if archive.is_empty() {
      return Err(StoreError::BundleNotFound(digest.to_string()));
    }
    Ok(archive)
  }
}

fn parse_descriptor(body: &[u8]) -> Result<ApplicationDeploymentDescriptor, StoreError> {
  descriptor::parse_valid(body).map_err(|e| StoreError::InvalidDescriptor(e.to_string()))
}

fn render_descriptor(descriptor: &ApplicationDeploymentDescriptor) -> Result<Vec<u8>, StoreError> {
  descriptor::render(descriptor).map_err(|e| StoreError::InvalidDescriptor(e.to_string()))
}
