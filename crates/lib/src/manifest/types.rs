//! Domain types for manifests and deployments.

use bytes::Bytes;

use crate::consts::INITIAL_MANIFEST_VERSION;
use crate::util::digest::Digest;

/// One deployment: an id bound to descriptor bytes and their digest.
///
/// `digest` is always `Digest::compute(&descriptor)`; the constructor is the only
/// way to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
  id: String,
  descriptor: Bytes,
  digest: Digest,
}

impl Deployment {
  pub fn new(id: impl Into<String>, descriptor: impl Into<Bytes>) -> Self {
    let descriptor = descriptor.into();
    let digest = Digest::compute(&descriptor);
    Self {
      id: id.into(),
      descriptor,
      digest,
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn descriptor(&self) -> &Bytes {
    &self.descriptor
  }

  pub fn digest(&self) -> &Digest {
    &self.digest
  }

  /// Member name of this deployment inside a bundle.
  pub fn bundle_file_name(&self) -> String {
    format!("{}.yaml", self.id)
  }
}

/// Ordered set of deployments, unique by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentSet {
  items: Vec<Deployment>,
}

impl DeploymentSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Deployment> {
    self.items.iter()
  }

  pub fn ids(&self) -> impl Iterator<Item = &str> {
    self.items.iter().map(|d| d.id())
  }

  pub fn get(&self, id: &str) -> Option<&Deployment> {
    self.items.iter().find(|d| d.id() == id)
  }

  pub fn contains(&self, id: &str) -> bool {
    self.get(id).is_some()
  }

  /// Append a deployment. Returns `false` (and changes nothing) if the id exists.
  pub fn insert(&mut self, deployment: Deployment) -> bool {
    if self.contains(deployment.id()) {
      return false;
    }
    self.items.push(deployment);
    true
  }

  /// Replace the deployment with the same id in place. Returns the previous value.
  pub fn replace(&mut self, deployment: Deployment) -> Option<Deployment> {
    let slot = self.items.iter_mut().find(|d| d.id() == deployment.id())?;
    Some(std::mem::replace(slot, deployment))
  }

  /// Remove by id, preserving the order of the rest.
  pub fn remove(&mut self, id: &str) -> Option<Deployment> {
    let idx = self.items.iter().position(|d| d.id() == id)?;
    Some(self.items.remove(idx))
  }
}

impl FromIterator<Deployment> for DeploymentSet {
  /// Later duplicates of an id are dropped.
  fn from_iter<T: IntoIterator<Item = Deployment>>(iter: T) -> Self {
    let mut set = DeploymentSet::new();
    for deployment in iter {
      set.insert(deployment);
    }
    set
  }
}

impl<'a> IntoIterator for &'a DeploymentSet {
  type Item = &'a Deployment;
  type IntoIter = std::slice::Iter<'a, Deployment>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

/// A packed bundle and its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
  pub digest: Digest,
  pub archive: Bytes,
}

/// The desired state of one device.
///
/// `bundle` is `None` exactly when `deployments` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
  pub device_id: String,
  pub version: u64,
  pub bundle: Option<Bundle>,
  pub deployments: DeploymentSet,
}

impl Manifest {
  /// The implicit manifest of a device with nothing stored yet.
  pub fn empty(device_id: impl Into<String>) -> Self {
    Self {
      device_id: device_id.into(),
      version: INITIAL_MANIFEST_VERSION,
      bundle: None,
      deployments: DeploymentSet::new(),
    }
  }

  pub fn bundle_digest(&self) -> Option<&Digest> {
    self.bundle.as_ref().map(|b| &b.digest)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn deployment_digest_matches_descriptor() {
    let deployment = Deployment::new("a", &b"kind: A"[..]);
    assert_eq!(deployment.digest(), &Digest::compute(b"kind: A"));
    assert_eq!(deployment.bundle_file_name(), "a.yaml");
  }

  #[test]
  fn set_rejects_duplicate_ids() {
    let mut set = DeploymentSet::new();
    assert!(set.insert(Deployment::new("a", &b"1"[..])));
    assert!(!set.insert(Deployment::new("a", &b"2"[..])));
    assert_eq!(set.len(), 1);
    assert_eq!(set.get("a").unwrap().descriptor().as_ref(), b"1");
  }

  #[test]
  fn replace_and_remove_keep_order() {
    let mut set: DeploymentSet = ["a", "b", "c"]
      .into_iter()
      .map(|id| Deployment::new(id, id.as_bytes().to_vec()))
      .collect();

    assert!(set.replace(Deployment::new("b", &b"B"[..])).is_some());
    assert!(set.replace(Deployment::new("z", &b"Z"[..])).is_none());
    assert_eq!(set.ids().collect::<Vec<_>>(), ["a", "b", "c"]);
    assert_eq!(set.get("b").unwrap().descriptor().as_ref(), b"B");

    assert!(set.remove("a").is_some());
    assert!(set.remove("a").is_none());
    assert_eq!(set.ids().collect::<Vec<_>>(), ["b", "c"]);
  }

  #[test]
  fn empty_manifest_starts_at_version_one() {
    let manifest = Manifest::empty("device1");
    assert_eq!(manifest.version, 1);
    assert!(manifest.bundle.is_none());
    assert!(manifest.deployments.is_empty());
  }
}
