//! Wire format of the manifest endpoint.

use serde::{Deserialize, Serialize};

use crate::consts::{API_PREFIX, BUNDLE_MEDIA_TYPE};
use crate::util::digest::Digest;

use super::types::Manifest;

/// Body of `GET /devices/{deviceId}/deployments`.
///
/// Digests are carried unchecked; receivers must verify them before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResponse {
  pub manifest_version: u64,
  pub bundle: Option<BundleRef>,
  #[serde(default)]
  pub deployments: Vec<DeploymentRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRef {
  pub media_type: String,
  pub digest: Digest,
  pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRef {
  pub deployment_id: String,
  pub digest: Digest,
  pub url: String,
}

impl ManifestResponse {
  pub fn from_manifest(manifest: &Manifest) -> Self {
    let device_id = &manifest.device_id;
    Self {
      manifest_version: manifest.version,
      bundle: manifest.bundle_digest().map(|digest| BundleRef {
        media_type: BUNDLE_MEDIA_TYPE.to_string(),
        digest: digest.clone(),
        url: bundle_path(device_id, digest),
      }),
      deployments: manifest
        .deployments
        .iter()
        .map(|d| DeploymentRef {
          deployment_id: d.id().to_string(),
          digest: d.digest().clone(),
          url: deployment_path(device_id, d.id(), d.digest()),
        })
        .collect(),
    }
  }

  /// Serialized body; its digest is the manifest's entity tag.
  pub fn to_body(&self) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(self)
  }
}

pub fn manifest_path(device_id: &str) -> String {
  format!("{API_PREFIX}/devices/{device_id}/deployments")
}

pub fn deployment_path(device_id: &str, deployment_id: &str, digest: &Digest) -> String {
  format!("{API_PREFIX}/devices/{device_id}/deployments/{deployment_id}/{digest}")
}

pub fn bundle_path(device_id: &str, digest: &Digest) -> String {
  format!("{API_PREFIX}/devices/{device_id}/bundles/{digest}")
}
