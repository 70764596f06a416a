//! Serde model of the ApplicationDeployment descriptor.
//!
//! Maps are `BTreeMap` so rendering is ordered by key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level descriptor document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDeploymentDescriptor {
  #[serde(default)]
  pub api_version: String,
  #[serde(default)]
  pub kind: String,
  #[serde(default)]
  pub metadata: ApplicationMetadata,
  #[serde(default)]
  pub spec: ApplicationSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationMetadata {
  #[serde(default)]
  pub annotations: ApplicationAnnotations,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationAnnotations {
  #[serde(default)]
  pub application_id: String,
  /// Deployment id, assigned by the server.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
  #[serde(default)]
  pub deployment_profile: DeploymentProfile,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub parameters: BTreeMap<String, ApplicationParam>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentProfile {
  #[serde(rename = "type", default)]
  pub kind: String,
  #[serde(default)]
  pub components: Vec<DeploymentComponent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentComponent {
  #[serde(default)]
  pub name: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationParam {
  #[serde(default)]
  pub value: String,
  #[serde(default)]
  pub targets: Vec<ApplicationParamTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationParamTarget {
  #[serde(default)]
  pub pointer: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub components: Vec<String>,
}

impl ApplicationDeploymentDescriptor {
  /// The `metadata.annotations.applicationId` field.
  pub fn application_id(&self) -> &str {
    &self.metadata.annotations.application_id
  }

  /// The `metadata.name` field.
  pub fn name(&self) -> &str {
    &self.metadata.name
  }

  /// The server-assigned deployment id, if present and non-empty.
  pub fn deployment_id(&self) -> Option<&str> {
    self.metadata.annotations.id.as_deref().filter(|id| !id.is_empty())
  }
}
