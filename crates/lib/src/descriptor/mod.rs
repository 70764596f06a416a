//! ApplicationDeployment descriptors.
//!
//! A descriptor is the YAML document describing one application deployment. The
//! server validates and re-renders descriptors before storing them, so the stored
//! bytes (and therefore their digest) are canonical. The agent only parses them
//! to learn the application id and name it reports in its actions.

mod types;

pub use types::*;

use thiserror::Error;

/// Errors raised while parsing or validating a descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
  /// The document is not valid YAML or does not match the descriptor shape.
  #[error("failed to parse descriptor: {0}")]
  Parse(#[from] serde_yaml::Error),

  /// A required field is missing or empty.
  #[error("missing required field '{0}'")]
  MissingField(String),

  /// Serializing the canonical form failed.
  #[error("failed to render descriptor: {0}")]
  Render(#[source] serde_yaml::Error),
}

/// Parse descriptor bytes without validating them.
pub fn parse(bytes: &[u8]) -> Result<ApplicationDeploymentDescriptor, DescriptorError> {
  Ok(serde_yaml::from_slice(bytes)?)
}

/// Render the canonical YAML form of a descriptor.
pub fn render(descriptor: &ApplicationDeploymentDescriptor) -> Result<Vec<u8>, DescriptorError> {
  serde_yaml::to_string(descriptor)
    .map(String::into_bytes)
    .map_err(DescriptorError::Render)
}

/// Check that every required field is present and non-empty.
///
/// Reports the first missing field by its YAML path.
pub fn validate(descriptor: &ApplicationDeploymentDescriptor) -> Result<(), DescriptorError> {
  require("apiVersion", &descriptor.api_version)?;
  require("kind", &descriptor.kind)?;

  let metadata = &descriptor.metadata;
  require("metadata.name", &metadata.name)?;
  require("metadata.namespace", &metadata.namespace)?;
  require("metadata.annotations.applicationId", &metadata.annotations.application_id)?;

  let profile = &descriptor.spec.deployment_profile;
  require("spec.deploymentProfile.type", &profile.kind)?;
  if profile.components.is_empty() {
    return Err(missing("spec.deploymentProfile.components"));
  }
  for (idx, component) in profile.components.iter().enumerate() {
    require(&format!("spec.deploymentProfile.components[{idx}].name"), &component.name)?;
  }

  for (name, param) in &descriptor.spec.parameters {
    require(&format!("spec.parameters.{name}.value"), &param.value)?;
    if param.targets.is_empty() {
      return Err(missing(&format!("spec.parameters.{name}.targets")));
    }
    for (idx, target) in param.targets.iter().enumerate() {
      require(&format!("spec.parameters.{name}.targets[{idx}].pointer"), &target.pointer)?;
    }
  }

  Ok(())
}

/// Parse and validate in one step.
pub fn parse_valid(bytes: &[u8]) -> Result<ApplicationDeploymentDescriptor, DescriptorError> {
  let descriptor = parse(bytes)?;
  validate(&descriptor)?;
  Ok(descriptor)
}

fn require(path: &str, value: &str) -> Result<(), DescriptorError> {
  if value.trim().is_empty() {
    return Err(missing(path));
  }
  Ok(())
}

fn missing(path: &str) -> DescriptorError {
  DescriptorError::MissingField(path.to_string())
}
