//! One poll cycle: fetch the manifest, resolve every desired deployment, then apply
//! the difference to the cache.
//!
//! All network work happens before the cache is touched. The final commit is
//! synchronous, so a cycle is either applied completely or not at all.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, error, info, trace, warn};

use crate::bundle;
use crate::descriptor::{self, ApplicationDeploymentDescriptor};
use crate::manifest::{BundleRef, DeploymentRef, ManifestResponse};
use crate::util::digest::Digest;

use super::error::AgentError;
use super::state::{AgentState, CacheEntry};
use super::transport::{ManifestFetch, Transport};

/// Where the next cache entry for a desired deployment comes from.
///
/// Precedence is bundle, then unchanged cache entry, then individual fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
  FromBundle(ApplicationDeploymentDescriptor),
  FromCacheUnchanged,
  Fetched(ApplicationDeploymentDescriptor),
}

impl Resolution {
  pub fn descriptor(&self) -> Option<&ApplicationDeploymentDescriptor> {
    match self {
      Resolution::FromBundle(d) | Resolution::Fetched(d) => Some(d),
      Resolution::FromCacheUnchanged => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
  pub digest: Digest,
  pub resolution: Resolution,
}

/// A change applied to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  Deploy {
    deployment_id: String,
    application_id: String,
    name: String,
    digest: Digest,
  },
  Update {
    deployment_id: String,
    application_id: String,
    name: String,
    old_digest: Digest,
    new_digest: Digest,
  },
  Undeploy {
    deployment_id: String,
    application_id: String,
    name: String,
    digest: Digest,
  },
}

impl Action {
  pub fn deployment_id(&self) -> &str {
    match self {
      Action::Deploy { deployment_id, .. }
      | Action::Update { deployment_id, .. }
      | Action::Undeploy { deployment_id, .. } => deployment_id,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Action::Deploy { .. } => "deploy",
      Action::Update { .. } => "update",
      Action::Undeploy { .. } => "undeploy",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
  /// The server answered `304`.
  NotModified,
  /// The offered manifest was not newer than the cached one and was ignored.
  RolledBack { cached: u64, offered: u64 },
  /// The manifest was accepted and reconciled.
  Applied { version: u64 },
}

/// What one poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
  pub outcome: CycleOutcome,
  pub actions: Vec<Action>,
  /// Entries left alone because their digest is malformed or unsupported.
  pub skipped: Vec<String>,
  /// Entries whose descriptor could not be fetched or verified.
  pub failed: Vec<String>,
}

impl CycleReport {
  fn outcome(outcome: CycleOutcome) -> Self {
    Self {
      outcome,
      actions: Vec::new(),
      skipped: Vec::new(),
      failed: Vec::new(),
    }
  }

  /// Whether the cycle changed the agent state.
  pub fn state_changed(&self) -> bool {
    matches!(self.outcome, CycleOutcome::Applied { .. })
  }
}

/// Run one poll cycle against `state`.
///
/// Errors fetching or parsing the manifest abort the cycle with `state` untouched.
/// Failures of the bundle or of single deployments are logged and contained.
pub async fn poll_once(transport: &dyn Transport, state: &mut AgentState) -> Result<CycleReport, AgentError> {
  let (manifest, etag) = match transport.fetch_manifest(state.manifest_etag.as_deref()).await? {
    ManifestFetch::NotModified => return Ok(CycleReport::outcome(CycleOutcome::NotModified)),
    ManifestFetch::Fetched { manifest, etag } => (manifest, etag),
  };

  if manifest.manifest_version <= state.manifest_version {
    warn!(
      cached = state.manifest_version,
      offered = manifest.manifest_version,
      "ignoring manifest that is not newer than the cached one"
    );
    return Ok(CycleReport::outcome(CycleOutcome::RolledBack {
      cached: state.manifest_version,
      offered: manifest.manifest_version,
    }));
  }
  if etag.is_none() {
    warn!(version = manifest.manifest_version, "manifest response has no ETag, validator cleared");
  }

  let mut report = CycleReport::outcome(CycleOutcome::Applied {
    version: manifest.manifest_version,
  });

  let mut bundle_fetched = state.bundle_fetched;
  let mut from_bundle = HashMap::new();
  if !state.bundle_fetched && state.deployments.is_empty() {
    match bootstrap(transport, &manifest).await {
      Ok(resolved) => {
        from_bundle = resolved;
        bundle_fetched = true;
      }
      Err(e) => warn!(error = %e, "bundle bootstrap failed, falling back to individual fetches"),
    }
  }

  let mut desired = HashSet::new();
  let mut resolved = BTreeMap::new();
  for entry in &manifest.deployments {
    desired.insert(entry.deployment_id.clone());

    if let Err(e) = entry.digest.check() {
      warn!(deployment_id = %entry.deployment_id, digest = %entry.digest, error = %e, "skipping deployment");
      report.skipped.push(entry.deployment_id.clone());
      continue;
    }

    let resolution = if let Some(descriptor) = from_bundle.remove(&entry.deployment_id) {
      Resolution::FromBundle(descriptor)
    } else if state
      .deployments
      .get(&entry.deployment_id)
      .is_some_and(|cached| cached.digest == entry.digest)
    {
      Resolution::FromCacheUnchanged
    } else {
      match fetch_descriptor(transport, entry).await {
        Ok(descriptor) => Resolution::Fetched(descriptor),
        Err(e) => {
          error!(
            deployment_id = %entry.deployment_id,
            digest = %entry.digest,
            error = %e,
            "failed to fetch deployment"
          );
          report.failed.push(entry.deployment_id.clone());
          continue;
        }
      }
    };

    resolved.insert(
      entry.deployment_id.clone(),
      Resolved {
        digest: entry.digest.clone(),
        resolution,
      },
    );
  }

  // Everything below is synchronous: the cycle commits as one step.
  let plan = build_plan(&state.deployments, &desired, resolved);
  report.actions = apply_plan(&mut state.deployments, plan);
  state.manifest_version = manifest.manifest_version;
  state.manifest_etag = etag;
  state.bundle_fetched = bundle_fetched;

  debug!(
    version = state.manifest_version,
    deployments = state.deployments.len(),
    actions = report.actions.len(),
    "manifest reconciled"
  );
  Ok(report)
}

/// Fetch, verify and unpack the bundle, resolving manifest entries by content.
///
/// A manifest without a bundle resolves nothing and still counts as success.
async fn bootstrap(
  transport: &dyn Transport,
  manifest: &ManifestResponse,
) -> Result<HashMap<String, ApplicationDeploymentDescriptor>, AgentError> {
  let Some(BundleRef { digest, url, .. }) = manifest.bundle.as_ref().filter(|b| !b.url.is_empty()) else {
    debug!("manifest has no bundle");
    return Ok(HashMap::new());
  };
  digest.check()?;

  let archive = transport.fetch_blob(url).await?;
  verify(digest, &archive)?;

  let expected: HashSet<Digest> = manifest
    .deployments
    .iter()
    .filter(|d| d.digest.is_supported())
    .map(|d| d.digest.clone())
    .collect();
  let members = bundle::unpack(&archive, &expected)?;

  let mut resolved = HashMap::new();
  for entry in &manifest.deployments {
    let Some(content) = members.get(&entry.digest) else {
      continue;
    };
    match descriptor::parse(content) {
      Ok(descriptor) => {
        resolved.insert(entry.deployment_id.clone(), descriptor);
      }
      Err(e) => error!(deployment_id = %entry.deployment_id, error = %e, "bundle member is not a descriptor"),
    }
  }

  info!(%digest, members = members.len(), resolved = resolved.len(), "bundle processed");
  Ok(resolved)
}

async fn fetch_descriptor(
  transport: &dyn Transport,
  entry: &DeploymentRef,
) -> Result<ApplicationDeploymentDescriptor, AgentError> {
  let content = transport.fetch_blob(&entry.url).await?;
  verify(&entry.digest, &content)?;
  Ok(descriptor::parse(&content)?)
}

fn verify(expected: &Digest, content: &[u8]) -> Result<(), AgentError> {
  let actual = Digest::compute(content);
  if &actual != expected {
    return Err(AgentError::DigestMismatch {
      expected: expected.clone(),
      actual,
    });
  }
  Ok(())
}

/// Pending change per id: `None` removes, `Some` upserts.
pub fn build_plan(
  cached: &BTreeMap<String, CacheEntry>,
  desired: &HashSet<String>,
  resolved: BTreeMap<String, Resolved>,
) -> BTreeMap<String, Option<Resolved>> {
  let mut plan: BTreeMap<String, Option<Resolved>> = cached
    .keys()
    .filter(|id| !desired.contains(*id))
    .map(|id| (id.clone(), None))
    .collect();
  for (id, entry) in resolved {
    plan.insert(id, Some(entry));
  }
  plan
}

/// Apply a plan to the cache and return the actions taken, in id order.
pub fn apply_plan(
  cache: &mut BTreeMap<String, CacheEntry>,
  plan: BTreeMap<String, Option<Resolved>>,
) -> Vec<Action> {
  let mut actions = Vec::new();

  for (deployment_id, change) in plan {
    let existing = cache.get(&deployment_id).cloned();

    let Some(resolved) = change else {
      if let Some(existing) = cache.remove(&deployment_id) {
        info!(
          deployment_id = %deployment_id,
          application_id = %existing.application_id,
          name = %existing.name,
          digest = %existing.digest,
          "undeploy"
        );
        actions.push(Action::Undeploy {
          deployment_id,
          application_id: existing.application_id,
          name: existing.name,
          digest: existing.digest,
        });
      }
      continue;
    };

    let (application_id, name) = match (resolved.resolution.descriptor(), &existing) {
      (Some(descriptor), _) => (descriptor.application_id().to_string(), descriptor.name().to_string()),
      (None, Some(existing)) => (existing.application_id.clone(), existing.name.clone()),
      (None, None) => (String::new(), String::new()),
    };
    let next = CacheEntry {
      digest: resolved.digest,
      application_id,
      name,
    };

    match existing {
      None => {
        info!(
          deployment_id = %deployment_id,
          application_id = %next.application_id,
          name = %next.name,
          digest = %next.digest,
          "deploy"
        );
        actions.push(Action::Deploy {
          deployment_id: deployment_id.clone(),
          application_id: next.application_id.clone(),
          name: next.name.clone(),
          digest: next.digest.clone(),
        });
        cache.insert(deployment_id, next);
      }
      Some(existing) if existing.digest != next.digest => {
        info!(
          deployment_id = %deployment_id,
          application_id = %next.application_id,
          name = %next.name,
          old_digest = %existing.digest,
          new_digest = %next.digest,
          "update"
        );
        actions.push(Action::Update {
          deployment_id: deployment_id.clone(),
          application_id: next.application_id.clone(),
          name: next.name.clone(),
          old_digest: existing.digest,
          new_digest: next.digest.clone(),
        });
        cache.insert(deployment_id, next);
      }
      Some(_) => {
        trace!(deployment_id = %deployment_id, digest = %next.digest, "unchanged");
      }
    }
  }

  actions
}
