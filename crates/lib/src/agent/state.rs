//! Agent cache state and its persistence.
//!
//! The state is the agent's record of what is currently applied. Only
//! [`poll_once`](super::poll_once) changes it, and only in one step at the end of a
//! cycle. Persistence sits behind [`StateStore`] so the reconciler never touches disk.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::util::digest::Digest;

use super::error::AgentError;

/// One applied deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
  pub digest: Digest,
  #[serde(default)]
  pub application_id: String,
  #[serde(default)]
  pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentState {
  /// Validator of the last accepted manifest, sent as `If-None-Match`.
  pub manifest_etag: Option<String>,
  /// Version of the last accepted manifest; 0 before the first one.
  pub manifest_version: u64,
  /// Set once a bundle bootstrap has succeeded. Bootstrap is never retried after.
  pub bundle_fetched: bool,
  /// Applied deployments by id.
  pub deployments: BTreeMap<String, CacheEntry>,
}

/// Load/save seam for [`AgentState`].
pub trait StateStore: Send + Sync {
  fn load(&self) -> Result<AgentState, AgentError>;
  fn save(&self, state: &AgentState) -> Result<(), AgentError>;
}

/// State that lives as long as the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct EphemeralState;

impl StateStore for EphemeralState {
  fn load(&self) -> Result<AgentState, AgentError> {
    Ok(AgentState::default())
  }

  fn save(&self, _state: &AgentState) -> Result<(), AgentError> {
    Ok(())
  }
}

/// State persisted as a JSON file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct StateFile {
  path: PathBuf,
}

impl StateFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl StateStore for StateFile {
  /// A missing file is an empty state.
  fn load(&self) -> Result<AgentState, AgentError> {
    let content = match fs::read(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %self.path.display(), "no state file, starting empty");
        return Ok(AgentState::default());
      }
      Err(e) => return Err(AgentError::State(e)),
    };
    serde_json::from_slice(&content).map_err(|e| AgentError::State(io::Error::new(io::ErrorKind::InvalidData, e)))
  }

  fn save(&self, state: &AgentState) -> Result<(), AgentError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent).map_err(AgentError::State)?;
    }

    let mut temp_name = self.path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = self.path.with_file_name(temp_name);

    let content = serde_json::to_vec_pretty(state).map_err(|e| AgentError::State(io::Error::other(e)))?;
    fs::write(&temp_path, &content).map_err(AgentError::State)?;
    fs::rename(&temp_path, &self.path).map_err(AgentError::State)?;
    debug!(path = %self.path.display(), version = state.manifest_version, "saved agent state");
    Ok(())
  }
}
