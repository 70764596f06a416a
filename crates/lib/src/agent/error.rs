//! Agent error type.

use std::io;

use thiserror::Error;

use crate::bundle::BundleError;
use crate::descriptor::DescriptorError;
use crate::util::digest::{Digest, DigestError};

#[derive(Debug, Error)]
pub enum AgentError {
  /// Network failure or a request that could not be built.
  #[error("transport error: {0}")]
  Transport(String),

  #[error("unexpected status {status} from {url}")]
  UnexpectedStatus { url: String, status: u16 },

  #[error("failed to parse manifest: {0}")]
  ManifestParse(#[from] serde_json::Error),

  /// Fetched bytes do not hash to the digest they were requested by.
  #[error("digest mismatch: expected {expected}, got {actual}")]
  DigestMismatch { expected: Digest, actual: Digest },

  #[error(transparent)]
  UnsupportedDigest(#[from] DigestError),

  #[error(transparent)]
  InvalidDescriptor(#[from] DescriptorError),

  #[error("invalid bundle: {0}")]
  Archive(#[from] BundleError),

  #[error("agent state error: {0}")]
  State(#[source] io::Error),
}

impl From<reqwest::Error> for AgentError {
  fn from(err: reqwest::Error) -> Self {
    AgentError::Transport(err.to_string())
  }
}
