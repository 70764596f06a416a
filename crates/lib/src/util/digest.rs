//! Content digests for content-addressed storage and verification.
//!
//! A digest is an algorithm-tagged hash of the form `<algorithm>:<hex>`, e.g.
//! `sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9`.
//!
//! This module provides:
//! - `Digest`: the identifier used as storage key and integrity check
//! - `Digest::compute()`: hashing of arbitrary bytes (always `sha256`)
//! - `is_well_formed()` / `is_supported()`: policy checks for untrusted digests

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// The only algorithm whose digests are trusted.
pub const SUPPORTED_ALGORITHM: &str = "sha256";

/// Length of a hex-encoded SHA-256 hash.
const HEX_LEN: usize = 64;

/// Rejection reasons for a digest received from an untrusted source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
  /// The string does not match `<algorithm>:<64 lowercase hex>`.
  #[error("malformed digest: {0}")]
  Malformed(String),

  /// The digest is well-formed but uses an algorithm other than sha256.
  #[error("unsupported digest algorithm '{algorithm}' in {digest}")]
  Unsupported { algorithm: String, digest: String },
}

/// An algorithm-tagged content digest.
///
/// Values produced by [`Digest::compute`] are always supported. Values parsed from
/// the wire with [`Digest::new_unchecked`] must be checked with [`Digest::is_supported`]
/// before they are used to fetch or trust content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
  /// Hash bytes and return the `sha256:` digest.
  pub fn compute(data: &[u8]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Digest(format!("{}:{}", SUPPORTED_ALGORITHM, hex::encode(hasher.finalize())))
  }

  /// Wrap a string without validating it.
  pub fn new_unchecked(value: impl Into<String>) -> Self {
    Digest(value.into())
  }

  /// Parse and require a supported digest.
  pub fn parse(value: &str) -> Result<Self, DigestError> {
    let digest = Digest::new_unchecked(value);
    digest.check()?;
    Ok(digest)
  }

  /// Matches `^[a-z0-9_-]+:[0-9a-f]{64}$`.
  pub fn is_well_formed(&self) -> bool {
    let Some((algorithm, hex)) = self.0.split_once(':') else {
      return false;
    };
    !algorithm.is_empty()
      && algorithm
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
      && hex.len() == HEX_LEN
      && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
  }

  /// Well-formed and hashed with sha256.
  pub fn is_supported(&self) -> bool {
    self.is_well_formed() && self.algorithm() == SUPPORTED_ALGORITHM
  }

  /// Explain why a digest is not supported.
  pub fn check(&self) -> Result<(), DigestError> {
    if !self.is_well_formed() {
      return Err(DigestError::Malformed(self.0.clone()));
    }
    if !self.is_supported() {
      return Err(DigestError::Unsupported {
        algorithm: self.algorithm().to_string(),
        digest: self.0.clone(),
      });
    }
    Ok(())
  }

  /// The algorithm tag (text before the first `:`), or the whole string if untagged.
  pub fn algorithm(&self) -> &str {
    self.0.split_once(':').map(|(algorithm, _)| algorithm).unwrap_or(&self.0)
  }

  /// The hex part (text after the first `:`), or an empty string if untagged.
  pub fn hex(&self) -> &str {
    self.0.split_once(':').map(|(_, hex)| hex).unwrap_or("")
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Check that `data` hashes to this digest.
  pub fn verify(&self, data: &[u8]) -> bool {
    Digest::compute(data) == *self
  }
}

impl fmt::Display for Digest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for Digest {
  type Err = DigestError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Digest::parse(s)
  }
}

impl AsRef<str> for Digest {
  fn as_ref(&self) -> &str {
    &self.0
  }
}
