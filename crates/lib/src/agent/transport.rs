//! How the agent talks to the manifest server.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ETAG, IF_NONE_MATCH};
use tracing::debug;

use crate::consts::MANIFEST_MEDIA_TYPE;
use crate::manifest::{ManifestResponse, manifest_path};

use super::error::AgentError;

/// Outcome of a conditional manifest request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestFetch {
  NotModified,
  Fetched {
    manifest: ManifestResponse,
    /// `None` when the server sent no `ETag`.
    etag: Option<String>,
  },
}

#[async_trait]
pub trait Transport: Send + Sync {
  /// Fetch the device manifest, conditional on `etag` when given.
  async fn fetch_manifest(&self, etag: Option<&str>) -> Result<ManifestFetch, AgentError>;

  /// Fetch raw bytes from a URL named in the manifest (absolute or relative).
  async fn fetch_blob(&self, url: &str) -> Result<Bytes, AgentError>;
}

/// [`Transport`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: String,
  device_id: String,
}

impl HttpTransport {
  pub fn new(base_url: &str, device_id: &str, timeout: Duration) -> Result<Self, AgentError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      device_id: device_id.to_string(),
    })
  }

  pub fn manifest_url(&self) -> String {
    resolve_url(&self.base_url, &manifest_path(&self.device_id))
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn fetch_manifest(&self, etag: Option<&str>) -> Result<ManifestFetch, AgentError> {
    let url = self.manifest_url();
    let mut request = self.client.get(&url).header(ACCEPT, MANIFEST_MEDIA_TYPE);
    if let Some(etag) = etag {
      request = request.header(IF_NONE_MATCH, etag);
    }

    let response = request.send().await?;
    match response.status() {
      StatusCode::NOT_MODIFIED => {
        debug!(url = %url, "manifest not modified");
        Ok(ManifestFetch::NotModified)
      }
      StatusCode::OK => {
        let etag = response
          .headers()
          .get(ETAG)
          .and_then(|v| v.to_str().ok())
          .filter(|v| !v.is_empty())
          .map(str::to_string);
        let body = response.bytes().await?;
        let manifest = serde_json::from_slice(&body)?;
        Ok(ManifestFetch::Fetched { manifest, etag })
      }
      status => Err(AgentError::UnexpectedStatus {
        url,
        status: status.as_u16(),
      }),
    }
  }

  async fn fetch_blob(&self, url: &str) -> Result<Bytes, AgentError> {
    let url = resolve_url(&self.base_url, url);
    let response = self.client.get(&url).send().await?;
    let status = response.status();
    if status != StatusCode::OK {
      return Err(AgentError::UnexpectedStatus {
        url,
        status: status.as_u16(),
      });
    }
    Ok(response.bytes().await?)
  }
}

/// Resolve a possibly relative reference against the base URL.
///
/// Absolute `http(s)` references are returned as is. If the base itself has no
/// scheme the reference is returned unchanged and the request fails later.
pub fn resolve_url(base: &str, reference: &str) -> String {
  if reference.is_empty() || has_http_scheme(reference) || !has_http_scheme(base) {
    return reference.to_string();
  }
  let base = base.trim_end_matches('/');
  if reference.starts_with('/') {
    format!("{base}{reference}")
  } else {
    format!("{base}/{reference}")
  }
}

fn has_http_scheme(url: &str) -> bool {
  url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolves_relative_references() {
    assert_eq!(resolve_url("http://host:8080", "/api/v1/x"), "http://host:8080/api/v1/x");
    assert_eq!(resolve_url("http://host:8080/", "/api/v1/x"), "http://host:8080/api/v1/x");
    assert_eq!(resolve_url("https://host/base", "api/v1/x"), "https://host/base/api/v1/x");
  }

  #[test]
  fn keeps_absolute_and_degenerate_references() {
    assert_eq!(resolve_url("http://host", "https://cdn/x"), "https://cdn/x");
    assert_eq!(resolve_url("http://host", ""), "");
    assert_eq!(resolve_url("host:8080", "/x"), "/x");
  }

  #[test]
  fn manifest_url_uses_device_path() {
    let transport = HttpTransport::new("http://localhost:8080/", "device1", Duration::from_secs(1)).unwrap();
    assert_eq!(
      transport.manifest_url(),
      "http://localhost:8080/api/v1/devices/device1/deployments"
    );
  }
}
