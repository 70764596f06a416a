//! Server and agent configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("base url must start with http:// or https://, got '{0}'")]
  InvalidBaseUrl(String),

  #[error("device id must not be empty")]
  EmptyDeviceId,

  #[error("{0} must be greater than zero")]
  ZeroDuration(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
  pub bind_address: SocketAddr,
  /// Persist manifests and blobs here. `None` keeps everything in memory.
  pub data_dir: Option<PathBuf>,
  /// Devices registered at startup.
  pub devices: Vec<String>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
      data_dir: None,
      devices: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
  pub base_url: String,
  pub device_id: String,
  pub poll_interval: Duration,
  pub request_timeout: Duration,
  /// Where the cache survives restarts. `None` keeps it for the process lifetime.
  pub state_path: Option<PathBuf>,
}

impl Default for AgentConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8080".to_string(),
      device_id: String::new(),
      poll_interval: Duration::from_secs(30),
      request_timeout: Duration::from_secs(15),
      state_path: None,
    }
  }
}

impl AgentConfig {
  /// Check the configuration and normalize the base url.
  pub fn validate(mut self) -> Result<Self, ConfigError> {
    if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
      return Err(ConfigError::InvalidBaseUrl(self.base_url));
    }
    let trimmed = self.base_url.trim_end_matches('/').len();
    self.base_url.truncate(trimmed);

    if self.device_id.trim().is_empty() {
      return Err(ConfigError::EmptyDeviceId);
    }
    if self.poll_interval.is_zero() {
      return Err(ConfigError::ZeroDuration("poll interval"));
    }
    if self.request_timeout.is_zero() {
      return Err(ConfigError::ZeroDuration("request timeout"));
    }
    Ok(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn agent(base_url: &str) -> AgentConfig {
    AgentConfig {
      base_url: base_url.to_string(),
      device_id: "device1".to_string(),
      ..Default::default()
    }
  }

  #[test]
  fn defaults() {
    let server = ServerConfig::default();
    assert_eq!(server.bind_address.to_string(), "127.0.0.1:8080");
    assert!(server.data_dir.is_none());

    let agent = AgentConfig::default();
    assert_eq!(agent.poll_interval, Duration::from_secs(30));
    assert_eq!(agent.request_timeout, Duration::from_secs(15));
  }

  #[test]
  fn trims_trailing_slashes() {
    let config = agent("https://fleet.example.com//").validate().unwrap();
    assert_eq!(config.base_url, "https://fleet.example.com");
  }

  #[test]
  fn rejects_bad_values() {
    assert_eq!(
      agent("fleet.example.com").validate(),
      Err(ConfigError::InvalidBaseUrl("fleet.example.com".to_string()))
    );

    let mut config = agent("http://localhost:8080");
    config.device_id = " ".to_string();
    assert_eq!(config.validate(), Err(ConfigError::EmptyDeviceId));

    let mut config = agent("http://localhost:8080");
    config.poll_interval = Duration::ZERO;
    assert_eq!(config.validate(), Err(ConfigError::ZeroDuration("poll interval")));
  }
}
