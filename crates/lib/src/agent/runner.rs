//! The agent's poll loop.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;

use super::error::AgentError;
use super::reconcile::{CycleReport, poll_once};
use super::state::{AgentState, EphemeralState, StateFile, StateStore};
use super::transport::{HttpTransport, Transport};

/// Owns the agent state and drives poll cycles.
pub struct Agent {
  transport: Box<dyn Transport>,
  store: Box<dyn StateStore>,
  state: AgentState,
  poll_interval: Duration,
  /// A changed state that could not be saved yet.
  unsaved: bool,
}

impl Agent {
  /// Build an agent, loading its last saved state.
  pub fn new(
    transport: Box<dyn Transport>,
    store: Box<dyn StateStore>,
    poll_interval: Duration,
  ) -> Result<Self, AgentError> {
    let state = store.load()?;
    debug!(
      version = state.manifest_version,
      deployments = state.deployments.len(),
      "loaded agent state"
    );
    Ok(Self {
      transport,
      store,
      state,
      poll_interval,
      unsaved: false,
    })
  }

  /// Build an HTTP agent from configuration.
  pub fn from_config(config: &AgentConfig) -> Result<Self, AgentError> {
    let transport = HttpTransport::new(&config.base_url, &config.device_id, config.request_timeout)?;
    let store: Box<dyn StateStore> = match &config.state_path {
      Some(path) => Box::new(StateFile::new(path)),
      None => Box::new(EphemeralState),
    };
    Self::new(Box::new(transport), store, config.poll_interval)
  }

  pub fn state(&self) -> &AgentState {
    &self.state
  }

  /// Run one cycle and save the state if it changed.
  ///
  /// A failed save is logged and retried after the next cycle.
  pub async fn poll(&mut self) -> Result<CycleReport, AgentError> {
    let report = poll_once(self.transport.as_ref(), &mut self.state).await?;
    if report.state_changed() || self.unsaved {
      match self.store.save(&self.state) {
        Ok(()) => self.unsaved = false,
        Err(e) => {
          warn!(error = %e, "failed to save agent state");
          self.unsaved = true;
        }
      }
    }
    Ok(report)
  }

  /// Poll until `cancel` fires.
  ///
  /// Cancellation is observed while waiting and during a poll. A poll interrupted
  /// mid-flight has not touched the state yet.
  pub async fn run(mut self, cancel: CancellationToken) {
    info!(interval = %humantime::format_duration(self.poll_interval), "agent started");

    loop {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => break,
        result = self.poll() => {
          if let Err(e) = result {
            warn!(error = %e, "poll failed, retrying next interval");
          }
        }
      }

      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = tokio::time::sleep(self.poll_interval) => {}
      }
    }

    info!(version = self.state.manifest_version, "agent stopped");
  }
}
