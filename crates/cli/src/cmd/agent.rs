//! Implementation of the `fleetsync agent` command.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use fleetsync_lib::agent::{Action, Agent, CycleOutcome};
use fleetsync_lib::config::AgentConfig;

use crate::output::{print_action, print_info, print_stat, print_success, print_warning};

use super::cancel_on_signal;

/// Run the agent loop, or a single cycle with `once`.
pub fn cmd_agent(config: AgentConfig, once: bool) -> Result<()> {
  let config = config.validate()?;
  let mut agent = Agent::from_config(&config).context("failed to start agent")?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  if !once {
    let cancel = CancellationToken::new();
    rt.spawn(cancel_on_signal(cancel.clone()));
    rt.block_on(agent.run(cancel));
    return Ok(());
  }

  let report = rt.block_on(agent.poll()).context("poll failed")?;
  match report.outcome {
    CycleOutcome::NotModified => print_info("Manifest not modified"),
    CycleOutcome::RolledBack { cached, offered } => {
      print_warning(&format!("Rejected manifest version {offered} (cached {cached})"))
    }
    CycleOutcome::Applied { version } => print_success(&format!("Applied manifest version {version}")),
  }

  for action in &report.actions {
    let (name, digest) = match action {
      Action::Deploy { name, digest, .. } | Action::Undeploy { name, digest, .. } => (name, digest),
      Action::Update { name, new_digest, .. } => (name, new_digest),
    };
    print_action(action.kind(), action.deployment_id(), name, digest.as_str());
  }
  if !report.skipped.is_empty() {
    print_stat("Skipped", &report.skipped.join(", "));
  }
  if !report.failed.is_empty() {
    print_stat("Failed", &report.failed.join(", "));
  }
  print_stat("Deployments", &agent.state().deployments.len().to_string());
  Ok(())
}
