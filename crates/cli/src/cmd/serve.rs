//! Implementation of the `fleetsync serve` command.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use fleetsync_lib::api;
use fleetsync_lib::config::ServerConfig;
use fleetsync_lib::service::DeploymentService;
use fleetsync_lib::store::ManifestStore;

use super::cancel_on_signal;

/// Run the manifest server until SIGINT or SIGTERM.
///
/// Without a data directory everything is kept in memory and lost on exit.
pub fn cmd_serve(config: ServerConfig) -> Result<()> {
  let store = match &config.data_dir {
    Some(dir) => ManifestStore::open(dir).with_context(|| format!("failed to open store at {}", dir.display()))?,
    None => ManifestStore::in_memory(),
  };
  for device in &config.devices {
    store
      .register_device(device)
      .with_context(|| format!("failed to register device '{device}'"))?;
  }
  info!(
    devices = store.device_ids()?.len(),
    persistent = config.data_dir.is_some(),
    "store ready"
  );
  let app = api::router(DeploymentService::new(Arc::new(store)));

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async move {
    let listener = tokio::net::TcpListener::bind(config.bind_address)
      .await
      .with_context(|| format!("failed to bind to {}", config.bind_address))?;
    info!(address = %listener.local_addr()?, "listening");

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));
    axum::serve(listener, app)
      .with_graceful_shutdown(async move { cancel.cancelled().await })
      .await
      .context("server failed")
  })?;

  info!("server stopped");
  Ok(())
}
