//! Manifest versioning under concurrent writers and across restarts.

use fleetsync_lib::agent::{AgentState, CycleOutcome, poll_once};
use fleetsync_lib::store::ManifestStore;
use tempfile::TempDir;

use super::common::{TestServer, descriptor_yaml};

#[tokio::test]
async fn concurrent_creates_each_bump_the_version_once() {
  let server = TestServer::start(&["device1"]).await;

  let mut tasks = Vec::new();
  for i in 0..8 {
    let http = server.http.clone();
    let url = server.url("/api/v1/devices/device1/deployments");
    tasks.push(tokio::spawn(async move {
      http
        .post(url)
        .body(descriptor_yaml(&format!("app{i}")))
        .send()
        .await
        .unwrap()
        .status()
    }));
  }
  for task in tasks {
    assert_eq!(task.await.unwrap(), reqwest::StatusCode::CREATED);
  }

  let manifest = server.store.get_manifest("device1").unwrap();
  assert_eq!(manifest.version, 9);
  assert_eq!(manifest.deployments.len(), 8);
}

#[tokio::test]
async fn devices_are_isolated() {
  let server = TestServer::start(&["device1", "device2"]).await;
  server.create("device1", descriptor_yaml("web")).await;

  let mut state = AgentState::default();
  let report = poll_once(&server.transport("device2"), &mut state).await.unwrap();
  assert_eq!(report.outcome, CycleOutcome::Applied { version: 1 });
  assert!(state.deployments.is_empty());
}

#[tokio::test]
async fn restarted_server_serves_the_same_manifest() {
  let temp = TempDir::new().unwrap();

  let server = TestServer::with_store(ManifestStore::open(temp.path()).unwrap(), &["device1"]).await;
  server.create("device1", descriptor_yaml("web")).await;
  let mut state = AgentState::default();
  poll_once(&server.transport("device1"), &mut state).await.unwrap();
  server.listening.stop().await;

  let server = TestServer::with_store(ManifestStore::open(temp.path()).unwrap(), &[]).await;
  let report = poll_once(&server.transport("device1"), &mut state).await.unwrap();
  assert_eq!(report.outcome, CycleOutcome::NotModified);

  let mut fresh = AgentState::default();
  let report = poll_once(&server.transport("device1"), &mut fresh).await.unwrap();
  assert_eq!(report.outcome, CycleOutcome::Applied { version: 2 });
  assert_eq!(fresh.deployments, state.deployments);
}
