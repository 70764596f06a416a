//! Server and agent converging over HTTP.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::http::header::{CONTENT_TYPE, ETAG};
use axum::routing::get;
use fleetsync_lib::agent::{Action, AgentState, CacheEntry, CycleOutcome, ManifestFetch, Transport, poll_once};
use fleetsync_lib::bundle::{self, BundleFile};
use fleetsync_lib::consts::MANIFEST_MEDIA_TYPE;
use fleetsync_lib::util::Digest;

use super::common::{Listening, TestServer, descriptor_yaml};

async fn fetched(transport: &dyn Transport) -> fleetsync_lib::manifest::ManifestResponse {
  match transport.fetch_manifest(None).await.unwrap() {
    ManifestFetch::Fetched { manifest, .. } => manifest,
    ManifestFetch::NotModified => panic!("unconditional fetch returned 304"),
  }
}

#[tokio::test]
async fn new_device_gets_empty_first_manifest() {
  let server = TestServer::start(&["device1"]).await;
  let transport = server.transport("device1");

  let manifest = fetched(&transport).await;
  assert_eq!(manifest.manifest_version, 1);
  assert!(manifest.bundle.is_none());
  assert!(manifest.deployments.is_empty());

  let mut state = AgentState::default();
  let report = poll_once(&transport, &mut state).await.unwrap();
  assert_eq!(report.outcome, CycleOutcome::Applied { version: 1 });
  assert!(report.actions.is_empty());
  assert!(state.manifest_etag.is_some());
}

#[tokio::test]
async fn created_deployment_is_bundled_and_deployed() {
  let server = TestServer::start(&["device1"]).await;
  let (status, rendered) = server.create("device1", descriptor_yaml("web")).await;
  assert_eq!(status, reqwest::StatusCode::CREATED);

  let transport = server.transport("device1");
  let manifest = fetched(&transport).await;
  assert_eq!(manifest.manifest_version, 2);
  let entry = &manifest.deployments[0];
  assert_eq!(entry.digest, Digest::compute(rendered.as_bytes()));

  let expected = bundle::pack(&[BundleFile::new(
    format!("{}.yaml", entry.deployment_id),
    rendered.as_bytes(),
  )])
  .unwrap();
  assert_eq!(manifest.bundle.unwrap().digest, Digest::compute(&expected));

  let mut state = AgentState::default();
  let report = poll_once(&transport, &mut state).await.unwrap();
  assert_eq!(
    report.actions,
    vec![Action::Deploy {
      deployment_id: entry.deployment_id.clone(),
      application_id: "com.example.web".to_string(),
      name: "web".to_string(),
      digest: entry.digest.clone(),
    }]
  );
  assert!(state.bundle_fetched);
}

#[tokio::test]
async fn unchanged_manifest_is_not_modified() {
  let server = TestServer::start(&["device1"]).await;
  server.create("device1", descriptor_yaml("web")).await;
  let transport = server.transport("device1");

  let mut state = AgentState::default();
  poll_once(&transport, &mut state).await.unwrap();
  let before = state.clone();

  let report = poll_once(&transport, &mut state).await.unwrap();
  assert_eq!(report.outcome, CycleOutcome::NotModified);
  assert!(report.actions.is_empty());
  assert_eq!(state, before);
}

#[tokio::test]
async fn deleted_deployment_is_undeployed() {
  let server = TestServer::start(&["device1"]).await;
  server.create("device1", descriptor_yaml("web")).await;
  let transport = server.transport("device1");

  let mut state = AgentState::default();
  poll_once(&transport, &mut state).await.unwrap();
  let id = state.deployments.keys().next().unwrap().clone();
  let version = state.manifest_version;

  assert_eq!(server.delete("device1", &id).await, reqwest::StatusCode::NO_CONTENT);
  let manifest = fetched(&transport).await;
  assert_eq!(manifest.manifest_version, version + 1);
  assert!(manifest.bundle.is_none());

  let report = poll_once(&transport, &mut state).await.unwrap();
  assert_eq!(report.actions.len(), 1);
  assert!(matches!(&report.actions[0], Action::Undeploy { deployment_id, .. } if *deployment_id == id));
  assert!(state.deployments.is_empty());
}

#[tokio::test]
async fn update_reaches_agent_by_individual_fetch() {
  let server = TestServer::start(&["device1"]).await;
  let (_, rendered) = server.create("device1", descriptor_yaml("web")).await;
  let transport = server.transport("device1");

  let mut state = AgentState::default();
  poll_once(&transport, &mut state).await.unwrap();
  let (id, old) = state.deployments.iter().next().map(|(k, v)| (k.clone(), v.digest.clone())).unwrap();

  let changed = rendered.replace("value: hello", "value: bye");
  let response = server
    .http
    .put(server.url(&format!("/api/v1/devices/device1/deployments/{id}")))
    .body(changed)
    .send()
    .await
    .unwrap();
  assert_eq!(response.status(), reqwest::StatusCode::OK);

  let report = poll_once(&transport, &mut state).await.unwrap();
  assert!(matches!(
    &report.actions[..],
    [Action::Update { old_digest, .. }] if *old_digest == old
  ));
  assert_ne!(state.deployments[&id].digest, old);
}

#[tokio::test]
async fn unsupported_digest_leaves_cached_entry_alone() {
  let blob_fetches = Arc::new(AtomicUsize::new(0));
  let body = r#"{"manifestVersion":7,"bundle":null,"deployments":[{"deploymentId":"a","digest":"md5:deadbeef","url":"/api/v1/devices/device1/deployments/a/md5:deadbeef"}]}"#;
  let counter = blob_fetches.clone();
  let router = Router::new()
    .route(
      "/api/v1/devices/device1/deployments",
      get(move || async move { ([(CONTENT_TYPE, MANIFEST_MEDIA_TYPE), (ETAG, "\"m7\"")], body) }),
    )
    .route(
      "/api/v1/devices/device1/deployments/{id}/{digest}",
      get(move || {
        let counter = counter.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          "unexpected"
        }
      }),
    );
  let listening = Listening::start(router).await;
  let transport = listening.transport("device1");

  let cached = CacheEntry {
    digest: Digest::compute(b"previous"),
    application_id: "com.example.a".to_string(),
    name: "a".to_string(),
  };
  let mut state = AgentState {
    manifest_version: 6,
    bundle_fetched: true,
    deployments: [("a".to_string(), cached.clone())].into(),
    ..Default::default()
  };

  let report = poll_once(&transport, &mut state).await.unwrap();
  assert_eq!(report.outcome, CycleOutcome::Applied { version: 7 });
  assert!(report.actions.is_empty());
  assert_eq!(report.skipped, vec!["a".to_string()]);
  assert_eq!(state.deployments["a"], cached);
  assert_eq!(blob_fetches.load(Ordering::SeqCst), 0);

  listening.stop().await;
}
