//! Shared helpers for end-to-end tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use fleetsync_lib::agent::HttpTransport;
use fleetsync_lib::api;
use fleetsync_lib::service::DeploymentService;
use fleetsync_lib::store::ManifestStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A complete descriptor the server accepts.
pub fn descriptor_yaml(name: &str) -> String {
  format!(
    r#"apiVersion: application.margo.org/v1alpha1
kind: ApplicationDeployment
metadata:
  name: {name}
  namespace: margo
  annotations:
    applicationId: com.example.{name}
spec:
  deploymentProfile:
    type: compose
    components:
      - name: {name}-app
        properties:
          packageLocation: https://registry.example.com/{name}.tar.gz
  parameters:
    greeting:
      value: hello
      targets:
        - pointer: ENV.GREETING
          components: ["{name}-app"]
"#
  )
}

/// Serve `router` on an ephemeral loopback port until dropped.
pub struct Listening {
  pub addr: SocketAddr,
  cancel: CancellationToken,
  handle: Option<JoinHandle<()>>,
}

impl Listening {
  pub async fn start(router: Router) -> Self {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    let handle = tokio::spawn(async move {
      axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .unwrap();
    });
    Self {
      addr,
      cancel,
      handle: Some(handle),
    }
  }

  pub fn base_url(&self) -> String {
    format!("http://{}", self.addr)
  }

  pub fn url(&self, path: &str) -> String {
    format!("{}{path}", self.base_url())
  }

  pub fn transport(&self, device_id: &str) -> HttpTransport {
    HttpTransport::new(&self.base_url(), device_id, Duration::from_secs(5)).unwrap()
  }

  pub async fn stop(mut self) {
    self.cancel.cancel();
    if let Some(handle) = self.handle.take() {
      handle.await.unwrap();
    }
  }
}

impl Drop for Listening {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

/// A manifest server with `devices` registered.
pub struct TestServer {
  pub store: Arc<ManifestStore>,
  pub listening: Listening,
  pub http: reqwest::Client,
}

impl TestServer {
  pub async fn start(devices: &[&str]) -> Self {
    Self::with_store(ManifestStore::in_memory(), devices).await
  }

  pub async fn with_store(store: ManifestStore, devices: &[&str]) -> Self {
    let store = Arc::new(store);
    for device in devices {
      store.register_device(device).unwrap();
    }
    let listening = Listening::start(api::router(DeploymentService::new(store.clone()))).await;
    Self {
      store,
      listening,
      http: reqwest::Client::new(),
    }
  }

  pub fn url(&self, path: &str) -> String {
    self.listening.url(path)
  }

  pub fn transport(&self, device_id: &str) -> HttpTransport {
    self.listening.transport(device_id)
  }

  /// POST a descriptor and return the rendered body the server stored.
  pub async fn create(&self, device_id: &str, yaml: String) -> (reqwest::StatusCode, String) {
    let response = self
      .http
      .post(self.url(&format!("/api/v1/devices/{device_id}/deployments")))
      .header("content-type", "application/yaml")
      .body(yaml)
      .send()
      .await
      .unwrap();
    let status = response.status();
    (status, response.text().await.unwrap())
  }

  pub async fn delete(&self, device_id: &str, deployment_id: &str) -> reqwest::StatusCode {
    self
      .http
      .delete(self.url(&format!("/api/v1/devices/{device_id}/deployments/{deployment_id}")))
      .send()
      .await
      .unwrap()
      .status()
  }
}
