//! HTTP API of the manifest server.
//!
//! Read routes serve manifests, descriptors and bundles with entity tags; write
//! routes create, replace and delete deployments. Everything is mounted under
//! [`API_PREFIX`](crate::consts::API_PREFIX) except `/healthz`.

mod error;
mod handlers;

pub use error::{ApiError, ApiResult};

use axum::Router;
use axum::routing::{get, put};

use crate::consts::API_PREFIX;
use crate::service::DeploymentService;

pub fn router(service: DeploymentService) -> Router {
  let api = Router::new()
    .route(
      "/devices/{device_id}/deployments",
      get(handlers::get_manifest).post(handlers::create_deployment),
    )
    .route(
      "/devices/{device_id}/deployments/{deployment_id}",
      put(handlers::update_deployment).delete(handlers::delete_deployment),
    )
    .route(
      "/devices/{device_id}/deployments/{deployment_id}/{digest}",
      get(handlers::get_deployment),
    )
    .route("/devices/{device_id}/bundles/{digest}", get(handlers::get_bundle));

  Router::new()
    .route("/healthz", get(handlers::health))
    .nest(API_PREFIX, api)
    .with_state(service)
}
