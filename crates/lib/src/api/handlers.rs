//! Request handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH, LOCATION};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::conditional::{accepts_manifest, etag_matches_any, quote_etag};
use crate::consts::{BUNDLE_MEDIA_TYPE, DESCRIPTOR_CONTENT_TYPE, IMMUTABLE_CACHE_CONTROL, MANIFEST_MEDIA_TYPE};
use crate::manifest::{Deployment, ManifestResponse, deployment_path};
use crate::service::DeploymentService;
use crate::store::StoreError;
use crate::util::digest::Digest;

use super::error::{ApiError, ApiResult};

pub async fn health() -> StatusCode {
  StatusCode::NO_CONTENT
}

pub async fn get_manifest(
  State(service): State<DeploymentService>,
  Path(device_id): Path<String>,
  headers: HeaderMap,
) -> ApiResult<Response> {
  let accept = joined(&headers, ACCEPT);
  if !accepts_manifest(accept.as_deref()) {
    return Err(ApiError::NotAcceptable);
  }

  let manifest = {
    let device_id = device_id.clone();
    blocking(service, move |s| s.get_manifest(&device_id)).await?
  };
  let body = ManifestResponse::from_manifest(&manifest)
    .to_body()
    .map_err(|e| ApiError::Internal(format!("failed to encode manifest: {e}")))?;
  let etag = quote_etag(Digest::compute(&body).as_str());

  if not_modified(&headers, &etag) {
    debug!(device_id = %device_id, version = manifest.version, "manifest not modified");
    return Ok((StatusCode::NOT_MODIFIED, [(ETAG, etag)]).into_response());
  }

  Ok((StatusCode::OK, [(CONTENT_TYPE, MANIFEST_MEDIA_TYPE.to_string()), (ETAG, etag)], body).into_response())
}

pub async fn get_deployment(
  State(service): State<DeploymentService>,
  Path((device_id, deployment_id, digest)): Path<(String, String, String)>,
  headers: HeaderMap,
) -> ApiResult<Response> {
  let digest = Digest::new_unchecked(digest);
  let content = {
    let digest = digest.clone();
    blocking(service, move |s| s.get_deployment(&device_id, &deployment_id, &digest)).await?
  };
  Ok(immutable(&headers, DESCRIPTOR_CONTENT_TYPE, &digest, content))
}

pub async fn get_bundle(
  State(service): State<DeploymentService>,
  Path((device_id, digest)): Path<(String, String)>,
  headers: HeaderMap,
) -> ApiResult<Response> {
  let digest = Digest::new_unchecked(digest);
  let archive = {
    let digest = digest.clone();
    blocking(service, move |s| s.get_bundle(&device_id, &digest)).await?
  };
  Ok(immutable(&headers, BUNDLE_MEDIA_TYPE, &digest, archive))
}

pub async fn create_deployment(
  State(service): State<DeploymentService>,
  Path(device_id): Path<String>,
  body: Bytes,
) -> ApiResult<Response> {
  let deployment = {
    let device_id = device_id.clone();
    blocking(service, move |s| s.create_deployment(&device_id, &body)).await?
  };
  let location = deployment_path(&device_id, deployment.id(), deployment.digest());
  Ok(descriptor_response(StatusCode::CREATED, &deployment, Some(location)))
}

pub async fn update_deployment(
  State(service): State<DeploymentService>,
  Path((device_id, deployment_id)): Path<(String, String)>,
  body: Bytes,
) -> ApiResult<Response> {
  let deployment = blocking(service, move |s| s.update_deployment(&device_id, &deployment_id, &body)).await?;
  Ok(descriptor_response(StatusCode::OK, &deployment, None))
}

pub async fn delete_deployment(
  State(service): State<DeploymentService>,
  Path((device_id, deployment_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
  blocking(service, move |s| s.delete_deployment(&device_id, &deployment_id)).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// Run a store-backed call on the blocking pool.
///
/// The store takes per-device locks, packs bundles and writes to disk, none of
/// which may run on an async worker.
async fn blocking<T, F>(service: DeploymentService, call: F) -> ApiResult<T>
where
  T: Send + 'static,
  F: FnOnce(&DeploymentService) -> Result<T, StoreError> + Send + 'static,
{
  let result = tokio::task::spawn_blocking(move || call(&service))
    .await
    .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?;
  Ok(result?)
}

/// Content-addressed response: validated by its digest and cacheable forever.
fn immutable(headers: &HeaderMap, content_type: &'static str, digest: &Digest, body: Bytes) -> Response {
  let etag = quote_etag(digest.as_str());
  if not_modified(headers, &etag) {
    return (
      StatusCode::NOT_MODIFIED,
      [(ETAG, etag), (CACHE_CONTROL, IMMUTABLE_CACHE_CONTROL.to_string())],
    )
      .into_response();
  }
  (
    StatusCode::OK,
    [
      (CONTENT_TYPE, content_type.to_string()),
      (ETAG, etag),
      (CACHE_CONTROL, IMMUTABLE_CACHE_CONTROL.to_string()),
    ],
    body,
  )
    .into_response()
}

fn descriptor_response(status: StatusCode, deployment: &Deployment, location: Option<String>) -> Response {
  let mut response = (
    status,
    [
      (CONTENT_TYPE, DESCRIPTOR_CONTENT_TYPE.to_string()),
      (ETAG, quote_etag(deployment.digest().as_str())),
    ],
    deployment.descriptor().clone(),
  )
    .into_response();
  if let Some(location) = location
    && let Ok(value) = HeaderValue::from_str(&location)
  {
    response.headers_mut().insert(LOCATION, value);
  }
  response
}

fn not_modified(headers: &HeaderMap, etag: &str) -> bool {
  etag_matches_any(
    etag,
    headers.get_all(IF_NONE_MATCH).iter().filter_map(|v| v.to_str().ok()),
  )
}

/// All occurrences of a header joined into one list value.
fn joined(headers: &HeaderMap, name: HeaderName) -> Option<String> {
  let values: Vec<&str> = headers
    .get_all(name)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .collect();
  (!values.is_empty()).then(|| values.join(","))
}
