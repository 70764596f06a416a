//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("requested media type is not acceptable")]
  NotAcceptable,

  #[error("internal error: {0}")]
  Internal(String),
}

impl ApiError {
  pub fn status_code(&self) -> StatusCode {
    match self {
      Self::Store(e) => match e {
        StoreError::DeviceNotFound(_)
        | StoreError::ManifestNotFound(_)
        | StoreError::DeploymentNotFound(_)
        | StoreError::BundleNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::InvalidDescriptor(_) | StoreError::InvalidDeviceId(_) => StatusCode::BAD_REQUEST,
        StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
      Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
      Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Stable message sent to the caller. Never carries internal detail.
  pub fn message(&self) -> &'static str {
    match self {
      Self::Store(e) => match e {
        StoreError::DeviceNotFound(_) => "Device not found",
        StoreError::ManifestNotFound(_) => "Manifest not found",
        StoreError::DeploymentNotFound(_) => "Deployment not found",
        StoreError::BundleNotFound(_) => "Bundle not found",
        StoreError::InvalidDescriptor(_) => "Invalid deployment descriptor",
        StoreError::InvalidDeviceId(_) => "Invalid device id",
        StoreError::Internal(_) => "Internal server error",
      },
      Self::NotAcceptable => "Not acceptable",
      Self::Internal(_) => "Internal server error",
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    if status.is_server_error() {
      error!(status = status.as_u16(), error = %self, "request failed");
    } else {
      warn!(status = status.as_u16(), error = %self, "request rejected");
    }
    (status, [(CONTENT_TYPE, "text/plain; charset=utf-8")], self.message()).into_response()
  }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn internal_detail_is_not_exposed() {
    let err = ApiError::from(StoreError::Internal("disk on fire at /var/lib".to_string()));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.message(), "Internal server error");
  }

  #[test]
  fn not_found_kinds_map_to_404() {
    for err in [
      StoreError::DeviceNotFound("d".into()),
      StoreError::ManifestNotFound("d".into()),
      StoreError::DeploymentNotFound("x".into()),
      StoreError::BundleNotFound("x".into()),
    ] {
      assert_eq!(ApiError::from(err).status_code(), StatusCode::NOT_FOUND);
    }
  }

  #[test]
  fn invalid_descriptor_is_bad_request() {
    let err = ApiError::from(StoreError::InvalidDescriptor("missing kind".into()));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(err.message(), "Invalid deployment descriptor");
  }
}
