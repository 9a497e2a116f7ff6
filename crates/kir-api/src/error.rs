//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Dedupe(#[from] kir_dedupe::Error),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    use kir_dedupe::Error as E;
    match self {
      ApiError::Dedupe(e) => match e {
        E::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        E::ForbiddenOperation(_) => StatusCode::FORBIDDEN,
        E::StaleGroup { .. } => StatusCode::CONFLICT,
        E::NotFound(_) => StatusCode::NOT_FOUND,
        E::StoreCommit(_) | E::Store(_) | E::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!("request failed: {self}");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
