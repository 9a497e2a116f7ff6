//! JSON API for KIR duplicate resolution.
//!
//! Exposes an axum [`Router`] backed by a [`DuplicateResolver`] over any
//! [`RecordStore`]. Auth, TLS, and transport concerns are the caller's
//! responsibility.

pub mod config;
pub mod duplicates;
pub mod error;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use kir_core::store::RecordStore;
use kir_dedupe::DuplicateResolver;
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub resolver: Arc<DuplicateResolver<S>>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self { Self { resolver: Arc::clone(&self.resolver) } }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: RecordStore + 'static,
{
  Router::new()
    .route("/partitions/{env}/duplicates",        get(duplicates::scan::<S>))
    .route("/partitions/{env}/duplicates/stats",  get(duplicates::statistics::<S>))
    .route("/partitions/{env}/duplicates/report", get(duplicates::report::<S>))
    .route("/partitions/{env}/duplicates/{key}",  get(duplicates::details::<S>))
    .route("/duplicates/preview",                 post(duplicates::preview::<S>))
    .route("/duplicates/merge",                   post(duplicates::merge::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
