//! Handlers for the duplicate-resolution endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/partitions/{env}/duplicates` | 404 if the partition is empty |
//! | `GET`  | `/partitions/{env}/duplicates/stats` | |
//! | `GET`  | `/partitions/{env}/duplicates/report` | Export artifact |
//! | `GET`  | `/partitions/{env}/duplicates/{key}` | Key is normalised server-side |
//! | `POST` | `/duplicates/preview` | Body: a group from a scan |
//! | `POST` | `/duplicates/merge` | Body: a group from a scan; 409 if stale |

use axum::{
  Json,
  extract::{Path, State},
};
use kir_core::{household::Partition, store::RecordStore};
use kir_dedupe::{
  DuplicateGroup,
  report::{DuplicateReport, DuplicateStatistics, GroupDetails},
  resolver::{MergePreview, MergeResult},
};

use crate::{AppState, error::ApiError};

// ─── Scan ─────────────────────────────────────────────────────────────────────

/// `GET /partitions/{env}/duplicates`
pub async fn scan<S: RecordStore>(
  State(state): State<AppState<S>>,
  Path(env): Path<String>,
) -> Result<Json<Vec<DuplicateGroup>>, ApiError> {
  let groups = state.resolver.scan(&Partition::new(env)).await?;
  Ok(Json(groups))
}

/// `GET /partitions/{env}/duplicates/stats`
pub async fn statistics<S: RecordStore>(
  State(state): State<AppState<S>>,
  Path(env): Path<String>,
) -> Result<Json<DuplicateStatistics>, ApiError> {
  let stats = state.resolver.statistics(&Partition::new(env)).await?;
  Ok(Json(stats))
}

/// `GET /partitions/{env}/duplicates/report`
pub async fn report<S: RecordStore>(
  State(state): State<AppState<S>>,
  Path(env): Path<String>,
) -> Result<Json<DuplicateReport>, ApiError> {
  let report = state.resolver.report(&Partition::new(env)).await?;
  Ok(Json(report))
}

/// `GET /partitions/{env}/duplicates/{key}`
pub async fn details<S: RecordStore>(
  State(state): State<AppState<S>>,
  Path((env, key)): Path<(String, String)>,
) -> Result<Json<GroupDetails>, ApiError> {
  let details = state
    .resolver
    .group_details(&Partition::new(env), &key)
    .await?;
  Ok(Json(details))
}

// ─── Merge ────────────────────────────────────────────────────────────────────

/// `POST /duplicates/preview`
pub async fn preview<S: RecordStore>(
  State(state): State<AppState<S>>,
  Json(group): Json<DuplicateGroup>,
) -> Result<Json<MergePreview>, ApiError> {
  let preview = state.resolver.preview(&group).await?;
  Ok(Json(preview))
}

/// `POST /duplicates/merge`
pub async fn merge<S: RecordStore>(
  State(state): State<AppState<S>>,
  Json(group): Json<DuplicateGroup>,
) -> Result<Json<MergeResult>, ApiError> {
  let result = state.resolver.merge(&group).await?;
  Ok(Json(result))
}
