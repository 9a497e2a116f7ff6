//! The `RecordStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `kir-store-sqlite`).
//! The dedupe engine and the API depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  batch::{CommitError, WriteBatch},
  household::{HouseholdRecord, NewHousehold, Partition},
  related::{IndexEntry, NewRelatedDocument, RelatedCollection, RelatedDocument},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`RecordStore::list_households`].
#[derive(Debug, Clone)]
pub struct HouseholdQuery {
  pub partition:      Partition,
  /// Restrict to records whose normalised `no_kp` equals this key.
  pub normalized_key: Option<String>,
}

impl HouseholdQuery {
  pub fn partition(partition: Partition) -> Self {
    Self { partition, normalized_key: None }
  }

  pub fn with_key(mut self, key: impl Into<String>) -> Self {
    self.normalized_key = Some(key.into());
    self
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a KIR registry backend.
///
/// Single-record writes exist for data entry and imports. Multi-record
/// mutations go through [`RecordStore::commit`], which is all-or-nothing.
/// The store makes no ordering promise for list results.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Households ────────────────────────────────────────────────────────

  /// Persist a new household. The id is assigned by the store.
  fn insert_household(
    &self,
    input: NewHousehold,
  ) -> impl Future<Output = Result<HouseholdRecord, Self::Error>> + Send + '_;

  /// Retrieve a household by id. Returns `None` if not found.
  fn get_household(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<HouseholdRecord>, Self::Error>> + Send + '_;

  /// All households in a partition, optionally filtered by normalised key.
  fn list_households<'a>(
    &'a self,
    query: &'a HouseholdQuery,
  ) -> impl Future<Output = Result<Vec<HouseholdRecord>, Self::Error>> + Send + 'a;

  // ── Related documents ─────────────────────────────────────────────────

  fn insert_related(
    &self,
    input: NewRelatedDocument,
  ) -> impl Future<Output = Result<RelatedDocument, Self::Error>> + Send + '_;

  /// Documents in `collection` whose `kir_id` equals `kir_id`.
  fn related_for(
    &self,
    collection: RelatedCollection,
    kir_id: Uuid,
  ) -> impl Future<Output = Result<Vec<RelatedDocument>, Self::Error>> + Send + '_;

  // ── Index ─────────────────────────────────────────────────────────────

  /// Insert or overwrite the entry for `(partition, normalized_key)`.
  fn put_index_entry<'a>(
    &'a self,
    partition: &'a Partition,
    normalized_key: &'a str,
    kir_id: Uuid,
  ) -> impl Future<Output = Result<IndexEntry, Self::Error>> + Send + 'a;

  fn index_entry<'a>(
    &'a self,
    partition: &'a Partition,
    normalized_key: &'a str,
  ) -> impl Future<Output = Result<Option<IndexEntry>, Self::Error>> + Send + 'a;

  /// Every index entry pointing at `kir_id`, across all keys.
  fn index_entries_for(
    &self,
    kir_id: Uuid,
  ) -> impl Future<Output = Result<Vec<IndexEntry>, Self::Error>> + Send + '_;

  // ── Batches ───────────────────────────────────────────────────────────

  /// Apply every op in `batch` atomically, in order.
  ///
  /// Returns [`CommitError::Conflict`] if any op's target is missing or an
  /// `ExpectHousehold` precondition fails; nothing is applied in that case.
  fn commit(
    &self,
    batch: WriteBatch,
  ) -> impl Future<Output = Result<(), CommitError<Self::Error>>> + Send + '_;
}
