//! Atomic multi-write batches.
//!
//! A [`WriteBatch`] is a plain description of writes. A store applies it with
//! [`crate::store::RecordStore::commit`]: either every op lands or none does.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::household::{HouseholdRecord, Partition};

// ─── Ops ─────────────────────────────────────────────────────────────────────

/// A single write inside a batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
  /// Precondition: the household exists and its current ETag equals `etag`.
  ExpectHousehold { id: Uuid, etag: String },
  /// Replace the stored state of an existing household.
  UpdateHousehold(Box<HouseholdRecord>),
  DeleteHousehold { id: Uuid },
  /// Point a related document at a different household.
  RelinkRelated {
    id:         Uuid,
    kir_id:     Uuid,
    merge_note: String,
    updated_at: DateTime<Utc>,
  },
  DeleteIndexEntry { id: Uuid },
  /// Insert or overwrite the index entry for `(partition, normalized_key)`.
  PutIndexEntry {
    partition:      Partition,
    normalized_key: String,
    kir_id:         Uuid,
  },
}

/// An ordered list of writes committed as one unit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
  ops: Vec<WriteOp>,
}

impl WriteBatch {
  pub fn new() -> Self { Self::default() }

  pub fn expect_household(&mut self, id: Uuid, etag: String) -> &mut Self {
    self.ops.push(WriteOp::ExpectHousehold { id, etag });
    self
  }

  pub fn update_household(&mut self, record: HouseholdRecord) -> &mut Self {
    self.ops.push(WriteOp::UpdateHousehold(Box::new(record)));
    self
  }

  pub fn delete_household(&mut self, id: Uuid) -> &mut Self {
    self.ops.push(WriteOp::DeleteHousehold { id });
    self
  }

  pub fn relink_related(
    &mut self,
    id: Uuid,
    kir_id: Uuid,
    merge_note: String,
    updated_at: DateTime<Utc>,
  ) -> &mut Self {
    self.ops.push(WriteOp::RelinkRelated { id, kir_id, merge_note, updated_at });
    self
  }

  pub fn delete_index_entry(&mut self, id: Uuid) -> &mut Self {
    self.ops.push(WriteOp::DeleteIndexEntry { id });
    self
  }

  pub fn put_index_entry(
    &mut self,
    partition: Partition,
    normalized_key: String,
    kir_id: Uuid,
  ) -> &mut Self {
    self.ops.push(WriteOp::PutIndexEntry { partition, normalized_key, kir_id });
    self
  }

  pub fn ops(&self) -> &[WriteOp] { &self.ops }

  pub fn len(&self) -> usize { self.ops.len() }

  pub fn is_empty(&self) -> bool { self.ops.is_empty() }
}

impl IntoIterator for WriteBatch {
  type Item = WriteOp;
  type IntoIter = std::vec::IntoIter<WriteOp>;

  fn into_iter(self) -> Self::IntoIter { self.ops.into_iter() }
}

// ─── Commit errors ───────────────────────────────────────────────────────────

/// The row a failed op was aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
  Household(Uuid),
  RelatedDocument(Uuid),
  IndexEntry(Uuid),
}

impl fmt::Display for WriteTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Household(id) => write!(f, "household {id}"),
      Self::RelatedDocument(id) => write!(f, "related document {id}"),
      Self::IndexEntry(id) => write!(f, "index entry {id}"),
    }
  }
}

/// Why a batch was not applied. In every case no op of the batch is visible.
#[derive(Debug, Error)]
pub enum CommitError<E>
where
  E: std::error::Error + 'static,
{
  /// A target no longer exists, or no longer has the expected ETag.
  #[error("{0} changed or no longer exists")]
  Conflict(WriteTarget),

  #[error("store error: {0}")]
  Store(#[source] E),
}
