//! Error types for `kir-dedupe`.

use kir_core::{batch::WriteTarget, household::Partition};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The group cannot be merged as given; nothing was written.
  #[error("invalid group: {0}")]
  Validation(String),

  /// Merges are destructive and never run against a protected partition.
  #[error("merge is not allowed in protected partition {0}")]
  ForbiddenOperation(Partition),

  /// A member changed or vanished since the scan. Re-scan before retrying.
  #[error("group {key} is stale: {target} changed since the scan")]
  StaleGroup { key: String, target: WriteTarget },

  /// The atomic batch failed; no partial effects are visible.
  #[error("commit failed: {0}")]
  StoreCommit(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("core error: {0}")]
  Core(#[from] kir_core::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Box a backend read error.
pub(crate) fn store_err<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::Store(Box::new(e))
}
