//! ETag computation for household records.
//!
//! An ETag is a SHA-256 hash over the canonical JSON of the whole record.
//! Any change to any attribute, timestamp or audit entry changes the ETag.

use sha2::{Digest, Sha256};

use crate::{Result, household::HouseholdRecord};

/// Compute a quoted, hex-encoded ETag for `record`.
pub fn household_etag(record: &HouseholdRecord) -> Result<String> {
  let canonical = serde_json::to_vec(record)?;
  let hash = Sha256::digest(&canonical);
  Ok(format!("\"{}\"", hex::encode(hash)))
}
