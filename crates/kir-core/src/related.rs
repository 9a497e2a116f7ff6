//! Dependent documents and the national-ID secondary index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator as _, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result, household::Partition};

// ─── Collections ─────────────────────────────────────────────────────────────

/// One logical collection of documents that reference a household by
/// `kir_id`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  EnumIter,
  IntoStaticStr,
)]
pub enum RelatedCollection {
  #[serde(rename = "kir_kafa")]
  #[strum(serialize = "kir_kafa")]
  Kafa,
  #[serde(rename = "kir_pendidikan")]
  #[strum(serialize = "kir_pendidikan")]
  Education,
  #[serde(rename = "kir_pekerjaan")]
  #[strum(serialize = "kir_pekerjaan")]
  Employment,
  #[serde(rename = "kir_keluarga")]
  #[strum(serialize = "kir_keluarga")]
  Family,
  #[serde(rename = "kir_kesihatan")]
  #[strum(serialize = "kir_kesihatan")]
  Health,
  #[serde(rename = "kir_pasangan")]
  #[strum(serialize = "kir_pasangan")]
  Spouse,
  #[serde(rename = "kir_anak")]
  #[strum(serialize = "kir_anak")]
  Children,
  #[serde(rename = "kir_pendapatan")]
  #[strum(serialize = "kir_pendapatan")]
  Income,
  #[serde(rename = "kir_perbelanjaan")]
  #[strum(serialize = "kir_perbelanjaan")]
  Expenses,
  #[serde(rename = "kir_bantuan_bulanan")]
  #[strum(serialize = "kir_bantuan_bulanan")]
  MonthlyAid,
  #[serde(rename = "kir_dokumen")]
  #[strum(serialize = "kir_dokumen")]
  Attachments,
}

impl RelatedCollection {
  /// The name stored in the `collection` column.
  pub fn storage_name(self) -> &'static str { self.into() }

  pub fn from_storage_name(name: &str) -> Result<Self> {
    Self::iter()
      .find(|c| c.storage_name() == name)
      .ok_or_else(|| Error::UnknownCollection(name.to_owned()))
  }
}

// ─── RelatedDocument ─────────────────────────────────────────────────────────

/// A dependent record (education, employment, spouse, ...) owned by exactly
/// one household.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedDocument {
  pub id:         Uuid,
  pub collection: RelatedCollection,
  /// Foreign key to [`crate::household::HouseholdRecord::id`].
  pub kir_id:     Uuid,
  /// Category-specific payload; opaque to the registry core.
  pub data:       serde_json::Value,
  pub created_at: DateTime<Utc>,
  pub updated_at: Option<DateTime<Utc>>,
  /// Provenance left behind when a merge moved this document.
  pub merge_note: Option<String>,
}

/// Input to [`crate::store::RecordStore::insert_related`].
#[derive(Debug, Clone)]
pub struct NewRelatedDocument {
  pub collection: RelatedCollection,
  pub kir_id:     Uuid,
  pub data:       serde_json::Value,
}

// ─── IndexEntry ──────────────────────────────────────────────────────────────

/// Secondary index mapping a normalised national ID to a household. At most
/// one entry exists per key per partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
  pub id:             Uuid,
  #[serde(rename = "env")]
  pub partition:      Partition,
  #[serde(rename = "no_kp_normalized")]
  pub normalized_key: String,
  pub kir_id:         Uuid,
  pub updated_at:     DateTime<Utc>,
}
