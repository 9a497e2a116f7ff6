//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Attribute groups, payloads
//! and audit trails are stored as compact JSON. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use kir_core::{
  household::{HouseholdFields, HouseholdRecord, HouseholdSets, MergeHistory, Partition},
  related::{IndexEntry, RelatedCollection, RelatedDocument},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Decode an optional household timestamp. Legacy rows may carry garbage in
/// these columns; such values decode to `None` instead of failing the read.
fn decode_dt_lenient(s: Option<&str>, column: &str, id: &str) -> Option<DateTime<Utc>> {
  let raw = s?;
  match decode_dt(raw) {
    Ok(dt) => Some(dt),
    Err(e) => {
      tracing::warn!(household = id, column, value = raw, "unreadable timestamp: {e}");
      None
    }
  }
}

// ─── Households ──────────────────────────────────────────────────────────────

pub const HOUSEHOLD_COLUMNS: &str =
  "id, env, fields_json, sets_json, created_at, updated_at, merge_history";

/// Column values for one `households` row, ready to bind.
pub struct EncodedHousehold {
  pub id:               String,
  pub env:              String,
  pub no_kp_normalized: Option<String>,
  pub fields_json:      String,
  pub sets_json:        String,
  pub created_at:       Option<String>,
  pub updated_at:       Option<String>,
  pub merge_history:    String,
}

impl EncodedHousehold {
  pub fn from_record(record: &HouseholdRecord) -> Result<Self> {
    Ok(Self {
      id:               encode_uuid(record.id),
      env:              record.partition.as_str().to_owned(),
      no_kp_normalized: record.normalized_key(),
      fields_json:      serde_json::to_string(&record.fields)?,
      sets_json:        serde_json::to_string(&record.sets)?,
      created_at:       record.created_at.map(encode_dt),
      updated_at:       record.updated_at.map(encode_dt),
      merge_history:    serde_json::to_string(&record.merge_history)?,
    })
  }
}

/// Raw strings read directly from a `households` row.
pub struct RawHousehold {
  pub id:            String,
  pub env:           String,
  pub fields_json:   String,
  pub sets_json:     String,
  pub created_at:    Option<String>,
  pub updated_at:    Option<String>,
  pub merge_history: String,
}

impl RawHousehold {
  /// Row mapper for a `SELECT {HOUSEHOLD_COLUMNS}` query.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      env:           row.get(1)?,
      fields_json:   row.get(2)?,
      sets_json:     row.get(3)?,
      created_at:    row.get(4)?,
      updated_at:    row.get(5)?,
      merge_history: row.get(6)?,
    })
  }

  pub fn into_household(self) -> Result<HouseholdRecord> {
    let fields: HouseholdFields = serde_json::from_str(&self.fields_json)?;
    let sets: HouseholdSets = serde_json::from_str(&self.sets_json)?;
    let merge_history: Vec<MergeHistory> = serde_json::from_str(&self.merge_history)?;

    Ok(HouseholdRecord {
      id: decode_uuid(&self.id)?,
      created_at: decode_dt_lenient(self.created_at.as_deref(), "created_at", &self.id),
      updated_at: decode_dt_lenient(self.updated_at.as_deref(), "updated_at", &self.id),
      partition: Partition::new(self.env),
      fields,
      sets,
      merge_history,
    })
  }
}

// ─── Related documents ───────────────────────────────────────────────────────

pub const RELATED_COLUMNS: &str =
  "id, collection, kir_id, data_json, created_at, updated_at, merge_note";

/// Raw strings read directly from a `related_documents` row.
pub struct RawRelated {
  pub id:         String,
  pub collection: String,
  pub kir_id:     String,
  pub data_json:  String,
  pub created_at: String,
  pub updated_at: Option<String>,
  pub merge_note: Option<String>,
}

impl RawRelated {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      collection: row.get(1)?,
      kir_id:     row.get(2)?,
      data_json:  row.get(3)?,
      created_at: row.get(4)?,
      updated_at: row.get(5)?,
      merge_note: row.get(6)?,
    })
  }

  pub fn into_related(self) -> Result<RelatedDocument> {
    Ok(RelatedDocument {
      id:         decode_uuid(&self.id)?,
      collection: RelatedCollection::from_storage_name(&self.collection)?,
      kir_id:     decode_uuid(&self.kir_id)?,
      data:       serde_json::from_str(&self.data_json)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: self.updated_at.as_deref().map(decode_dt).transpose()?,
      merge_note: self.merge_note,
    })
  }
}

// ─── Index entries ───────────────────────────────────────────────────────────

pub const INDEX_COLUMNS: &str = "id, env, no_kp_normalized, kir_id, updated_at";

/// Raw strings read directly from an `index_nokp` row.
pub struct RawIndexEntry {
  pub id:               String,
  pub env:              String,
  pub no_kp_normalized: String,
  pub kir_id:           String,
  pub updated_at:       String,
}

impl RawIndexEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      env:              row.get(1)?,
      no_kp_normalized: row.get(2)?,
      kir_id:           row.get(3)?,
      updated_at:       row.get(4)?,
    })
  }

  pub fn into_entry(self) -> Result<IndexEntry> {
    Ok(IndexEntry {
      id:             decode_uuid(&self.id)?,
      partition:      Partition::new(self.env),
      normalized_key: self.no_kp_normalized,
      kir_id:         decode_uuid(&self.kir_id)?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}
