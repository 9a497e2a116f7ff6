//! [`SqliteStore`], the SQLite implementation of [`RecordStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use kir_core::{
  batch::{CommitError, WriteBatch, WriteOp, WriteTarget},
  household::{HouseholdRecord, NewHousehold, Partition},
  related::{IndexEntry, NewRelatedDocument, RelatedCollection, RelatedDocument},
  store::{HouseholdQuery, RecordStore},
};

use crate::{
  Error, Result,
  encode::{
    EncodedHousehold, HOUSEHOLD_COLUMNS, INDEX_COLUMNS, RELATED_COLUMNS, RawHousehold,
    RawIndexEntry, RawRelated, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A KIR registry backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn insert_encoded(&self, row: EncodedHousehold) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO households (
             id, env, no_kp_normalized, fields_json, sets_json,
             created_at, updated_at, merge_history
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            row.id,
            row.env,
            row.no_kp_normalized,
            row.fields_json,
            row.sets_json,
            row.created_at,
            row.updated_at,
            row.merge_history,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Batch application ───────────────────────────────────────────────────────

fn other(e: Error) -> tokio_rusqlite::Error { tokio_rusqlite::Error::Other(Box::new(e)) }

/// Apply one op inside an open transaction.
///
/// Returns `Some(target)` when the op's target is missing or stale; the
/// caller must then abandon the transaction.
fn apply_op(
  tx: &rusqlite::Transaction<'_>,
  op: WriteOp,
) -> std::result::Result<Option<WriteTarget>, tokio_rusqlite::Error> {
  let outcome = match op {
    WriteOp::ExpectHousehold { id, etag } => {
      let raw = tx
        .query_row(
          &format!("SELECT {HOUSEHOLD_COLUMNS} FROM households WHERE id = ?1"),
          rusqlite::params![encode_uuid(id)],
          RawHousehold::from_row,
        )
        .optional()?;
      let current = match raw {
        Some(raw) => Some(
          raw
            .into_household()
            .and_then(|r| Ok(r.etag()?))
            .map_err(other)?,
        ),
        None => None,
      };
      (current.as_deref() != Some(etag.as_str())).then_some(WriteTarget::Household(id))
    }

    // A record without a creation time keeps whatever the row holds, so an
    // unparseable stored value survives the rewrite.
    WriteOp::UpdateHousehold(record) => {
      let row = EncodedHousehold::from_record(&record).map_err(other)?;
      let changed = tx.execute(
        "UPDATE households SET
           env = ?2, no_kp_normalized = ?3, fields_json = ?4, sets_json = ?5,
           created_at = COALESCE(?6, created_at), updated_at = ?7, merge_history = ?8
         WHERE id = ?1",
        rusqlite::params![
          row.id,
          row.env,
          row.no_kp_normalized,
          row.fields_json,
          row.sets_json,
          row.created_at,
          row.updated_at,
          row.merge_history,
        ],
      )?;
      (changed == 0).then_some(WriteTarget::Household(record.id))
    }

    WriteOp::DeleteHousehold { id } => {
      let changed = tx.execute(
        "DELETE FROM households WHERE id = ?1",
        rusqlite::params![encode_uuid(id)],
      )?;
      (changed == 0).then_some(WriteTarget::Household(id))
    }

    WriteOp::RelinkRelated { id, kir_id, merge_note, updated_at } => {
      let changed = tx.execute(
        "UPDATE related_documents
           SET kir_id = ?2, merge_note = ?3, updated_at = ?4
         WHERE id = ?1",
        rusqlite::params![
          encode_uuid(id),
          encode_uuid(kir_id),
          merge_note,
          encode_dt(updated_at),
        ],
      )?;
      (changed == 0).then_some(WriteTarget::RelatedDocument(id))
    }

    WriteOp::DeleteIndexEntry { id } => {
      let changed = tx.execute(
        "DELETE FROM index_nokp WHERE id = ?1",
        rusqlite::params![encode_uuid(id)],
      )?;
      (changed == 0).then_some(WriteTarget::IndexEntry(id))
    }

    WriteOp::PutIndexEntry { partition, normalized_key, kir_id } => {
      upsert_index_entry(tx, partition.as_str(), &normalized_key, kir_id)?;
      None
    }
  };
  Ok(outcome)
}

fn upsert_index_entry(
  conn: &rusqlite::Connection,
  env: &str,
  normalized_key: &str,
  kir_id: Uuid,
) -> rusqlite::Result<usize> {
  conn.execute(
    "INSERT INTO index_nokp (id, env, no_kp_normalized, kir_id, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT (env, no_kp_normalized)
       DO UPDATE SET kir_id = excluded.kir_id, updated_at = excluded.updated_at",
    rusqlite::params![
      encode_uuid(Uuid::new_v4()),
      env,
      normalized_key,
      encode_uuid(kir_id),
      encode_dt(Utc::now()),
    ],
  )
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  // ── Households ────────────────────────────────────────────────────────────

  async fn insert_household(&self, input: NewHousehold) -> Result<HouseholdRecord> {
    let now = Utc::now();
    let record = HouseholdRecord {
      id:            Uuid::new_v4(),
      partition:     input.partition,
      fields:        input.fields,
      sets:          input.sets,
      created_at:    Some(input.created_at.unwrap_or(now)),
      updated_at:    Some(now),
      merge_history: Vec::new(),
    };

    self.insert_encoded(EncodedHousehold::from_record(&record)?).await?;
    Ok(record)
  }

  async fn get_household(&self, id: Uuid) -> Result<Option<HouseholdRecord>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawHousehold> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {HOUSEHOLD_COLUMNS} FROM households WHERE id = ?1"),
              rusqlite::params![id_str],
              RawHousehold::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawHousehold::into_household).transpose()
  }

  async fn list_households(&self, query: &HouseholdQuery) -> Result<Vec<HouseholdRecord>> {
    let env = query.partition.as_str().to_owned();
    let key = query.normalized_key.clone();

    let raws: Vec<RawHousehold> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(k) = key {
          let mut stmt = conn.prepare(&format!(
            "SELECT {HOUSEHOLD_COLUMNS} FROM households
             WHERE env = ?1 AND no_kp_normalized = ?2"
          ))?;
          stmt
            .query_map(rusqlite::params![env, k], RawHousehold::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!(
            "SELECT {HOUSEHOLD_COLUMNS} FROM households WHERE env = ?1"
          ))?;
          stmt
            .query_map(rusqlite::params![env], RawHousehold::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHousehold::into_household).collect()
  }

  // ── Related documents ─────────────────────────────────────────────────────

  async fn insert_related(&self, input: NewRelatedDocument) -> Result<RelatedDocument> {
    let doc = RelatedDocument {
      id:         Uuid::new_v4(),
      collection: input.collection,
      kir_id:     input.kir_id,
      data:       input.data,
      created_at: Utc::now(),
      updated_at: None,
      merge_note: None,
    };

    let id_str         = encode_uuid(doc.id);
    let collection_str = doc.collection.storage_name();
    let kir_id_str     = encode_uuid(doc.kir_id);
    let data_str       = doc.data.to_string();
    let at_str         = encode_dt(doc.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO related_documents (id, collection, kir_id, data_json, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, collection_str, kir_id_str, data_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(doc)
  }

  async fn related_for(
    &self,
    collection: RelatedCollection,
    kir_id: Uuid,
  ) -> Result<Vec<RelatedDocument>> {
    let collection_str = collection.storage_name();
    let kir_id_str     = encode_uuid(kir_id);

    let raws: Vec<RawRelated> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RELATED_COLUMNS} FROM related_documents
           WHERE collection = ?1 AND kir_id = ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![collection_str, kir_id_str], RawRelated::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRelated::into_related).collect()
  }

  // ── Index ─────────────────────────────────────────────────────────────────

  async fn put_index_entry(
    &self,
    partition: &Partition,
    normalized_key: &str,
    kir_id: Uuid,
  ) -> Result<IndexEntry> {
    let env = partition.as_str().to_owned();
    let key = normalized_key.to_owned();

    let raw: RawIndexEntry = self
      .conn
      .call(move |conn| {
        upsert_index_entry(conn, &env, &key, kir_id)?;
        Ok(conn.query_row(
          &format!(
            "SELECT {INDEX_COLUMNS} FROM index_nokp
             WHERE env = ?1 AND no_kp_normalized = ?2"
          ),
          rusqlite::params![env, key],
          RawIndexEntry::from_row,
        )?)
      })
      .await?;

    raw.into_entry()
  }

  async fn index_entry(
    &self,
    partition: &Partition,
    normalized_key: &str,
  ) -> Result<Option<IndexEntry>> {
    let env = partition.as_str().to_owned();
    let key = normalized_key.to_owned();

    let raw: Option<RawIndexEntry> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {INDEX_COLUMNS} FROM index_nokp
                 WHERE env = ?1 AND no_kp_normalized = ?2"
              ),
              rusqlite::params![env, key],
              RawIndexEntry::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawIndexEntry::into_entry).transpose()
  }

  async fn index_entries_for(&self, kir_id: Uuid) -> Result<Vec<IndexEntry>> {
    let kir_id_str = encode_uuid(kir_id);

    let raws: Vec<RawIndexEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {INDEX_COLUMNS} FROM index_nokp WHERE kir_id = ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![kir_id_str], RawIndexEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIndexEntry::into_entry).collect()
  }

  // ── Batches ───────────────────────────────────────────────────────────────

  async fn commit(&self, batch: WriteBatch) -> Result<(), CommitError<Error>> {
    let op_count = batch.len();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for op in batch {
          if let Some(target) = apply_op(&tx, op)? {
            // Dropping `tx` rolls back everything applied so far.
            return Ok(Err(target));
          }
        }
        tx.commit()?;
        Ok(Ok(()))
      })
      .await
      .map_err(|e| CommitError::Store(Error::Database(e)))?;

    match outcome {
      Ok(()) => {
        tracing::debug!(ops = op_count, "batch committed");
        Ok(())
      }
      Err(target) => {
        tracing::debug!(ops = op_count, %target, "batch rolled back");
        Err(CommitError::Conflict(target))
      }
    }
  }
}
