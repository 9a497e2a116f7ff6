//! [`DuplicateResolver`]: scan for and merge duplicate households.

use std::{collections::{BTreeMap, HashSet}, sync::Arc};

use chrono::Utc;
use kir_core::{
  batch::{CommitError, WriteBatch},
  household::{HouseholdRecord, MergeHistory, Partition, normalize_national_id},
  related::{IndexEntry, RelatedCollection, RelatedDocument},
  store::{HouseholdQuery, RecordStore},
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  config::ResolverConfig,
  error::store_err,
  group::{DuplicateGroup, group_records, order_members},
  merge::{FieldConflict, merge_attributes},
  report::{DuplicateReport, DuplicateStatistics, GroupDetails, RecordDetails},
};

// ─── Results ─────────────────────────────────────────────────────────────────

/// Outcome of a committed merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
  pub primary_id:            Uuid,
  pub merged_count:          usize,
  pub merged_ids:            Vec<Uuid>,
  pub rewritten_references:  usize,
  pub removed_index_entries: usize,
  /// Scalar disagreements resolved in favour of the kept value.
  pub conflicts:             Vec<FieldConflict>,
}

/// What a merge would do, computed without writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePreview {
  /// The primary as it would look after the merge.
  pub merged:                HouseholdRecord,
  pub duplicate_ids:         Vec<Uuid>,
  /// Related documents that would be re-pointed, per collection.
  pub rewritten_references:  BTreeMap<RelatedCollection, usize>,
  pub removed_index_entries: usize,
  pub conflicts:             Vec<FieldConflict>,
}

/// A fully-composed merge, ready to commit.
struct MergePlan {
  key:         String,
  merged:      HouseholdRecord,
  duplicates:  Vec<Uuid>,
  relinks:     Vec<RelatedDocument>,
  stale_index: Vec<IndexEntry>,
  conflicts:   Vec<FieldConflict>,
  batch:       WriteBatch,
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Detects and collapses households that share a normalisation key.
///
/// Holds no state between calls beyond its store handle and configuration;
/// construct one per calling context and share it by reference.
pub struct DuplicateResolver<S> {
  store:  Arc<S>,
  config: ResolverConfig,
}

impl<S: RecordStore> DuplicateResolver<S> {
  pub fn new(store: Arc<S>, config: ResolverConfig) -> Self { Self { store, config } }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &ResolverConfig { &self.config }

  // ── Scan ────────────────────────────────────────────────────────────────

  /// Every duplicate group in `partition`, ordered by key.
  ///
  /// Fails with [`Error::NotFound`] when the partition holds no records.
  /// Read-only; the result may be stale as soon as it is returned.
  pub async fn scan(&self, partition: &Partition) -> Result<Vec<DuplicateGroup>> {
    let records = self
      .store
      .list_households(&HouseholdQuery::partition(partition.clone()))
      .await
      .map_err(store_err)?;

    if records.is_empty() {
      return Err(Error::NotFound(format!("partition {partition} has no records")));
    }

    let total = records.len();
    let groups = group_records(partition, records);
    tracing::info!(%partition, records = total, groups = groups.len(), "duplicate scan complete");
    Ok(groups)
  }

  // ── Merge ───────────────────────────────────────────────────────────────

  /// Collapse `group` into its oldest member in one atomic commit.
  ///
  /// The group should come from a recent [`scan`](Self::scan): each member's
  /// state as seen there is a precondition of the commit, so any change in
  /// between surfaces as [`Error::StaleGroup`].
  pub async fn merge(&self, group: &DuplicateGroup) -> Result<MergeResult> {
    self.guard_partition(group)?;
    let plan = self.plan(group).await?;

    tracing::debug!(
      key = %plan.key,
      ops = plan.batch.len(),
      relinks = plan.relinks.len(),
      index_deletes = plan.stale_index.len(),
      "committing merge batch"
    );

    match self.store.commit(plan.batch).await {
      Ok(()) => {}
      Err(CommitError::Conflict(target)) => {
        tracing::warn!(key = %plan.key, %target, "merge aborted: group is stale");
        return Err(Error::StaleGroup { key: plan.key, target });
      }
      Err(CommitError::Store(e)) => {
        tracing::warn!(key = %plan.key, "merge commit failed: {e}");
        return Err(Error::StoreCommit(Box::new(e)));
      }
    }

    tracing::info!(
      key = %plan.key,
      primary = %plan.merged.id,
      merged = plan.duplicates.len(),
      "merge committed"
    );

    Ok(MergeResult {
      primary_id:            plan.merged.id,
      merged_count:          plan.duplicates.len(),
      merged_ids:            plan.duplicates,
      rewritten_references:  plan.relinks.len(),
      removed_index_entries: plan.stale_index.len(),
      conflicts:             plan.conflicts,
    })
  }

  /// Compute what [`merge`](Self::merge) would do without writing anything.
  /// Allowed in protected partitions.
  pub async fn preview(&self, group: &DuplicateGroup) -> Result<MergePreview> {
    let plan = self.plan(group).await?;

    let mut rewritten_references = BTreeMap::new();
    for doc in &plan.relinks {
      *rewritten_references.entry(doc.collection).or_insert(0) += 1;
    }

    Ok(MergePreview {
      merged: plan.merged,
      duplicate_ids: plan.duplicates,
      rewritten_references,
      removed_index_entries: plan.stale_index.len(),
      conflicts: plan.conflicts,
    })
  }

  fn guard_partition(&self, group: &DuplicateGroup) -> Result<()> {
    let protected = std::iter::once(&group.partition)
      .chain(group.members.iter().map(|m| &m.partition))
      .find(|p| self.config.is_protected(p));
    match protected {
      Some(p) => Err(Error::ForbiddenOperation(p.clone())),
      None => Ok(()),
    }
  }

  /// Check the group's shape and return its members in primary-first order.
  fn validate(group: &DuplicateGroup) -> Result<Vec<HouseholdRecord>> {
    if group.is_empty() {
      return Err(Error::NotFound(format!("group {} has no records", group.normalized_key)));
    }
    if group.len() < 2 {
      return Err(Error::Validation(format!(
        "a merge needs at least 2 records, group {} has {}",
        group.normalized_key,
        group.len()
      )));
    }
    if group.members.iter().any(|m| m.partition != group.partition) {
      return Err(Error::Validation(format!(
        "records of group {} span more than one partition",
        group.normalized_key
      )));
    }
    if let Some(m) = group
      .members
      .iter()
      .find(|m| m.normalized_key().as_deref() != Some(group.normalized_key.as_str()))
    {
      return Err(Error::Validation(format!(
        "record {} does not carry key {}",
        m.id, group.normalized_key
      )));
    }
    let mut ids = HashSet::new();
    if let Some(m) = group.members.iter().find(|m| !ids.insert(m.id)) {
      return Err(Error::Validation(format!("record {} appears twice", m.id)));
    }

    let mut members = group.members.clone();
    order_members(&mut members);
    Ok(members)
  }

  async fn plan(&self, group: &DuplicateGroup) -> Result<MergePlan> {
    let members = Self::validate(group)?;
    let (primary, duplicates) = members
      .split_first()
      .ok_or_else(|| Error::Validation("empty group".into()))?;

    let now = Utc::now();
    let (mut merged, conflicts) = merge_attributes(primary, duplicates);
    for c in &conflicts {
      tracing::warn!(
        key = %group.normalized_key,
        field = %c.field,
        kept = %c.kept,
        discarded = c.discarded.len(),
        "conflicting values; keeping first non-empty"
      );
    }

    let duplicate_ids: Vec<Uuid> = duplicates.iter().map(|d| d.id).collect();
    merged.updated_at = Some(now);
    merged.merge_history.push(MergeHistory {
      merged_at:      now,
      merged_records: duplicate_ids.clone(),
      merge_count:    duplicate_ids.len(),
    });

    let mut relinks = Vec::new();
    for collection in RelatedCollection::iter() {
      for dup in duplicates {
        let docs = self
          .store
          .related_for(collection, dup.id)
          .await
          .map_err(store_err)?;
        relinks.extend(docs);
      }
    }

    let mut stale_index = Vec::new();
    for dup in duplicates {
      let entries = self
        .store
        .index_entries_for(dup.id)
        .await
        .map_err(store_err)?;
      stale_index.extend(entries);
    }

    let mut batch = WriteBatch::new();
    for member in &members {
      batch.expect_household(member.id, member.etag()?);
    }
    batch.update_household(merged.clone());
    for doc in &relinks {
      batch.relink_related(
        doc.id,
        primary.id,
        format!("rewritten from {} to {} during merge", doc.kir_id, primary.id),
        now,
      );
    }
    for entry in &stale_index {
      batch.delete_index_entry(entry.id);
    }
    batch.put_index_entry(
      group.partition.clone(),
      group.normalized_key.clone(),
      primary.id,
    );
    for id in &duplicate_ids {
      batch.delete_household(*id);
    }

    Ok(MergePlan {
      key: group.normalized_key.clone(),
      merged,
      duplicates: duplicate_ids,
      relinks,
      stale_index,
      conflicts,
      batch,
    })
  }

  // ── Reporting ───────────────────────────────────────────────────────────

  /// Every household in `partition` whose national ID normalises to `key`,
  /// oldest first, with per-collection related-document counts.
  pub async fn group_details(&self, partition: &Partition, key: &str) -> Result<GroupDetails> {
    let key = normalize_national_id(key);
    let mut records = self
      .store
      .list_households(&HouseholdQuery::partition(partition.clone()).with_key(key.clone()))
      .await
      .map_err(store_err)?;
    order_members(&mut records);

    let primary_id = records
      .first()
      .map(|r| r.id)
      .ok_or_else(|| Error::NotFound(format!("no records with key {key} in {partition}")))?;

    let mut details = Vec::with_capacity(records.len());
    for record in records {
      let mut related_counts = BTreeMap::new();
      for collection in RelatedCollection::iter() {
        let n = self
          .store
          .related_for(collection, record.id)
          .await
          .map_err(store_err)?
          .len();
        related_counts.insert(collection, n);
      }
      details.push(RecordDetails { record, related_counts });
    }

    Ok(GroupDetails {
      normalized_key: key,
      partition: partition.clone(),
      primary_id,
      records: details,
    })
  }

  pub async fn statistics(&self, partition: &Partition) -> Result<DuplicateStatistics> {
    let groups = self.scan(partition).await?;
    Ok(DuplicateStatistics::from_groups(&groups))
  }

  /// Scan `partition` and render the result as an export report.
  pub async fn report(&self, partition: &Partition) -> Result<DuplicateReport> {
    let groups = self.scan(partition).await?;
    Ok(DuplicateReport::new(&groups, Utc::now()))
  }
}
