//! Resolver tests against an in-memory `SqliteStore`.

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use chrono::{DateTime, TimeZone, Utc};
use kir_core::{
  batch::{CommitError, WriteBatch},
  household::{HouseholdFields, HouseholdRecord, NewHousehold, Partition},
  related::{IndexEntry, NewRelatedDocument, RelatedCollection, RelatedDocument},
  store::{HouseholdQuery, RecordStore},
};
use kir_store_sqlite::SqliteStore;
use strum::IntoEnumIterator as _;
use uuid::Uuid;

use crate::{DuplicateGroup, DuplicateResolver, Error, ResolverConfig};

// ─── Probe store ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
  None,
  /// Fail the commit with a backend error before touching the database.
  Store,
  /// Append a write that cannot apply, so the real transaction rolls back
  /// after every merge op has already run.
  TrailingConflict,
}

#[derive(Debug, thiserror::Error)]
enum ProbeError {
  #[error(transparent)]
  Sqlite(#[from] kir_store_sqlite::Error),
  #[error("injected failure")]
  Injected,
}

/// Counts commits and optionally sabotages them.
struct ProbeStore {
  inner:   SqliteStore,
  commits: AtomicUsize,
  fault:   std::sync::Mutex<Fault>,
}

impl ProbeStore {
  fn fail_with(&self, fault: Fault) {
    if let Ok(mut f) = self.fault.lock() {
      *f = fault;
    }
  }

  fn commits(&self) -> usize { self.commits.load(Ordering::SeqCst) }
}

impl RecordStore for ProbeStore {
  type Error = ProbeError;

  async fn insert_household(&self, input: NewHousehold) -> Result<HouseholdRecord, ProbeError> {
    Ok(self.inner.insert_household(input).await?)
  }

  async fn get_household(&self, id: Uuid) -> Result<Option<HouseholdRecord>, ProbeError> {
    Ok(self.inner.get_household(id).await?)
  }

  async fn list_households(
    &self,
    query: &HouseholdQuery,
  ) -> Result<Vec<HouseholdRecord>, ProbeError> {
    Ok(self.inner.list_households(query).await?)
  }

  async fn insert_related(
    &self,
    input: NewRelatedDocument,
  ) -> Result<RelatedDocument, ProbeError> {
    Ok(self.inner.insert_related(input).await?)
  }

  async fn related_for(
    &self,
    collection: RelatedCollection,
    kir_id: Uuid,
  ) -> Result<Vec<RelatedDocument>, ProbeError> {
    Ok(self.inner.related_for(collection, kir_id).await?)
  }

  async fn put_index_entry(
    &self,
    partition: &Partition,
    normalized_key: &str,
    kir_id: Uuid,
  ) -> Result<IndexEntry, ProbeError> {
    Ok(self.inner.put_index_entry(partition, normalized_key, kir_id).await?)
  }

  async fn index_entry(
    &self,
    partition: &Partition,
    normalized_key: &str,
  ) -> Result<Option<IndexEntry>, ProbeError> {
    Ok(self.inner.index_entry(partition, normalized_key).await?)
  }

  async fn index_entries_for(&self, kir_id: Uuid) -> Result<Vec<IndexEntry>, ProbeError> {
    Ok(self.inner.index_entries_for(kir_id).await?)
  }

  async fn commit(&self, mut batch: WriteBatch) -> Result<(), CommitError<ProbeError>> {
    self.commits.fetch_add(1, Ordering::SeqCst);
    let fault = self.fault.lock().map(|f| *f).unwrap_or(Fault::None);
    match fault {
      Fault::None => {}
      Fault::Store => return Err(CommitError::Store(ProbeError::Injected)),
      Fault::TrailingConflict => {
        batch.delete_household(Uuid::new_v4());
      }
    }
    self.inner.commit(batch).await.map_err(|e| match e {
      CommitError::Conflict(t) => CommitError::Conflict(t),
      CommitError::Store(e) => CommitError::Store(ProbeError::Sqlite(e)),
    })
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

async fn resolver() -> DuplicateResolver<ProbeStore> {
  let inner = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  let store = ProbeStore {
    inner,
    commits: AtomicUsize::new(0),
    fault: std::sync::Mutex::new(Fault::None),
  };
  DuplicateResolver::new(Arc::new(store), ResolverConfig::default())
}

fn dev() -> Partition { Partition::new("dev") }

fn at(secs: i64) -> Option<DateTime<Utc>> { Utc.timestamp_opt(1_700_000_000 + secs, 0).single() }

async fn seed(
  r: &DuplicateResolver<ProbeStore>,
  partition: &Partition,
  fields: HouseholdFields,
  created_at: Option<DateTime<Utc>>,
) -> HouseholdRecord {
  let mut input = NewHousehold::new(partition.clone(), fields);
  input.created_at = created_at;
  r.store().insert_household(input).await.unwrap()
}

fn named(name: &str, no_kp: &str) -> HouseholdFields {
  HouseholdFields {
    name: (!name.is_empty()).then(|| name.to_owned()),
    national_id: Some(no_kp.into()),
    ..Default::default()
  }
}

async fn attach(
  r: &DuplicateResolver<ProbeStore>,
  collection: RelatedCollection,
  kir_id: Uuid,
) -> RelatedDocument {
  r.store()
    .insert_related(NewRelatedDocument {
      collection,
      kir_id,
      data: serde_json::json!({ "nota": "ujian" }),
    })
    .await
    .unwrap()
}

/// Ali (oldest, no occupation) and a later record of the same person typed
/// with dashes, carrying an occupation.
async fn ali_pair(
  r: &DuplicateResolver<ProbeStore>,
) -> (HouseholdRecord, HouseholdRecord) {
  let a = seed(r, &dev(), named("Ali", "010101071234"), at(0)).await;
  let b = seed(
    r,
    &dev(),
    HouseholdFields {
      occupation: Some("Guru".into()),
      ..named("", "01-0101-07-1234")
    },
    at(60),
  )
  .await;
  (a, b)
}

async fn only_group(r: &DuplicateResolver<ProbeStore>) -> DuplicateGroup {
  let mut groups = r.scan(&dev()).await.unwrap();
  assert_eq!(groups.len(), 1);
  groups.remove(0)
}

// ─── Scan ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scan_groups_by_normalized_key() {
  let r = resolver().await;
  let (a, b) = ali_pair(&r).await;
  seed(&r, &dev(), named("Abu", "999999999999"), at(5)).await;

  let group = only_group(&r).await;
  assert_eq!(group.normalized_key, "010101071234");
  assert_eq!(group.primary().unwrap().id, a.id);
  assert_eq!(group.duplicates()[0].id, b.id);
}

#[tokio::test]
async fn scan_of_empty_partition_is_not_found() {
  let r = resolver().await;
  let err = r.scan(&dev()).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn scan_without_duplicates_is_empty() {
  let r = resolver().await;
  seed(&r, &dev(), named("Ali", "1"), at(0)).await;
  seed(&r, &dev(), named("Abu", "2"), at(0)).await;
  assert!(r.scan(&dev()).await.unwrap().is_empty());
}

#[tokio::test]
async fn scan_ignores_other_partitions() {
  let r = resolver().await;
  seed(&r, &dev(), named("Ali", "1"), at(0)).await;
  seed(&r, &Partition::new("staging"), named("Ali", "1"), at(1)).await;
  assert!(r.scan(&dev()).await.unwrap().is_empty());
}

#[tokio::test]
async fn scan_is_deterministic() {
  let r = resolver().await;
  for key in ["3", "1", "2"] {
    seed(&r, &dev(), named("X", key), at(1)).await;
    seed(&r, &dev(), named("Y", key), at(1)).await;
  }

  let first = r.scan(&dev()).await.unwrap();
  let second = r.scan(&dev()).await.unwrap();
  let ids = |gs: &[DuplicateGroup]| -> Vec<Vec<Uuid>> {
    gs.iter().map(|g| g.members.iter().map(|m| m.id).collect()).collect()
  };
  assert_eq!(ids(&first), ids(&second));
  let keys: Vec<_> = first.iter().map(|g| g.normalized_key.clone()).collect();
  assert_eq!(keys, ["1", "2", "3"]);
}

// ─── Merge ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn merge_folds_duplicate_into_oldest() {
  let r = resolver().await;
  let (a, b) = ali_pair(&r).await;
  let doc = attach(&r, RelatedCollection::Education, b.id).await;
  r.store().put_index_entry(&dev(), "010101071234", b.id).await.unwrap();

  let group = only_group(&r).await;
  let result = r.merge(&group).await.unwrap();

  assert_eq!(result.primary_id, a.id);
  assert_eq!(result.merged_count, 1);
  assert_eq!(result.merged_ids, vec![b.id]);
  assert_eq!(result.rewritten_references, 1);
  assert_eq!(result.removed_index_entries, 1);
  assert!(result.conflicts.is_empty());

  let survivor = r.store().get_household(a.id).await.unwrap().unwrap();
  assert_eq!(survivor.fields.name.as_deref(), Some("Ali"));
  assert_eq!(survivor.fields.occupation.as_deref(), Some("Guru"));
  assert_eq!(survivor.merge_history.len(), 1);
  assert_eq!(survivor.merge_history[0].merged_records, vec![b.id]);
  assert_eq!(survivor.merge_history[0].merge_count, 1);
  assert!(survivor.updated_at > a.updated_at);

  assert!(r.store().get_household(b.id).await.unwrap().is_none());

  let moved = r.store().related_for(RelatedCollection::Education, a.id).await.unwrap();
  assert_eq!(moved.len(), 1);
  assert_eq!(moved[0].id, doc.id);
  assert_eq!(
    moved[0].merge_note.as_deref(),
    Some(format!("rewritten from {} to {} during merge", b.id, a.id).as_str())
  );

  assert!(r.scan(&dev()).await.unwrap().is_empty());
}

#[tokio::test]
async fn merge_leaves_no_dangling_references() {
  let r = resolver().await;
  let a = seed(&r, &dev(), named("Ali", "5"), at(0)).await;
  let b = seed(&r, &dev(), named("Ali", "5"), at(1)).await;
  let c = seed(&r, &dev(), named("Ali", "5"), at(2)).await;
  for collection in RelatedCollection::iter() {
    attach(&r, collection, b.id).await;
    attach(&r, collection, c.id).await;
  }
  attach(&r, RelatedCollection::Kafa, a.id).await;

  let result = r.merge(&only_group(&r).await).await.unwrap();
  let collections = RelatedCollection::iter().count();
  assert_eq!(result.rewritten_references, 2 * collections);

  for collection in RelatedCollection::iter() {
    for gone in [b.id, c.id] {
      assert!(r.store().related_for(collection, gone).await.unwrap().is_empty());
    }
    let expected = if collection == RelatedCollection::Kafa { 3 } else { 2 };
    assert_eq!(r.store().related_for(collection, a.id).await.unwrap().len(), expected);
  }
}

#[tokio::test]
async fn index_points_at_survivor_only() {
  let r = resolver().await;
  let (a, b) = ali_pair(&r).await;
  r.store().put_index_entry(&dev(), "010101071234", b.id).await.unwrap();
  // A stale entry under a mistyped key.
  r.store().put_index_entry(&dev(), "0101010712", b.id).await.unwrap();

  let result = r.merge(&only_group(&r).await).await.unwrap();
  assert_eq!(result.removed_index_entries, 2);

  let entry = r.store().index_entry(&dev(), "010101071234").await.unwrap().unwrap();
  assert_eq!(entry.kir_id, a.id);
  assert!(r.store().index_entry(&dev(), "0101010712").await.unwrap().is_none());
  assert!(r.store().index_entries_for(b.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn merge_creates_missing_index_entry() {
  let r = resolver().await;
  let (a, _) = ali_pair(&r).await;

  r.merge(&only_group(&r).await).await.unwrap();
  let entry = r.store().index_entry(&dev(), "010101071234").await.unwrap().unwrap();
  assert_eq!(entry.kir_id, a.id);
}

#[tokio::test]
async fn merge_reports_conflicting_values() {
  let r = resolver().await;
  let a = seed(
    &r,
    &dev(),
    HouseholdFields { phone: Some("012-1111111".into()), ..named("Ali", "7") },
    at(0),
  )
  .await;
  let b = seed(
    &r,
    &dev(),
    HouseholdFields { phone: Some("019-2222222".into()), ..named("Ali", "7") },
    at(1),
  )
  .await;

  let result = r.merge(&only_group(&r).await).await.unwrap();
  assert_eq!(result.conflicts.len(), 1);
  let conflict = &result.conflicts[0];
  assert_eq!(conflict.field, "no_telefon");
  assert_eq!(conflict.kept, "012-1111111");
  assert_eq!(conflict.kept_from, a.id);
  assert_eq!(conflict.discarded[0].record_id, b.id);

  let survivor = r.store().get_household(a.id).await.unwrap().unwrap();
  assert_eq!(survivor.fields.phone.as_deref(), Some("012-1111111"));
}

#[tokio::test]
async fn merge_reorders_members_by_age() {
  let r = resolver().await;
  let (a, b) = ali_pair(&r).await;
  let mut group = only_group(&r).await;
  group.members.reverse();

  let result = r.merge(&group).await.unwrap();
  assert_eq!(result.primary_id, a.id);
  assert_eq!(result.merged_ids, vec![b.id]);
}

#[tokio::test]
async fn repeated_merges_accumulate_history() {
  let r = resolver().await;
  let a = seed(&r, &dev(), named("Ali", "8"), at(0)).await;
  seed(&r, &dev(), named("Ali", "8"), at(1)).await;
  r.merge(&only_group(&r).await).await.unwrap();

  seed(&r, &dev(), named("Ali", "8"), at(2)).await;
  r.merge(&only_group(&r).await).await.unwrap();

  let survivor = r.store().get_household(a.id).await.unwrap().unwrap();
  assert_eq!(survivor.merge_history.len(), 2);
}

// ─── Merge failures ──────────────────────────────────────────────────────────

#[tokio::test]
async fn protected_partition_is_refused_without_writes() {
  let r = resolver().await;
  let prod = Partition::new("production");
  seed(&r, &prod, named("Ali", "1"), at(0)).await;
  seed(&r, &prod, named("Ali", "1"), at(1)).await;

  let group = r.scan(&prod).await.unwrap().remove(0);
  let err = r.merge(&group).await.unwrap_err();

  assert!(matches!(err, Error::ForbiddenOperation(p) if p == prod));
  assert_eq!(r.store().commits(), 0);
  assert_eq!(r.scan(&prod).await.unwrap()[0].len(), 2);
}

#[tokio::test]
async fn preview_is_allowed_in_protected_partition() {
  let r = resolver().await;
  let prod = Partition::new("production");
  seed(&r, &prod, named("Ali", "1"), at(0)).await;
  seed(&r, &prod, named("Ali", "1"), at(1)).await;

  let group = r.scan(&prod).await.unwrap().remove(0);
  r.preview(&group).await.unwrap();
  assert_eq!(r.store().commits(), 0);
}

#[tokio::test]
async fn stale_group_is_rejected() {
  let r = resolver().await;
  let (a, b) = ali_pair(&r).await;
  let group = only_group(&r).await;

  let mut delete = WriteBatch::new();
  delete.delete_household(b.id);
  r.store().commit(delete).await.unwrap();

  let err = r.merge(&group).await.unwrap_err();
  assert!(matches!(err, Error::StaleGroup { ref key, .. } if key == "010101071234"));
  assert_eq!(r.store().get_household(a.id).await.unwrap().unwrap(), a);
}

#[tokio::test]
async fn edited_member_makes_group_stale() {
  let r = resolver().await;
  let (_, b) = ali_pair(&r).await;
  let group = only_group(&r).await;

  let mut edited = b.clone();
  edited.fields.phone = Some("013-0000000".into());
  let mut edit = WriteBatch::new();
  edit.update_household(edited);
  r.store().commit(edit).await.unwrap();

  assert!(matches!(r.merge(&group).await, Err(Error::StaleGroup { .. })));
  assert!(r.store().get_household(b.id).await.unwrap().is_some());
}

#[tokio::test]
async fn store_failure_surfaces_as_commit_error() {
  let r = resolver().await;
  let (a, b) = ali_pair(&r).await;
  r.store().fail_with(Fault::Store);

  let err = r.merge(&only_group(&r).await).await.unwrap_err();
  assert!(matches!(err, Error::StoreCommit(_)));
  assert_eq!(r.store().get_household(a.id).await.unwrap().unwrap(), a);
  assert!(r.store().get_household(b.id).await.unwrap().is_some());
}

#[tokio::test]
async fn failure_at_last_write_leaves_no_partial_effects() {
  let r = resolver().await;
  let (a, b) = ali_pair(&r).await;
  let doc = attach(&r, RelatedCollection::Spouse, b.id).await;
  let entry = r.store().put_index_entry(&dev(), "010101071234", b.id).await.unwrap();
  r.store().fail_with(Fault::TrailingConflict);

  assert!(r.merge(&only_group(&r).await).await.is_err());

  assert_eq!(r.store().get_household(a.id).await.unwrap().unwrap(), a);
  assert_eq!(r.store().get_household(b.id).await.unwrap().unwrap(), b);
  let docs = r.store().related_for(RelatedCollection::Spouse, b.id).await.unwrap();
  assert_eq!(docs.len(), 1);
  assert_eq!(docs[0].id, doc.id);
  assert!(docs[0].merge_note.is_none());
  assert_eq!(r.store().index_entry(&dev(), "010101071234").await.unwrap(), Some(entry));
}

#[tokio::test]
async fn malformed_groups_are_validation_errors() {
  let r = resolver().await;
  let (a, b) = ali_pair(&r).await;
  let other = seed(&r, &dev(), named("Abu", "2"), at(3)).await;
  let group = only_group(&r).await;

  let single = DuplicateGroup { members: vec![a.clone()], ..group.clone() };
  assert!(matches!(r.merge(&single).await, Err(Error::Validation(_))));

  let empty = DuplicateGroup { members: vec![], ..group.clone() };
  assert!(matches!(r.merge(&empty).await, Err(Error::NotFound(_))));

  let mixed = DuplicateGroup { members: vec![a.clone(), other], ..group.clone() };
  assert!(matches!(r.merge(&mixed).await, Err(Error::Validation(_))));

  let repeated = DuplicateGroup { members: vec![a.clone(), a.clone()], ..group.clone() };
  assert!(matches!(r.merge(&repeated).await, Err(Error::Validation(_))));

  let mut moved = b.clone();
  moved.partition = Partition::new("staging");
  let cross = DuplicateGroup { members: vec![a, moved], ..group };
  assert!(matches!(r.merge(&cross).await, Err(Error::Validation(_))));

  assert_eq!(r.store().commits(), 0);
}

// ─── Preview & reporting ─────────────────────────────────────────────────────

#[tokio::test]
async fn preview_matches_merge_without_writing() {
  let r = resolver().await;
  let (a, b) = ali_pair(&r).await;
  attach(&r, RelatedCollection::Children, b.id).await;
  attach(&r, RelatedCollection::Children, b.id).await;
  attach(&r, RelatedCollection::Health, b.id).await;
  r.store().put_index_entry(&dev(), "010101071234", b.id).await.unwrap();

  let group = only_group(&r).await;
  let preview = r.preview(&group).await.unwrap();

  assert_eq!(preview.merged.id, a.id);
  assert_eq!(preview.merged.fields.occupation.as_deref(), Some("Guru"));
  assert_eq!(preview.duplicate_ids, vec![b.id]);
  assert_eq!(preview.rewritten_references.get(&RelatedCollection::Children), Some(&2));
  assert_eq!(preview.rewritten_references.get(&RelatedCollection::Health), Some(&1));
  assert_eq!(preview.removed_index_entries, 1);

  assert_eq!(r.store().commits(), 0);
  assert!(r.store().get_household(b.id).await.unwrap().is_some());

  // The group is still current after a preview.
  r.merge(&group).await.unwrap();
}

#[tokio::test]
async fn group_details_normalize_the_requested_key() {
  let r = resolver().await;
  let (a, b) = ali_pair(&r).await;
  attach(&r, RelatedCollection::Income, b.id).await;

  let details = r.group_details(&dev(), "0101-01-07 1234").await.unwrap();
  assert_eq!(details.normalized_key, "010101071234");
  assert_eq!(details.primary_id, a.id);
  assert_eq!(details.records.len(), 2);
  assert_eq!(details.records[1].record.id, b.id);
  assert_eq!(details.records[1].related_counts.get(&RelatedCollection::Income), Some(&1));
  assert_eq!(details.records[0].related_counts.get(&RelatedCollection::Income), Some(&0));
  assert_eq!(details.records[0].related_counts.len(), RelatedCollection::iter().count());
}

#[tokio::test]
async fn group_details_of_unknown_key_is_not_found() {
  let r = resolver().await;
  ali_pair(&r).await;
  assert!(matches!(r.group_details(&dev(), "42").await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn statistics_and_report_follow_scan() {
  let r = resolver().await;
  ali_pair(&r).await;
  for i in 0..3 {
    seed(&r, &dev(), named("Siti", "880808"), at(i)).await;
  }

  let stats = r.statistics(&dev()).await.unwrap();
  assert_eq!(stats.total_groups, 2);
  assert_eq!(stats.total_duplicate_records, 3);
  assert_eq!(stats.total_records_affected, 5);
  assert_eq!(stats.largest_group.unwrap().normalized_key, "880808");

  let report = r.report(&dev()).await.unwrap();
  assert_eq!(report.total_groups, 2);
  assert_eq!(report.total_records, 5);
  assert_eq!(report.groups[0].normalized_key, "010101071234");
  assert_eq!(report.groups[0].records[0].name.as_deref(), Some("Ali"));
  assert_eq!(report.groups[0].records[1].natural_id_display.as_deref(), Some("01-0101-07-1234"));
}
