//! Grouping households by normalisation key.

use std::collections::BTreeMap;

use kir_core::household::{HouseholdRecord, Partition};
use serde::{Deserialize, Serialize};

/// Households of one partition sharing a normalisation key, oldest first.
///
/// Derived on demand by a scan and never persisted. Once any member is
/// merged or edited the group is stale and must be recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
  pub normalized_key: String,
  pub partition:      Partition,
  /// Ordered by creation time ascending; the first member is the primary.
  pub members:        Vec<HouseholdRecord>,
}

impl DuplicateGroup {
  /// The surviving record: the oldest member.
  pub fn primary(&self) -> Option<&HouseholdRecord> { self.members.first() }

  /// Every member other than the primary.
  pub fn duplicates(&self) -> &[HouseholdRecord] {
    self.members.get(1..).unwrap_or_default()
  }

  pub fn len(&self) -> usize { self.members.len() }

  pub fn is_empty(&self) -> bool { self.members.is_empty() }
}

/// Sort by creation time ascending, ties broken by id. Missing or malformed
/// timestamps sort as the epoch.
pub fn order_members(members: &mut [HouseholdRecord]) {
  members.sort_by(|a, b| {
    a.created_at_or_epoch()
      .cmp(&b.created_at_or_epoch())
      .then_with(|| a.id.cmp(&b.id))
  });
}

/// Group `records` by normalisation key, keeping only keys held by two or
/// more records. Records without a usable national ID are skipped. Groups are
/// returned in key order.
pub fn group_records(
  partition: &Partition,
  records: impl IntoIterator<Item = HouseholdRecord>,
) -> Vec<DuplicateGroup> {
  let mut by_key: BTreeMap<String, Vec<HouseholdRecord>> = BTreeMap::new();
  for record in records {
    if let Some(key) = record.normalized_key() {
      by_key.entry(key).or_default().push(record);
    }
  }

  by_key
    .into_iter()
    .filter(|(_, members)| members.len() > 1)
    .map(|(normalized_key, mut members)| {
      order_members(&mut members);
      DuplicateGroup {
        normalized_key,
        partition: partition.clone(),
        members,
      }
    })
    .collect()
}
