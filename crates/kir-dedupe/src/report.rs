//! Operator-facing summaries of scan results.
//!
//! [`DuplicateReport`] is the JSON export artifact handed to operators for
//! review; it is a reporting side-channel, not a control interface.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kir_core::{
  household::{HouseholdRecord, Partition},
  related::RelatedCollection,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::group::DuplicateGroup;

// ─── Export ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
  pub timestamp:     DateTime<Utc>,
  pub total_groups:  usize,
  pub total_records: usize,
  pub groups:        Vec<ReportGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportGroup {
  /// 1-based position in the scan result.
  pub group_index:    usize,
  pub normalized_key: String,
  pub record_count:   usize,
  pub records:        Vec<ReportRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
  pub id:                  Uuid,
  pub name:                Option<String>,
  /// The national ID as entered, before normalisation.
  pub natural_id_display:  Option<String>,
  pub status:              Option<String>,
  pub created_at:          Option<DateTime<Utc>>,
}

impl From<&HouseholdRecord> for ReportRecord {
  fn from(r: &HouseholdRecord) -> Self {
    Self {
      id:                 r.id,
      name:               r.fields.name.clone(),
      natural_id_display: r.fields.national_id.clone(),
      status:             r.fields.record_status.clone(),
      created_at:         r.created_at,
    }
  }
}

impl DuplicateReport {
  pub fn new(groups: &[DuplicateGroup], timestamp: DateTime<Utc>) -> Self {
    Self {
      timestamp,
      total_groups: groups.len(),
      total_records: groups.iter().map(DuplicateGroup::len).sum(),
      groups: groups
        .iter()
        .enumerate()
        .map(|(i, g)| ReportGroup {
          group_index:    i + 1,
          normalized_key: g.normalized_key.clone(),
          record_count:   g.len(),
          records:        g.members.iter().map(ReportRecord::from).collect(),
        })
        .collect(),
    }
  }
}

// ─── Statistics ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateStatistics {
  pub total_groups:            usize,
  /// Records that a full merge would delete.
  pub total_duplicate_records: usize,
  /// Records belonging to any group, primaries included.
  pub total_records_affected:  usize,
  /// Group size → number of groups of that size.
  pub group_sizes:             BTreeMap<usize, usize>,
  pub largest_group:           Option<LargestGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LargestGroup {
  pub normalized_key: String,
  pub count:          usize,
  pub records:        Vec<(Uuid, Option<String>)>,
}

impl DuplicateStatistics {
  pub fn from_groups(groups: &[DuplicateGroup]) -> Self {
    let mut group_sizes = BTreeMap::new();
    for g in groups {
      *group_sizes.entry(g.len()).or_insert(0) += 1;
    }

    // First group wins ties, matching scan order.
    let largest = groups
      .iter()
      .fold(None::<&DuplicateGroup>, |best, g| match best {
        Some(b) if b.len() >= g.len() => Some(b),
        _ => Some(g),
      });

    Self {
      total_groups: groups.len(),
      total_duplicate_records: groups.iter().map(|g| g.len().saturating_sub(1)).sum(),
      total_records_affected: groups.iter().map(DuplicateGroup::len).sum(),
      group_sizes,
      largest_group: largest.map(|g| LargestGroup {
        normalized_key: g.normalized_key.clone(),
        count:          g.len(),
        records:        g.members.iter().map(|r| (r.id, r.fields.name.clone())).collect(),
      }),
    }
  }
}

// ─── Group details ───────────────────────────────────────────────────────────

/// Every household carrying one key, with its dependent-document counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetails {
  pub normalized_key: String,
  pub partition:      Partition,
  pub primary_id:     Uuid,
  pub records:        Vec<RecordDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDetails {
  pub record:         HouseholdRecord,
  pub related_counts: BTreeMap<RelatedCollection, usize>,
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use kir_core::household::{HouseholdFields, HouseholdSets};

  use super::*;

  fn group(key: &str, size: usize) -> DuplicateGroup {
    DuplicateGroup {
      normalized_key: key.into(),
      partition:      "dev".into(),
      members:        (0..size)
        .map(|i| HouseholdRecord {
          id:            Uuid::new_v4(),
          partition:     "dev".into(),
          fields:        HouseholdFields {
            name:          Some(format!("Rekod {i}")),
            national_id:   Some(key.into()),
            record_status: Some("aktif".into()),
            ..Default::default()
          },
          sets:          HouseholdSets::default(),
          created_at:    Utc.timestamp_opt(i as i64, 0).single(),
          updated_at:    None,
          merge_history: vec![],
        })
        .collect(),
    }
  }

  #[test]
  fn report_matches_export_schema() {
    let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let report = DuplicateReport::new(&[group("A1", 2), group("B2", 3)], ts);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["totalGroups"], 2);
    assert_eq!(json["totalRecords"], 5);
    assert_eq!(json["groups"][0]["groupIndex"], 1);
    assert_eq!(json["groups"][1]["normalizedKey"], "B2");
    assert_eq!(json["groups"][1]["recordCount"], 3);
    let rec = &json["groups"][0]["records"][0];
    assert_eq!(rec["name"], "Rekod 0");
    assert_eq!(rec["naturalIdDisplay"], "A1");
    assert_eq!(rec["status"], "aktif");
    assert!(rec["createdAt"].is_string());
  }

  #[test]
  fn statistics_summarise_groups() {
    let groups = [group("A", 2), group("B", 3), group("C", 2), group("D", 3)];
    let stats = DuplicateStatistics::from_groups(&groups);

    assert_eq!(stats.total_groups, 4);
    assert_eq!(stats.total_duplicate_records, 1 + 2 + 1 + 2);
    assert_eq!(stats.total_records_affected, 10);
    assert_eq!(stats.group_sizes.get(&2), Some(&2));
    assert_eq!(stats.group_sizes.get(&3), Some(&2));

    let largest = stats.largest_group.unwrap();
    assert_eq!(largest.normalized_key, "B");
    assert_eq!(largest.count, 3);
  }

  #[test]
  fn statistics_of_nothing() {
    let stats = DuplicateStatistics::from_groups(&[]);
    assert_eq!(stats.total_groups, 0);
    assert!(stats.largest_group.is_none());
  }
}
