//! Attribute merging.
//!
//! Scalars: the primary's non-empty value always wins; an empty primary value
//! takes the first non-empty value among the duplicates in group order.
//! Sets: union of every member's entries, compared by canonical JSON.

use std::collections::HashSet;

use kir_core::household::{
  HouseholdRecord, ScalarField, SetField, is_blank, normalize_national_id,
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator as _;
use uuid::Uuid;

/// A non-empty duplicate value that lost to the value kept on the primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscardedValue {
  pub record_id: Uuid,
  pub value:     String,
}

/// Members disagreed on a non-empty scalar value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConflict {
  /// Stored attribute key, e.g. `"no_telefon"`.
  pub field:     String,
  pub kept:      String,
  pub kept_from: Uuid,
  pub discarded: Vec<DiscardedValue>,
}

/// Fold the attributes of `duplicates` into a copy of `primary`.
///
/// Returns the merged record and every scalar conflict encountered. Ids,
/// timestamps and audit history of the result are those of `primary`.
pub fn merge_attributes(
  primary: &HouseholdRecord,
  duplicates: &[HouseholdRecord],
) -> (HouseholdRecord, Vec<FieldConflict>) {
  let mut merged = primary.clone();
  let mut conflicts = Vec::new();

  for field in ScalarField::iter() {
    let mut kept_from = primary.id;
    if is_blank(merged.fields.get(field)) {
      let donor = duplicates
        .iter()
        .find(|d| !is_blank(d.fields.get(field)));
      if let Some(donor) = donor {
        *merged.fields.slot_mut(field) = donor.fields.get(field).map(str::to_owned);
        kept_from = donor.id;
      }
    }

    let Some(kept) = merged.fields.get(field).filter(|v| !v.trim().is_empty()) else {
      continue;
    };
    let discarded: Vec<DiscardedValue> = duplicates
      .iter()
      .filter(|d| d.id != kept_from)
      .filter_map(|d| {
        let value = d.fields.get(field)?;
        (!is_blank(Some(value)) && !same_value(field, value, kept)).then(|| DiscardedValue {
          record_id: d.id,
          value:     value.to_owned(),
        })
      })
      .collect();

    if !discarded.is_empty() {
      conflicts.push(FieldConflict {
        field: field.key().to_owned(),
        kept: kept.to_owned(),
        kept_from,
        discarded,
      });
    }
  }

  for field in SetField::iter() {
    let mut seen = HashSet::new();
    let mut union = Vec::new();
    let entries = std::iter::once(primary)
      .chain(duplicates)
      .flat_map(|r| r.sets.get(field));
    for entry in entries {
      if seen.insert(entry.to_string()) {
        union.push(entry.clone());
      }
    }
    *merged.sets.slot_mut(field) = union;
  }

  (merged, conflicts)
}

/// National IDs agree when they normalise alike; other scalars agree when
/// equal after trimming.
fn same_value(field: ScalarField, a: &str, b: &str) -> bool {
  match field {
    ScalarField::NationalId => normalize_national_id(a) == normalize_national_id(b),
    _ => a.trim() == b.trim(),
  }
}
