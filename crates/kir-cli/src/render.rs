//! Plain-text rendering of API responses.

use kir_core::household::HouseholdRecord;
use kir_dedupe::{
  DuplicateGroup,
  report::{DuplicateStatistics, GroupDetails},
  resolver::{MergePreview, MergeResult},
};

fn or_dash(v: Option<&str>) -> &str { v.filter(|s| !s.trim().is_empty()).unwrap_or("-") }

fn record_line(r: &HouseholdRecord, primary: bool) -> String {
  let created = r
    .created_at
    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
    .unwrap_or_else(|| "-".into());
  format!(
    "  {} {}  {:<30} {:<16} {:<10} {}",
    if primary { "*" } else { " " },
    r.id,
    or_dash(r.fields.name.as_deref()),
    or_dash(r.fields.national_id.as_deref()),
    or_dash(r.fields.record_status.as_deref()),
    created,
  )
}

fn finish(lines: Vec<String>) -> String {
  let mut out = lines.join("\n");
  out.push('\n');
  out
}

pub fn groups(groups: &[DuplicateGroup]) -> String {
  if groups.is_empty() {
    return finish(vec!["No duplicates found.".into()]);
  }
  let mut lines = vec![format!("{} duplicate group(s)", groups.len())];
  for (i, g) in groups.iter().enumerate() {
    lines.push(String::new());
    lines.push(format!("[{}] {} ({} records)", i + 1, g.normalized_key, g.len()));
    for (j, r) in g.members.iter().enumerate() {
      lines.push(record_line(r, j == 0));
    }
  }
  finish(lines)
}

pub fn statistics(stats: &DuplicateStatistics) -> String {
  let mut lines = vec![
    format!("Groups:            {}", stats.total_groups),
    format!("Duplicate records: {}", stats.total_duplicate_records),
    format!("Records affected:  {}", stats.total_records_affected),
  ];
  for (size, count) in &stats.group_sizes {
    lines.push(format!("  {count} group(s) of {size}"));
  }
  if let Some(largest) = &stats.largest_group {
    lines.push(format!(
      "Largest group:     {} ({} records)",
      largest.normalized_key, largest.count
    ));
    for (id, name) in &largest.records {
      lines.push(format!("  {id}  {}", or_dash(name.as_deref())));
    }
  }
  finish(lines)
}

pub fn details(details: &GroupDetails) -> String {
  let mut lines = vec![format!(
    "{} in {} ({} records)",
    details.normalized_key,
    details.partition,
    details.records.len()
  )];
  for d in &details.records {
    lines.push(record_line(&d.record, d.record.id == details.primary_id));
    let related: Vec<String> = d
      .related_counts
      .iter()
      .filter(|(_, n)| **n > 0)
      .map(|(c, n)| format!("{}={n}", c.storage_name()))
      .collect();
    if !related.is_empty() {
      lines.push(format!("      related: {}", related.join(", ")));
    }
  }
  finish(lines)
}

pub fn preview(preview: &MergePreview) -> String {
  let mut lines = vec![
    format!("Primary:           {}", preview.merged.id),
    format!("Would delete:      {} record(s)", preview.duplicate_ids.len()),
  ];
  for id in &preview.duplicate_ids {
    lines.push(format!("  {id}"));
  }
  let total: usize = preview.rewritten_references.values().sum();
  lines.push(format!("Rewritten refs:    {total}"));
  for (c, n) in &preview.rewritten_references {
    lines.push(format!("  {}: {n}", c.storage_name()));
  }
  lines.push(format!("Index entries:     {} removed", preview.removed_index_entries));
  lines.extend(conflicts(&preview.conflicts));
  finish(lines)
}

pub fn merge_result(result: &MergeResult) -> String {
  let mut lines = vec![
    format!(
      "Merged {} record(s) into {}",
      result.merged_count, result.primary_id
    ),
    format!("Rewritten refs:    {}", result.rewritten_references),
    format!("Index entries:     {} removed", result.removed_index_entries),
  ];
  lines.extend(conflicts(&result.conflicts));
  finish(lines)
}

fn conflicts(conflicts: &[kir_dedupe::merge::FieldConflict]) -> Vec<String> {
  if conflicts.is_empty() {
    return vec![];
  }
  let mut lines = vec![format!("Conflicts ({}):", conflicts.len())];
  for c in conflicts {
    lines.push(format!("  {}: kept {:?} from {}", c.field, c.kept, c.kept_from));
    for d in &c.discarded {
      lines.push(format!("    dropped {:?} from {}", d.value, d.record_id));
    }
  }
  lines
}
