//! Household records: the "KIR" (household head) entity.
//!
//! Mergeable attributes are declared explicitly: every scalar attribute is a
//! [`ScalarField`] and every set-valued attribute is a [`SetField`]. The merge
//! policy of an attribute follows from which of the two enums names it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use strum::{EnumIter, IntoStaticStr};
use uuid::Uuid;

use crate::Result;

// ─── Partition ───────────────────────────────────────────────────────────────

/// A logical environment (`env` tag) isolating one set of records from
/// another, e.g. `"dev"` or `"production"`.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Partition(String);

impl Partition {
  pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Partition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for Partition {
  fn from(name: &str) -> Self { Self::new(name) }
}

// ─── Normalisation ───────────────────────────────────────────────────────────

/// Keep only the ASCII letters and digits of a national ID, upper-cased.
/// `"01-0101-07-1234"` and `"010101071234"` normalise identically.
pub fn normalize_national_id(raw: &str) -> String {
  raw
    .chars()
    .filter(char::is_ascii_alphanumeric)
    .map(|c| c.to_ascii_uppercase())
    .collect()
}

/// `true` when a scalar value is absent or contains only whitespace.
pub fn is_blank(value: Option<&str>) -> bool {
  value.is_none_or(|v| v.trim().is_empty())
}

// ─── Scalar attributes ───────────────────────────────────────────────────────

/// Every scalar attribute of a household record. Merged with the
/// first-non-empty rule, primary preferred.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  EnumIter,
  IntoStaticStr,
)]
pub enum ScalarField {
  #[strum(serialize = "nama")]
  Name,
  #[strum(serialize = "no_kp")]
  NationalId,
  #[strum(serialize = "jantina")]
  Gender,
  #[strum(serialize = "bangsa")]
  Race,
  #[strum(serialize = "agama")]
  Religion,
  #[strum(serialize = "status_perkahwinan")]
  MaritalStatus,
  #[strum(serialize = "alamat_rumah")]
  HomeAddress,
  #[strum(serialize = "poskod")]
  Postcode,
  #[strum(serialize = "daerah")]
  District,
  #[strum(serialize = "negeri")]
  State,
  #[strum(serialize = "no_telefon")]
  Phone,
  #[strum(serialize = "email")]
  Email,
  #[strum(serialize = "pekerjaan")]
  Occupation,
  #[strum(serialize = "pendapatan_bulanan")]
  MonthlyIncome,
  #[strum(serialize = "status_rumah")]
  HousingStatus,
  #[strum(serialize = "bilangan_anak")]
  ChildrenCount,
  #[strum(serialize = "nama_waris")]
  NextOfKinName,
  #[strum(serialize = "hubungan_waris")]
  NextOfKinRelation,
  #[strum(serialize = "no_telefon_waris")]
  NextOfKinPhone,
  #[strum(serialize = "status_rekod")]
  RecordStatus,
  #[strum(serialize = "catatan")]
  Notes,
}

impl ScalarField {
  /// The stored attribute key, e.g. `"pekerjaan"`.
  pub fn key(self) -> &'static str { self.into() }
}

impl Serialize for ScalarField {
  fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(self.key())
  }
}

/// The scalar attributes of a household record, keyed by their stored names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseholdFields {
  #[serde(rename = "nama", default, skip_serializing_if = "Option::is_none")]
  pub name:                Option<String>,
  /// The user-supplied national ID exactly as entered.
  #[serde(rename = "no_kp", default, skip_serializing_if = "Option::is_none")]
  pub national_id:         Option<String>,
  #[serde(rename = "jantina", default, skip_serializing_if = "Option::is_none")]
  pub gender:              Option<String>,
  #[serde(rename = "bangsa", default, skip_serializing_if = "Option::is_none")]
  pub race:                Option<String>,
  #[serde(rename = "agama", default, skip_serializing_if = "Option::is_none")]
  pub religion:            Option<String>,
  #[serde(
    rename = "status_perkahwinan",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub marital_status:      Option<String>,
  #[serde(
    rename = "alamat_rumah",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub home_address:        Option<String>,
  #[serde(rename = "poskod", default, skip_serializing_if = "Option::is_none")]
  pub postcode:            Option<String>,
  #[serde(rename = "daerah", default, skip_serializing_if = "Option::is_none")]
  pub district:            Option<String>,
  #[serde(rename = "negeri", default, skip_serializing_if = "Option::is_none")]
  pub state:               Option<String>,
  #[serde(
    rename = "no_telefon",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub phone:               Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email:               Option<String>,
  #[serde(
    rename = "pekerjaan",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub occupation:          Option<String>,
  #[serde(
    rename = "pendapatan_bulanan",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub monthly_income:      Option<String>,
  #[serde(
    rename = "status_rumah",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub housing_status:      Option<String>,
  #[serde(
    rename = "bilangan_anak",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub children_count:      Option<String>,
  #[serde(
    rename = "nama_waris",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub next_of_kin_name:    Option<String>,
  #[serde(
    rename = "hubungan_waris",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub next_of_kin_relation: Option<String>,
  #[serde(
    rename = "no_telefon_waris",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub next_of_kin_phone:   Option<String>,
  #[serde(
    rename = "status_rekod",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub record_status:       Option<String>,
  /// Free-text operator notes.
  #[serde(rename = "catatan", default, skip_serializing_if = "Option::is_none")]
  pub notes:               Option<String>,
}

impl HouseholdFields {
  pub fn get(&self, field: ScalarField) -> Option<&str> {
    use ScalarField::*;
    let slot = match field {
      Name => &self.name,
      NationalId => &self.national_id,
      Gender => &self.gender,
      Race => &self.race,
      Religion => &self.religion,
      MaritalStatus => &self.marital_status,
      HomeAddress => &self.home_address,
      Postcode => &self.postcode,
      District => &self.district,
      State => &self.state,
      Phone => &self.phone,
      Email => &self.email,
      Occupation => &self.occupation,
      MonthlyIncome => &self.monthly_income,
      HousingStatus => &self.housing_status,
      ChildrenCount => &self.children_count,
      NextOfKinName => &self.next_of_kin_name,
      NextOfKinRelation => &self.next_of_kin_relation,
      NextOfKinPhone => &self.next_of_kin_phone,
      RecordStatus => &self.record_status,
      Notes => &self.notes,
    };
    slot.as_deref()
  }

  pub fn slot_mut(&mut self, field: ScalarField) -> &mut Option<String> {
    use ScalarField::*;
    match field {
      Name => &mut self.name,
      NationalId => &mut self.national_id,
      Gender => &mut self.gender,
      Race => &mut self.race,
      Religion => &mut self.religion,
      MaritalStatus => &mut self.marital_status,
      HomeAddress => &mut self.home_address,
      Postcode => &mut self.postcode,
      District => &mut self.district,
      State => &mut self.state,
      Phone => &mut self.phone,
      Email => &mut self.email,
      Occupation => &mut self.occupation,
      MonthlyIncome => &mut self.monthly_income,
      HousingStatus => &mut self.housing_status,
      ChildrenCount => &mut self.children_count,
      NextOfKinName => &mut self.next_of_kin_name,
      NextOfKinRelation => &mut self.next_of_kin_relation,
      NextOfKinPhone => &mut self.next_of_kin_phone,
      RecordStatus => &mut self.record_status,
      Notes => &mut self.notes,
    }
  }
}

// ─── Set-valued attributes ───────────────────────────────────────────────────

/// Every set-valued attribute of a household record. Merged by union, with
/// entries compared by their canonical JSON serialisation.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  EnumIter,
  IntoStaticStr,
)]
pub enum SetField {
  #[strum(serialize = "pendapatan_tetap")]
  FixedIncome,
  #[strum(serialize = "pendapatan_tidak_tetap")]
  VariableIncome,
  #[strum(serialize = "bantuan_kerajaan")]
  GovernmentAid,
}

impl SetField {
  pub fn key(self) -> &'static str { self.into() }
}

/// Repeated entries such as recurring income sources. Entries are opaque
/// structured values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HouseholdSets {
  #[serde(rename = "pendapatan_tetap", default)]
  pub fixed_income:    Vec<serde_json::Value>,
  #[serde(rename = "pendapatan_tidak_tetap", default)]
  pub variable_income: Vec<serde_json::Value>,
  #[serde(rename = "bantuan_kerajaan", default)]
  pub government_aid:  Vec<serde_json::Value>,
}

impl HouseholdSets {
  pub fn get(&self, field: SetField) -> &[serde_json::Value] {
    match field {
      SetField::FixedIncome => &self.fixed_income,
      SetField::VariableIncome => &self.variable_income,
      SetField::GovernmentAid => &self.government_aid,
    }
  }

  pub fn slot_mut(&mut self, field: SetField) -> &mut Vec<serde_json::Value> {
    match field {
      SetField::FixedIncome => &mut self.fixed_income,
      SetField::VariableIncome => &mut self.variable_income,
      SetField::GovernmentAid => &mut self.government_aid,
    }
  }
}

// ─── Audit ───────────────────────────────────────────────────────────────────

/// One merge absorbed into a surviving record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeHistory {
  pub merged_at:      DateTime<Utc>,
  pub merged_records: Vec<Uuid>,
  pub merge_count:    usize,
}

// ─── HouseholdRecord ─────────────────────────────────────────────────────────

/// A household head registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdRecord {
  /// Store-assigned opaque id.
  pub id:            Uuid,
  #[serde(rename = "env")]
  pub partition:     Partition,
  #[serde(flatten)]
  pub fields:        HouseholdFields,
  #[serde(flatten)]
  pub sets:          HouseholdSets,
  /// `None` when the stored timestamp is missing or malformed.
  pub created_at:    Option<DateTime<Utc>>,
  pub updated_at:    Option<DateTime<Utc>>,
  #[serde(default)]
  pub merge_history: Vec<MergeHistory>,
}

impl HouseholdRecord {
  /// The normalisation key derived from `no_kp`, or `None` if the record
  /// carries no usable national ID.
  pub fn normalized_key(&self) -> Option<String> {
    let key = normalize_national_id(self.fields.national_id.as_deref()?);
    (!key.is_empty()).then_some(key)
  }

  /// Creation time with missing or malformed timestamps pinned to the epoch.
  pub fn created_at_or_epoch(&self) -> DateTime<Utc> {
    self.created_at.unwrap_or(DateTime::UNIX_EPOCH)
  }

  /// Optimistic-concurrency token for this exact record state.
  pub fn etag(&self) -> Result<String> { crate::etag::household_etag(self) }
}

/// Input to [`crate::store::RecordStore::insert_household`]. The id and
/// `updated_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewHousehold {
  pub partition:  Partition,
  pub fields:     HouseholdFields,
  pub sets:       HouseholdSets,
  /// Preserved creation time for imported registry data; `None` means now.
  pub created_at: Option<DateTime<Utc>>,
}

impl NewHousehold {
  pub fn new(partition: Partition, fields: HouseholdFields) -> Self {
    Self {
      partition,
      fields,
      sets: HouseholdSets::default(),
      created_at: None,
    }
  }
}
