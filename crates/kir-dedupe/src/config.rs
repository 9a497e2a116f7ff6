//! Resolver configuration.

use kir_core::household::Partition;
use serde::Deserialize;

/// Settings for a [`crate::DuplicateResolver`].
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
  /// Partitions in which merges are refused outright.
  #[serde(default = "default_protected_partitions")]
  pub protected_partitions: Vec<Partition>,
}

fn default_protected_partitions() -> Vec<Partition> { vec![Partition::new("production")] }

impl Default for ResolverConfig {
  fn default() -> Self {
    Self { protected_partitions: default_protected_partitions() }
  }
}

impl ResolverConfig {
  pub fn is_protected(&self, partition: &Partition) -> bool {
    self.protected_partitions.contains(partition)
  }
}
