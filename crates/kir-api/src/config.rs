//! Server configuration.

use std::path::PathBuf;

use kir_core::household::Partition;
use kir_dedupe::ResolverConfig;
use serde::Deserialize;

/// Runtime server configuration, deserialised from `config.toml` and `KIR_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                 String,
  #[serde(default = "default_port")]
  pub port:                 u16,
  #[serde(default = "default_store_path")]
  pub store_path:           PathBuf,
  /// Partitions in which merges are refused.
  #[serde(default = "default_protected")]
  pub protected_partitions: Vec<Partition>,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("kir.db") }

fn default_protected() -> Vec<Partition> { ResolverConfig::default().protected_partitions }

impl ServerConfig {
  pub fn resolver(&self) -> ResolverConfig {
    ResolverConfig { protected_partitions: self.protected_partitions.clone() }
  }
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                 default_host(),
      port:                 default_port(),
      store_path:           default_store_path(),
      protected_partitions: default_protected(),
    }
  }
}
