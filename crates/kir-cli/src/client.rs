//! Async HTTP client wrapping the KIR dedupe API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use kir_dedupe::{
  DuplicateGroup,
  report::{DuplicateReport, DuplicateStatistics, GroupDetails},
  resolver::{MergePreview, MergeResult},
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

/// Connection settings for the KIR API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
}

/// Async HTTP client for the KIR dedupe API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(120))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  /// Decode a success body, or turn the server's `{"error": ...}` body into
  /// an error naming the request.
  async fn decode<T: DeserializeOwned>(what: &str, resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
      let message = resp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_owned))
        .unwrap_or_default();
      return Err(anyhow!("{what} → {status}: {message}"));
    }
    resp.json().await.with_context(|| format!("deserialising {what} response"))
  }

  async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let what = format!("GET {path}");
    let resp = self
      .client
      .get(self.url(path))
      .send()
      .await
      .with_context(|| format!("{what} failed"))?;
    Self::decode(&what, resp).await
  }

  async fn post<T: DeserializeOwned>(&self, path: &str, group: &DuplicateGroup) -> Result<T> {
    let what = format!("POST {path}");
    let resp = self
      .client
      .post(self.url(path))
      .json(group)
      .send()
      .await
      .with_context(|| format!("{what} failed"))?;
    Self::decode(&what, resp).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// `GET /partitions/{env}/duplicates`
  pub async fn scan(&self, env: &str) -> Result<Vec<DuplicateGroup>> {
    self.get(&format!("/partitions/{env}/duplicates")).await
  }

  /// `GET /partitions/{env}/duplicates/stats`
  pub async fn statistics(&self, env: &str) -> Result<DuplicateStatistics> {
    self.get(&format!("/partitions/{env}/duplicates/stats")).await
  }

  /// `GET /partitions/{env}/duplicates/report`
  pub async fn report(&self, env: &str) -> Result<DuplicateReport> {
    self.get(&format!("/partitions/{env}/duplicates/report")).await
  }

  /// `GET /partitions/{env}/duplicates/{key}`
  pub async fn details(&self, env: &str, key: &str) -> Result<GroupDetails> {
    self.get(&format!("/partitions/{env}/duplicates/{key}")).await
  }

  // ── Merge ─────────────────────────────────────────────────────────────────

  /// `POST /duplicates/preview`
  pub async fn preview(&self, group: &DuplicateGroup) -> Result<MergePreview> {
    self.post("/duplicates/preview", group).await
  }

  /// `POST /duplicates/merge`
  pub async fn merge(&self, group: &DuplicateGroup) -> Result<MergeResult> {
    self.post("/duplicates/merge", group).await
  }
}
