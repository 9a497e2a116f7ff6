//! `kir-dedupe`: operator CLI for KIR duplicate resolution.
//!
//! # Usage
//!
//! ```
//! kir-dedupe --url http://localhost:8080 scan staging
//! kir-dedupe merge staging 01-0101-07-1234
//! kir-dedupe --config ~/.config/kir/config.toml export staging
//! ```

mod client;
mod render;

use std::{
  io::{self, BufRead, Write},
  path::PathBuf,
};

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig};
use kir_core::household::normalize_national_id;
use kir_dedupe::DuplicateGroup;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "kir-dedupe", about = "Find and merge duplicate KIR household records")]
struct Args {
  /// Path to a TOML config file (url).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the kir server (default: http://localhost:8080).
  #[arg(long, env = "KIR_URL")]
  url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List every duplicate group in a partition.
  Scan { env: String },
  /// Summarise the duplicates in a partition.
  Stats { env: String },
  /// Show every record carrying one national ID, with related-document counts.
  Details { env: String, key: String },
  /// Show what merging one group would do, without writing.
  Preview { env: String, key: String },
  /// Merge one group into its oldest record.
  Merge {
    env: String,
    key: String,
    /// Skip the confirmation prompt.
    #[arg(short, long)]
    yes: bool,
  },
  /// Write the scan report as JSON.
  Export {
    env: String,
    /// Output file (default: kir-duplicates-<date>.json).
    #[arg(short, long)]
    out: Option<PathBuf>,
  },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url: String,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url: args
      .url
      .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
      .unwrap_or_else(|| "http://localhost:8080".to_string()),
  };
  let client = ApiClient::new(api_config)?;

  match args.command {
    Command::Scan { env } => {
      let groups = client.scan(&env).await?;
      print!("{}", render::groups(&groups));
    }
    Command::Stats { env } => {
      let stats = client.statistics(&env).await?;
      print!("{}", render::statistics(&stats));
    }
    Command::Details { env, key } => {
      let details = client.details(&env, &normalize_national_id(&key)).await?;
      print!("{}", render::details(&details));
    }
    Command::Preview { env, key } => {
      let group = find_group(client.scan(&env).await?, &key)?;
      let preview = client.preview(&group).await?;
      print!("{}", render::preview(&preview));
    }
    Command::Merge { env, key, yes } => {
      let group = find_group(client.scan(&env).await?, &key)?;
      print!("{}", render::groups(std::slice::from_ref(&group)));
      if !yes && !confirm(&format!("Merge {} records?", group.len()))? {
        println!("Aborted.");
        return Ok(());
      }
      let result = client.merge(&group).await?;
      tracing::info!(primary = %result.primary_id, merged = result.merged_count, "merge complete");
      print!("{}", render::merge_result(&result));
    }
    Command::Export { env, out } => {
      let report = client.report(&env).await?;
      if report.total_groups == 0 {
        println!("No duplicate records to export.");
        return Ok(());
      }
      let path = out.unwrap_or_else(|| export_path(Utc::now().date_naive()));
      let json = serde_json::to_string_pretty(&report).context("serialising report")?;
      std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
      println!(
        "Exported {} groups ({} records) to {}",
        report.total_groups,
        report.total_records,
        path.display()
      );
    }
  }

  Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Pick the group for `key` out of a fresh scan. The key may be typed in any
/// formatting the registry accepts.
fn find_group(groups: Vec<DuplicateGroup>, key: &str) -> Result<DuplicateGroup> {
  let key = normalize_national_id(key);
  groups
    .into_iter()
    .find(|g| g.normalized_key == key)
    .ok_or_else(|| anyhow!("no duplicate group with key {key}"))
}

fn export_path(date: NaiveDate) -> PathBuf {
  PathBuf::from(format!("kir-duplicates-{}.json", date.format("%Y-%m-%d")))
}

/// Ask a yes/no question on stdin. Anything but `y`/`yes` is a no.
fn confirm(question: &str) -> Result<bool> {
  print!("{question} [y/N] ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
