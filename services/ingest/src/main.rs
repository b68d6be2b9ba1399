//! Ingest Service - Rebuilds `plant_data` from the utility exports
//!
//! Responsibilities:
//! - Load the plant registry and alias mapping (fatal if either fails)
//! - Read every configured export in fixed order, skipping broken ones
//! - Reconcile to one row per (time block, plant)
//! - Replace the fact store atomically and log the run
//!
//! Same inputs = same rows, every run.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use ingest::{Config, FactStore, Pipeline, PipelineConfig};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ingest", about = "Ingests utility exports into the plant_data fact store")]
struct Args {
    /// Directory holding the source CSV exports [env: DATA_DIR]
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Plant registry spreadsheet or CSV [env: REGISTRY_FILE]
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Alias mapping JSON [env: MAPPING_FILE]
    #[arg(long)]
    mapping: Option<PathBuf>,

    /// Store URL [env: DB_URL]
    #[arg(long)]
    db_url: Option<String>,

    /// Dry run - don't write the fact store
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Args {
    fn apply(self, mut config: Config) -> Config {
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(registry) = self.registry {
            config.registry_file = registry;
        }
        if let Some(mapping) = self.mapping {
            config.mapping_file = mapping;
        }
        if let Some(url) = self.db_url {
            config.db_url = url;
        }
        config
    }
}

fn init_tracing() {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let dry_run = args.dry_run;
    let report_path = args.report.clone();
    let config = args.apply(Config::from_env());

    info!(
        data_dir = %config.data_dir.display(),
        registry = %config.registry_file.display(),
        mapping = %config.mapping_file.display(),
        mode = if dry_run { "dry-run" } else { "live" },
        "starting ingest"
    );

    let started_at = Utc::now();

    let pipeline_config = PipelineConfig::load(
        &config.data_dir,
        &config.registry_file,
        &config.mapping_file,
    )
    .context("Failed to load plant registry or alias mapping")?;

    let outcome = Pipeline::new(pipeline_config).run();
    outcome.report.log_summary();

    if let Some(path) = &report_path {
        outcome
            .report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }

    if outcome.report.has_gaps() {
        warn!("coverage gaps found; see warnings above");
    }

    if dry_run {
        info!(rows = outcome.facts.len(), "dry run - fact store not touched");
        return Ok(());
    }

    let store = FactStore::connect(&config.db_url)
        .await
        .with_context(|| format!("Failed to open fact store {}", config.db_url))?;
    let run_id = store
        .replace_all(&outcome.facts, &outcome.report, started_at)
        .await
        .context("Failed to replace plant_data")?;

    println!("\n=== Ingest Complete ===");
    println!("Run: {}", run_id);
    println!("Rows written: {}", outcome.facts.len());
    println!("Skipped sources: {}", outcome.report.skipped_sources.len());

    Ok(())
}
