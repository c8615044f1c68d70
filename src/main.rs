use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use collectr_reconciler::domain::ReconciliationReport;
use collectr_reconciler::infrastructure::{
    DatabaseConnection, ImporterConfig, LiveShowcaseSource, SqliteCatalogRepository, init_logging,
};
use collectr_reconciler::{ImportError, ReconciliationUseCase};

const ENV_FILES: &[&str] = &[".env.scripts", ".env", ".env.local"];

/// Reconcile a Collectr showcase against the card catalog
#[derive(Debug, Parser)]
#[command(name = "collectr-reconciler", version, about)]
struct Cli {
    /// Showcase profile URL
    #[arg(long)]
    url: String,

    /// Print the whole report as JSON
    #[arg(long)]
    json: bool,

    /// Number of results to print
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

fn load_env_files() {
    for file in ENV_FILES {
        // Later files override earlier ones
        let _ = dotenvy::from_filename_override(file);
    }
}

fn print_report(report: &ReconciliationReport, limit: usize) {
    let summary = &report.summary;
    println!("Raw items seen:     {}", summary.total_raw_items_seen);
    println!("Aggregated entries: {}", summary.aggregated_entry_count);
    println!("Matched:            {}", summary.matched_count);
    println!("Graded skipped:     {}", summary.skipped_graded_count);
    if !report.collections.is_empty() {
        println!("Collections:        {}", report.collections.len());
    }
    println!();

    for result in report.results.iter().take(limit) {
        let status = if result.matched { "✓" } else { "✗" };
        println!(
            "{status} {:>3}x {} | {} | #{} | {}",
            result.quantity,
            result.name.as_deref().or(result.showcase_name.as_deref()).unwrap_or("?"),
            result.set.as_deref().or(result.showcase_set.as_deref()).unwrap_or("?"),
            result.card_number.as_deref().unwrap_or("?"),
            result.tcg_product_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
        );
    }
    if report.results.len() > limit {
        println!("... {} more", report.results.len() - limit);
    }
}

async fn run(cli: Cli, config: ImporterConfig) -> Result<ReconciliationReport, ImportError> {
    let database = DatabaseConnection::new(config.catalog_url()?)
        .await
        .map_err(ImportError::catalog)?;
    let catalog = Arc::new(SqliteCatalogRepository::new(database.pool().clone()));
    let source = Arc::new(
        LiveShowcaseSource::new(&config).map_err(|e| ImportError::Configuration(format!("{e:#}")))?,
    );
    let use_case = ReconciliationUseCase::new(config, source, catalog);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            on_signal.cancel();
        }
    });

    let report = use_case.run(&cli.url, &cancel).await;
    database.close().await;
    report
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    load_env_files();
    let cli = Cli::parse();

    let config = ImporterConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_logging(&config.logging)?;

    let (json, limit) = (cli.json, cli.limit);
    match run(cli, config).await {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, limit);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {e}");
            Ok(if e.is_user_error() { ExitCode::from(2) } else { ExitCode::FAILURE })
        }
    }
}
