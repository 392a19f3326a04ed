//! Lexfetch main entry point
//!
//! Command-line interface for running a batch acquisition: load the config,
//! read the batch file, resolve every entity through the strategy chain, and
//! write the run summary.

use chrono::Utc;
use clap::Parser;
use lexfetch::classify::Classifier;
use lexfetch::config::{load_config_with_hash, Config};
use lexfetch::crawler::{cancel_pair, Orchestrator, RateGate};
use lexfetch::output::{print_digest, MarkdownReportSink, ReportSink, RunSummary};
use lexfetch::strategy::{build_strategies, ChainPolicy, StrategyChain};
use lexfetch::transport::HttpTransport;
use lexfetch::{EntityRequest, ProxyPool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Lexfetch: batch acquisition of legal-document metadata
///
/// Lexfetch resolves a batch of statute names against a catalog of
/// rate-limited sources, rotating proxies and falling back across sources
/// as they block or fail.
#[derive(Parser, Debug)]
#[command(name = "lexfetch")]
#[command(version = "0.3.0")]
#[command(about = "Batch acquisition of legal-document metadata", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Batch file: one entity per line, optionally "name<TAB>number"
    #[arg(value_name = "BATCH")]
    batch: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would run without making requests
    #[arg(long)]
    dry_run: bool,

    /// Write the markdown run summary here instead of the configured path
    #[arg(long, value_name = "PATH")]
    summary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let requests = parse_batch_file(&cli.batch)?;
    tracing::info!(
        "Batch loaded: {} entities from {}",
        requests.len(),
        cli.batch.display()
    );

    if cli.dry_run {
        handle_dry_run(&config, &requests);
        return Ok(());
    }

    let summary_path = cli
        .summary
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.summary_path));

    handle_run(config, config_hash, requests, summary_path).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("lexfetch=info,warn"),
            1 => EnvFilter::new("lexfetch=debug,info"),
            2 => EnvFilter::new("lexfetch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Parses a batch file into entity requests
///
/// One entity per line. A tab separates the name from an optional document
/// number. Blank lines and lines starting with `#` are skipped.
fn parse_batch_file(path: &Path) -> Result<Vec<EntityRequest>, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let mut requests = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('\t') {
            Some((name, number)) if !number.trim().is_empty() => {
                requests.push(EntityRequest::with_number(name.trim(), number.trim()));
            }
            _ => requests.push(EntityRequest::new(line)),
        }
    }
    Ok(requests)
}

/// Handles the --dry-run mode: validates config and shows what would run
fn handle_dry_run(config: &Config, requests: &[EntityRequest]) {
    println!("=== Lexfetch Dry Run ===\n");

    println!("Limits:");
    println!("  Max concurrent: {}", config.limits.max_concurrent);
    println!(
        "  Requests per minute: {}",
        config.limits.requests_per_minute
    );
    println!(
        "  Request interval: {}ms",
        config.limits.request_interval_ms
    );
    println!(
        "  Attempt timeout: {}s",
        config.limits.attempt_timeout_secs
    );
    println!(
        "  Retries per strategy: {}",
        config.limits.retry_max_attempts
    );

    println!("\nProxy Pool:");
    println!("  Enabled: {}", config.pool.enabled);
    println!("  Endpoints: {}", config.pool.endpoints.len());
    for endpoint in &config.pool.endpoints {
        println!(
            "  - {} ({}, {} tier, priority {})",
            endpoint.name,
            endpoint.key(),
            endpoint.tier,
            endpoint.priority
        );
    }
    println!("  Site policies: {}", config.pool.sites.len());
    for site in &config.pool.sites {
        println!(
            "  - {} (proxy: {}, direct: {})",
            site.host, site.use_proxy, site.direct_allowed
        );
    }

    println!("\nSources:");
    for source in &config.sources {
        let state = if source.enabled { "" } else { " [disabled]" };
        println!(
            "  {}. {} ({}){}",
            source.priority, source.name, source.kind, state
        );
    }

    println!("\nBatch: {} entities", requests.len());

    println!("\n✓ Configuration is valid");
}

/// Handles the main batch run
async fn handle_run(
    config: Config,
    config_hash: String,
    requests: Vec<EntityRequest>,
    summary_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let pool = Arc::new(ProxyPool::new(&config.pool)?);
    tracing::info!(
        "Proxy pool ready: {} endpoints, {} site policies",
        pool.endpoint_count(),
        config.pool.sites.len()
    );

    let gate = Arc::new(RateGate::from_limits(&config.limits));
    let classifier = Classifier::new(config.classifier.clone());
    let transport = Arc::new(HttpTransport::new());
    let strategies = build_strategies(&config.sources)?;
    tracing::info!("Strategy chain: {} enabled sources", strategies.len());

    let chain = Arc::new(StrategyChain::new(
        strategies,
        Arc::clone(&pool),
        gate,
        transport,
        classifier,
        ChainPolicy::from_limits(&config.limits),
    ));
    let orchestrator = Orchestrator::new(chain, &config.limits);

    // Ctrl-C flips the cancel flag; workers finish their bookkeeping and stop
    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            handle.cancel();
        }
    });

    let started_at = Utc::now();
    let report = orchestrator.run_batch(requests, token).await;
    let finished_at = Utc::now();

    let summary = RunSummary {
        started_at,
        finished_at,
        config_hash,
        stats: report.stats,
        pool: pool.snapshot(),
        tasks: report.tasks,
    };

    print_digest(&summary);

    let sink = MarkdownReportSink::new(&summary_path);
    sink.publish(&summary)?;
    tracing::info!("Summary written to {}", summary_path.display());

    Ok(())
}
