//! Feeds CLI: quote tracking and estimate reconciliation.
//!
//! Commands:
//! - `quotes` - write quote cells into a tab once, or keep polling with `--daemon`
//! - `estimates` - print the merged EPS and revenue series for one ticker

mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use feed::{
    EstimateRecord, FeedError, Metric, RegistryConfig, Settings, SourceRegistry, SqliteStore, Symbol,
    TrackerDaemon, VIEWS,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, QuotesArgs};

const DEFAULT_FILTER: &str = "feeds=info,feed=info,warn";
const VERBOSE_FILTER: &str = "feeds=debug,feed=debug,info";

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);
    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Could not read .env"),
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            let configuration = e
                .chain()
                .any(|cause| matches!(cause.downcast_ref::<FeedError>(), Some(FeedError::Configuration(_))));
            ExitCode::from(if configuration { 2 } else { 1 })
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env();
    match cli.command {
        Commands::Quotes(args) => quotes(&settings, &args).await,
        Commands::Estimates { ticker, timeout } => {
            let config = RegistryConfig::default().with_attempt_timeout(Duration::from_secs(timeout));
            let registry = SourceRegistry::from_settings(&settings, config);
            let result = estimates(&registry, &Symbol::new(ticker)).await;
            registry.shutdown().await;
            result
        }
    }
}

async fn quotes(settings: &Settings, args: &QuotesArgs) -> Result<()> {
    let config = args.daemon_config()?;
    let store = SqliteStore::new(&args.store)
        .with_context(|| format!("opening store {}", args.store.display()))?;
    let registry = Arc::new(SourceRegistry::from_settings(settings, RegistryConfig::default()));
    let mut daemon = TrackerDaemon::new(config, Arc::clone(&registry), Arc::new(store))?;

    let result = if args.daemon {
        run_daemon(daemon, Duration::from_secs(args.grace)).await;
        Ok(())
    } else {
        let outcome = daemon.run_once().await;
        daemon.close().await;
        outcome.map(|report| {
            info!(
                updated = report.updated,
                skipped = report.skipped,
                cells = report.cells_written,
                "Done"
            );
        })
    };

    registry.shutdown().await;
    Ok(result?)
}

async fn run_daemon(daemon: TrackerDaemon, grace: Duration) {
    let (stop, stopped) = watch::channel(false);
    let mut task = tokio::spawn(daemon.run(stopped));

    tokio::select! {
        joined = &mut task => {
            if let Err(e) = joined {
                error!(error = %e, "Daemon task failed");
            }
            return;
        }
        () = shutdown_signal() => {}
    }

    info!(grace = ?grace, "Shutdown signal received, finishing in-flight cycle");
    let _ = stop.send(true);
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Daemon task failed"),
        Err(_) => {
            warn!("Grace period elapsed, aborting cycle");
            task.abort();
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Could not install SIGTERM handler"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn estimates(registry: &SourceRegistry, symbol: &Symbol) -> Result<()> {
    let record = EstimateRecord::build(registry, symbol).await?;

    for (metric, kind) in VIEWS {
        let series = record.series(metric, kind);
        let title = match metric {
            Metric::Eps => "EPS",
            Metric::Revenue => "Revenue",
        };
        println!("\n{symbol} {title} ({kind})");
        if series.is_empty() {
            println!("  no data");
            continue;
        }
        println!("{}", series.to_frame()?);
    }

    let sources: Vec<&str> = record.sources.iter().map(|s| s.as_str()).collect();
    println!("\nSources: {}", sources.join(", "));
    for warning in &record.warnings {
        println!("Excluded: {warning}");
    }
    for failure in &record.unavailable {
        debug!(source = %failure.source_id, kind = %failure.kind, detail = %failure.detail, "Source unavailable");
    }
    Ok(())
}
