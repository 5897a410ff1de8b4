use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetwatch::data::duration::{format_duration, parse_duration};
use fleetwatch::registry;
use fleetwatch::store::ThresholdBook;
use fleetwatch::{Fleet, NodeId, Settings, WebSocketConnector};

/// Collection window for `--export` when `--collect-for` is not given.
const DEFAULT_COLLECT_FOR: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "fleetwatch")]
#[command(about = "Live health monitor for a fleet of telemetry-reporting nodes")]
struct Args {
    /// Path to a TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Telemetry feed URL (e.g., "ws://10.0.0.2:8765/ws")
    #[arg(short, long)]
    url: Option<String>,

    /// Evict nodes silent for longer than this (e.g., "30s")
    #[arg(long)]
    ttl: Option<String>,

    /// Delay before reconnecting after the feed closes (e.g., "5s")
    #[arg(long)]
    reconnect_delay: Option<String>,

    /// Report interval (e.g., "2s", "500ms")
    #[arg(short, long)]
    refresh: Option<String>,

    /// Only show nodes whose address contains this text
    #[arg(short, long, default_value = "")]
    filter: String,

    /// Rows per report column
    #[arg(long, default_value = "20")]
    rows: usize,

    /// Collect for a while, export the fleet state to a JSON file and exit
    #[arg(short, long, conflicts_with = "set_threshold")]
    export: Option<PathBuf>,

    /// How long to collect before exporting (e.g., "15s")
    #[arg(long, requires = "export")]
    collect_for: Option<String>,

    /// Store custom limits for the node with this address and exit
    #[arg(long, value_name = "IP")]
    set_threshold: Option<String>,

    /// CPU limit in percent (used with --set-threshold)
    #[arg(long, requires = "set_threshold")]
    cpu_limit: Option<f64>,

    /// Disk limit in percent (used with --set-threshold)
    #[arg(long, requires = "set_threshold")]
    disk_limit: Option<f64>,

    /// 1-minute load average limit (used with --set-threshold)
    #[arg(long, requires = "set_threshold")]
    load_limit: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let settings = load_settings(&args)?;

    if let Some(ref ip) = args.set_threshold {
        return set_threshold(&settings, ip, &args).await;
    }

    let connector = Arc::new(WebSocketConnector::new(settings.feed_url.clone()));
    let store = settings.threshold_store.build()?;

    tracing::info!(
        feed = %settings.feed_url,
        store = store.description(),
        "Starting fleetwatch"
    );
    let fleet = Fleet::start(&settings, connector, store).await;

    let result = match args.export {
        Some(ref path) => {
            let collect_for = match args.collect_for {
                Some(ref s) => parse_duration(s).context("Invalid --collect-for")?,
                None => DEFAULT_COLLECT_FOR,
            };
            export_after(&fleet, path, &args.filter, collect_for).await
        }
        None => report_until_interrupted(&fleet, &settings, &args).await,
    };

    fleet.shutdown().await;
    result
}

/// Settings from file and environment, with command-line overrides on top.
fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref())?;

    if let Some(ref url) = args.url {
        settings.feed_url = url.clone();
    }
    if let Some(ref ttl) = args.ttl {
        settings.node_ttl = parse_duration(ttl).context("Invalid --ttl")?;
    }
    if let Some(ref delay) = args.reconnect_delay {
        settings.reconnect_delay = parse_duration(delay).context("Invalid --reconnect-delay")?;
    }
    if let Some(ref refresh) = args.refresh {
        settings.refresh_interval = parse_duration(refresh).context("Invalid --refresh")?;
    }

    settings.validate()?;
    Ok(settings)
}

/// Save limits for one node, starting from whatever is currently stored for it.
async fn set_threshold(settings: &Settings, ip: &str, args: &Args) -> Result<()> {
    let store = settings.threshold_store.build()?;
    let book = ThresholdBook::new();
    book.load(store.as_ref()).await;

    let mut threshold = book.get(ip);
    if let Some(cpu) = args.cpu_limit {
        threshold.cpu_limit = cpu;
    }
    if let Some(disk) = args.disk_limit {
        threshold.disk_limit = disk;
    }
    if let Some(load) = args.load_limit {
        threshold.load_limit = load;
    }

    book.save(store.as_ref(), NodeId::from(ip), threshold)
        .await
        .with_context(|| format!("Failed to save threshold for {}", ip))?;

    println!(
        "Saved threshold for {} to {}: cpu {}%, disk {}%, load {}",
        ip,
        store.description(),
        threshold.cpu_limit,
        threshold.disk_limit,
        threshold.load_limit
    );
    Ok(())
}

/// Print a fleet report every refresh interval until Ctrl-C.
async fn report_until_interrupted(fleet: &Fleet, settings: &Settings, args: &Args) -> Result<()> {
    let mut timer = tokio::time::interval(settings.refresh_interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted, shutting down");
                return Ok(());
            }
            _ = timer.tick() => print_report(fleet, &args.filter, args.rows),
        }
    }
}

fn print_report(fleet: &Fleet, filter: &str, rows_per_column: usize) {
    let view = fleet.view(filter);
    let summary = view.summary();
    let now = registry::now();

    println!(
        "fleet: {} nodes ({} healthy, {} critical) | feed {} | {} tracked",
        summary.total,
        summary.healthy,
        summary.critical,
        fleet.connection_state(),
        fleet.node_count(),
    );

    let columns = view.columns(rows_per_column);
    let paged = columns.len() > 1;
    for (i, column) in columns.iter().enumerate() {
        if paged {
            println!("-- column {}/{} --", i + 1, columns.len());
        }
        for row in column {
            println!("  {}", row.summary_line(now));
        }
    }

    for row in view.critical() {
        let reasons: Vec<String> = row.reasons.iter().map(|r| r.to_string()).collect();
        tracing::warn!(
            node = %row.entry.node_id(),
            host = %row.entry.snapshot.hostname,
            reasons = %reasons.join(", "),
            "Node critical"
        );
    }
}

/// Collect for `collect_for` (or until Ctrl-C), then write the fleet state as JSON.
async fn export_after(
    fleet: &Fleet,
    path: &Path,
    filter: &str,
    collect_for: Duration,
) -> Result<()> {
    tracing::info!(
        collect_for = %format_duration(collect_for),
        path = %path.display(),
        "Collecting before export"
    );

    tokio::select! {
        _ = tokio::time::sleep(collect_for) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted, exporting early");
        }
    }

    let export = fleet.view(filter).to_export_json(registry::now());
    let json = serde_json::to_string_pretty(&export)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Exported fleet state to: {}", path.display());
    Ok(())
}
