use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use infrastructure::StationConfig;
use station_agent::Station;
use station_agent::station::log_health;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config directory; defaults to the crate's config directory in development
    #[arg(long)]
    config_dir: Option<String>,

    /// Override station ID
    #[arg(long)]
    station_id: Option<String>,

    /// Override poll interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

async fn run() -> Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,station_agent=debug,application=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🤖 Station Agent Starting...");
    info!("🆔 Process ID: {}", std::process::id());

    let args = Args::parse();

    // Run from the workspace root during development
    let dev_config = "crates/station-agent/config";
    let config_dir = args.config_dir.unwrap_or_else(|| {
        if Path::new(dev_config).exists() {
            dev_config.to_string()
        } else {
            "config".to_string()
        }
    });
    info!("📂 Config directory: {}", config_dir);

    info!("Loading configuration...");
    let mut config = StationConfig::load(&config_dir)
        .with_context(|| format!("Failed to load configuration from {config_dir}"))?;
    if let Some(id) = args.station_id {
        config.station_id = id;
    }
    if let Some(ms) = args.poll_interval_ms {
        config.poll.interval_ms = ms;
    }
    info!(
        station_id = %config.station_id,
        poll_ms = config.poll.interval_ms,
        batch = config.poll.batch_size,
        "✅ Loaded configuration"
    );

    let station = Station::build(&config, Path::new(&config_dir))?;
    station.start().await?;
    log_health(&station.health(), station.cache.poll_count());

    let heartbeat_secs = config.heartbeat_interval_secs.max(1);
    let mut heartbeat = tokio::time::interval(Duration::from_secs(heartbeat_secs));
    heartbeat.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                match result {
                    Ok(()) => info!("🛑 Shutting down..."),
                    Err(err) => warn!(error = %err, "Unable to listen for shutdown signal"),
                }
                break;
            }
            _ = heartbeat.tick() => {
                log_health(&station.health(), station.cache.poll_count());
            }
        }
    }

    station.stop().await;

    info!("👋 Good bye!");
    Ok(())
}

fn main() {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("❌ Failed to start runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(run()) {
        eprintln!("\n❌ CRITICAL ERROR: {:?}", e);
        std::process::exit(1);
    }
}
