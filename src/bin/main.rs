use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use decentramind::{build_services, spawn_expiry_sweep, spawn_market_refresh};
use dmind_core::{init_logging, DecentraMindConfig};

#[derive(Parser)]
#[command(name = "decentramind")]
#[command(about = "DecentraMind accounting daemon", long_about = None)]
struct Args {
    /// Configuration file (defaults to ./decentramind.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address, e.g. 0.0.0.0:8080
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("info");
    let args = Args::parse();

    let config = DecentraMindConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    let addr: SocketAddr = match args.bind {
        Some(addr) => addr,
        None => config
            .bind_address()
            .parse()
            .with_context(|| format!("invalid listen address {}", config.bind_address()))?,
    };

    let services = build_services(&config)?;
    let economics = services.app.economics.clone();

    let sweep = spawn_expiry_sweep(
        economics.clone(),
        services.app.auth.clone(),
        services.store.clone(),
        Duration::from_secs(config.scheduler.expiry_sweep_secs),
    );
    let refresh = spawn_market_refresh(
        economics.market.clone(),
        services.market_provider.clone(),
        config.market.coin_ids.clone(),
        Duration::from_secs(config.market.refresh_secs),
    );

    let backend = if services.store.has_primary() { "firestore+memory" } else { "memory" };
    info!(store = backend, "🚀 DecentraMind daemon starting");

    tokio::select! {
        _ = dmind_rpc::serve(addr, services.app.clone()) => {}
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    sweep.abort();
    refresh.abort();
    Ok(())
}
