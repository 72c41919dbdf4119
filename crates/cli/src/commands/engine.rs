//! Engine bootstrap shared by every command: configuration to a
//! running [`SessionSupervisor`].

use anyhow::{Context, Result};
use sentinel_core::{AppConfig, SignalProvider, VenueConnector};
use sentinel_router::{OrderRouter, PaperVenue};
use sentinel_signal::{FallbackSignalProvider, MomentumSignalProvider, RestSignalProvider};
use sentinel_store::Store;
use sentinel_supervisor::{EngineContext, SessionSupervisor};
use sentinel_venue_alpaca::AlpacaConnector;
use sentinel_venue_binance::BinanceConnector;
use std::sync::Arc;
use tracing::warn;

/// Builds the full engine from configuration: store, live and paper
/// routers, signal provider, supervisor.
pub async fn build_supervisor(config: &AppConfig) -> Result<SessionSupervisor> {
    let store = Store::new(&config.database.url, config.database.max_connections)
        .await
        .context("opening the session store")?;

    let live_router = Arc::new(build_live_router(config));
    let paper_router = Arc::new(build_paper_router(config));
    let signals = build_signals(config)?;

    let ctx = EngineContext::new(
        store,
        live_router,
        paper_router,
        signals,
        config.engine.clone(),
        config.risk.clone(),
        config.venues.paper.starting_balance,
    );
    Ok(SessionSupervisor::new(ctx))
}

/// Live connectors in the configured priority order. A venue that is
/// disabled or missing credentials is skipped with a warning; live
/// sessions never degrade to the paper venue.
fn build_live_router(config: &AppConfig) -> OrderRouter {
    let mut connectors: Vec<Arc<dyn VenueConnector>> = Vec::new();
    for venue in &config.venues.priority {
        match venue.as_str() {
            "binance" => {
                if !config.venues.binance.enabled {
                    continue;
                }
                match BinanceConnector::from_env(&config.venues.binance) {
                    Ok(connector) => connectors.push(Arc::new(connector)),
                    Err(error) => {
                        warn!(venue = venue.as_str(), %error, "venue not usable, skipping");
                    }
                }
            }
            "alpaca" => {
                if !config.venues.alpaca.enabled {
                    continue;
                }
                match AlpacaConnector::from_env(&config.venues.alpaca) {
                    Ok(connector) => connectors.push(Arc::new(connector)),
                    Err(error) => {
                        warn!(venue = venue.as_str(), %error, "venue not usable, skipping");
                    }
                }
            }
            other => warn!(venue = other, "unknown venue in priority list, skipping"),
        }
    }
    if connectors.is_empty() {
        warn!("no live venue configured; live sessions will not fill orders");
    }
    OrderRouter::new(connectors)
}

/// Paper sessions route through the deterministic paper venue alone.
fn build_paper_router(config: &AppConfig) -> OrderRouter {
    let paper = PaperVenue::new(&config.venues.paper, config.engine.tick_interval_secs);
    OrderRouter::new(vec![Arc::new(paper)])
}

fn build_signals(config: &AppConfig) -> Result<Arc<dyn SignalProvider>> {
    let momentum =
        MomentumSignalProvider::new(config.signal.fast_window, config.signal.slow_window);
    match config.signal.provider.as_str() {
        "momentum" => Ok(Arc::new(momentum)),
        "rest" => {
            let endpoint = config
                .signal
                .endpoint
                .as_deref()
                .context("signal.endpoint is required for the rest provider")?;
            let rest = RestSignalProvider::new(endpoint, config.signal.timeout_secs)?;
            // A remote outage degrades to the built-in heuristic.
            Ok(Arc::new(FallbackSignalProvider::new(
                Arc::new(rest),
                Arc::new(momentum),
            )))
        }
        other => anyhow::bail!("unknown signal provider: {other}"),
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to create SIGTERM handler");
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .expect("failed to create SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, detaching monitors");
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT, detaching monitors");
        }
    }
}
