//! Feral soul release daemon. Entry point.
//!
//! Drives the five-step release wizard (connect wallet, submit identifier,
//! generate bot wallet, fund it, confirm the release) as a single session
//! task, and exposes it through a small Axum REST API.

mod abi;
mod api;
mod chain;
mod config;
mod context;
mod errors;
mod funding;
mod i18n;
mod identifier;
mod keygen;
mod prepare;
mod rpc;
mod session;
mod units;
mod wizard;

#[cfg(test)]
mod test_wizard;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use context::AppContext;
use session::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    let addr = format!("0.0.0.0:{}", config.api_port);

    let ctx = Arc::new(AppContext::from_config(config)?);
    let shutdown = CancellationToken::new();

    // ─── Wizard session ───────────────────────────────────
    let session = Session::spawn(ctx.clone(), shutdown.clone());

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { ctx, session });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/wizard", get(api::get_wizard))
        .route("/wizard/connect", post(api::connect))
        .route("/wizard/identifier", post(api::submit_identifier))
        .route("/wizard/wallet", post(api::generate_wallet))
        .route("/wizard/wallet/export", post(api::export_wallet))
        .route("/wizard/confirmation", post(api::set_confirmation))
        .route("/wizard/release", post(api::release))
        .route("/souls/:hash", get(api::get_soul))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
