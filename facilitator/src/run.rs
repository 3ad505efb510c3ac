//! x402 facilitator HTTP entrypoint.
//!
//! Endpoints:
//! - `POST /prepare` – Build an unsigned transfer for a wallet
//! - `POST /settle` – Settle a signed payment on-chain
//! - `POST /simulate` – Dry-run a transaction
//! - `GET /jobs/{jobId}` – Read a job registered by a trustless settlement
//! - `GET /supported` – List supported payment kinds and fee payers
//! - `GET /health` – Liveness probe
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control binding address
//! - `OTEL_*` variables enable trace and metric export
//! - `RUST_LOG` sets the log filter

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use x402_facilitator_local::util::SigDown;
use x402_facilitator_local::{FacilitatorLocal, handlers};
use x402_types::chain::ChainRegistry;
use x402_types::chain::FromConfig;

#[cfg(feature = "telemetry")]
use x402_facilitator_local::util::Telemetry;

use crate::chain::ChainFacilitator;
use crate::config::Config;

/// Initializes the x402 facilitator server.
///
/// - Loads `.env` variables.
/// - Installs tracing, with OpenTelemetry export when configured.
/// - Connects to every configured Solana cluster.
/// - Serves the facilitator endpoints until SIGTERM or SIGINT.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to initialize rustls crypto provider")?;

    dotenv().ok();

    #[cfg(feature = "telemetry")]
    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;

    let chain_registry: ChainRegistry<ChainFacilitator> =
        ChainRegistry::from_config(config.chains()).await?;
    if chain_registry.is_empty() {
        tracing::warn!("No chains configured; every payment request will be rejected");
    }
    for chain in chain_registry.values() {
        tracing::info!(network = %chain.network(), "Chain ready");
    }

    let facilitator = FacilitatorLocal::new(chain_registry);
    let axum_state = Arc::new(facilitator);

    let http_endpoints = Router::new().merge(handlers::routes().with_state(axum_state));
    #[cfg(feature = "telemetry")]
    let http_endpoints = http_endpoints.layer(telemetry.http_tracing());
    let http_endpoints = http_endpoints.layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(sig_down.shutdown())
        .await?;
    tracing::info!("Server stopped");

    Ok(())
}
