//! Server assembly: configuration, router, background sweep, shutdown.
//!
//! - Loads `.env` variables and initializes `tracing`.
//! - Loads and validates the route configuration (fail fast on bad config).
//! - Builds an Axum router with one payment gate layer per protected route.
//! - Runs a periodic sweep evicting expired descriptor nonces.
//! - Serves until SIGTERM/SIGINT, then shuts down gracefully.

use axum::Router;
use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::{MethodRouter, get};
use dotenvy::dotenv;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tollbooth::nonce::InMemoryNonceStore;
use tollbooth::timestamp::UnixTimestamp;
use tollbooth_axum::TollboothMiddleware;

use crate::config::Config;
use crate::sig_down::SigDown;

/// Paths this server can actually serve behind the gate.
///
/// The route configuration may gate any subset of these; a configured path
/// outside this list is a startup error.
const GATEABLE_PATHS: &[&str] = &["/weather"];

fn content_route(path: &str) -> Option<MethodRouter> {
    match path {
        "/weather" => Some(get(weather)),
        _ => None,
    }
}

/// Initializes the tollbooth resource server.
///
/// Binds to the address specified by the config file (or `HOST`/`PORT` env
/// vars) and serves the configured routes, payment-gated.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env variables
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    let resolved = config.resolve(GATEABLE_PATHS)?;
    tracing::info!(network = %resolved.network, "accepting payments");

    let store = Arc::new(InMemoryNonceStore::new());
    let mut tollbooth = TollboothMiddleware::new(Arc::clone(&store))
        .with_descriptor_ttl(resolved.descriptor_ttl_seconds);
    if let Some(base_url) = &resolved.base_url {
        tollbooth = tollbooth.with_base_url(base_url.clone());
    }

    let mut app = Router::new()
        .route("/", get(index))
        .route("/health", get(health));
    for route in &resolved.routes {
        let handler = content_route(&route.path).expect("validated against GATEABLE_PATHS");
        app = app.route(
            &route.path,
            handler.layer(
                tollbooth
                    .with_price_tag(route.price.clone())
                    .with_description(route.description.clone()),
            ),
        );
        tracing::info!(
            path = %route.path,
            amount = %route.price.amount,
            network = %route.price.network,
            "gated route"
        );
    }
    let app = app.layer(TraceLayer::new_for_http()).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let sig_down = SigDown::try_new()?;

    // Expired descriptors are also evicted lazily on lookup; the sweep keeps
    // the store from accumulating nonces nobody ever retried.
    let sweep_token = sig_down.cancellation_token();
    let sweep_store = Arc::clone(&store);
    let sweep_interval = Duration::from_secs(resolved.sweep_interval_seconds.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            tokio::select! {
                _ = sweep_token.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = sweep_store.evict_expired(UnixTimestamp::now());
                    if evicted > 0 {
                        tracing::debug!(evicted, "swept expired descriptors");
                    }
                }
            }
        }
    });

    let addr = SocketAddr::new(resolved.host, resolved.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, app)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}

async fn index() -> impl IntoResponse {
    "tollbooth resource server is up. Try /health or /weather"
}

async fn health() -> impl IntoResponse {
    axum::Json(json!({ "ok": true }))
}

async fn weather() -> impl IntoResponse {
    axum::Json(json!({
        "temp": 72,
        "condition": "Sunny",
        "location": "Base Sepolia (demo)",
    }))
}
