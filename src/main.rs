use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod engine;
mod metrics;
mod utils;
mod websocket;

use crate::config::AppConfig;
use crate::engine::{BboSnapshot, DepthSnapshot, MatchingEngine, Trade};

pub struct AppState {
    pub config: AppConfig,
    pub engine: Arc<MatchingEngine>,
    pub trade_tx: broadcast::Sender<Trade>,
    pub depth_tx: broadcast::Sender<DepthSnapshot>,
    pub bbo_tx: broadcast::Sender<BboSnapshot>,
    pub metrics: PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchbook=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting matchbook v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);

    // Install Prometheus recorder before anything emits metrics
    let metrics_handle = metrics::init_metrics();

    let engine = Arc::new(MatchingEngine::new());
    tracing::info!("Matching engine initialized");

    // Market data fan-out channels
    let (trade_tx, _) = broadcast::channel::<Trade>(config.event_capacity);
    let (depth_tx, _) = broadcast::channel::<DepthSnapshot>(config.event_capacity);
    let (bbo_tx, _) = broadcast::channel::<BboSnapshot>(config.event_capacity);

    // Bridge the engine's synchronous listener into the async fan-out.
    // The send never blocks the matching thread; it only fails when no
    // worker or subscriber is attached.
    {
        let trade_tx = trade_tx.clone();
        engine.register_trade_listener(move |trade: &Trade| {
            let _ = trade_tx.send(trade.clone());
        });
    }
    tracing::info!("Trade fan-out listener registered");

    // Start market data worker
    // Derives depth and BBO snapshots after each trade, off the matching
    // thread, and publishes them to the snapshot feeds.
    {
        let engine = engine.clone();
        let mut trade_rx = trade_tx.subscribe();
        let depth_tx = depth_tx.clone();
        let bbo_tx = bbo_tx.clone();
        tokio::spawn(async move {
            tracing::info!("Market data worker started");
            loop {
                match trade_rx.recv().await {
                    Ok(trade) => {
                        let _ = depth_tx.send(engine.depth(&trade.symbol));
                        let _ = bbo_tx.send(engine.bbo(&trade.symbol));
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Market data worker lagged {} trade events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::warn!("Market data worker stopped");
        });
    }

    // Build application state
    let state = Arc::new(AppState {
        config: config.clone(),
        engine,
        trade_tx,
        depth_tx,
        bbo_tx,
        metrics: metrics_handle,
    });

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api::routes::create_router(state.clone()))
        .nest("/ws", websocket::routes::create_router(state.clone()))
        .layer(axum::middleware::from_fn(
            api::middleware::metrics::metrics_middleware,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}
