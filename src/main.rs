use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tower_http::services::ServeDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use railmap::{create_router, AppState, Config, DashboardSnapshot, MarkerLayer, Runtime};
use railmap_core::Dashboard;
use railmap_hub::{HubClient, HubConfig};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Optional: RAILMAP_HUB_URL, RAILMAP_LISTEN_ADDR (default: 0.0.0.0:3000)");
            eprintln!("Optional: RAILMAP_SERVER (default: PL1), RAILMAP_FOCUS_ZOOM (default: 14)");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting Railmap dashboard");
    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Hub: {}", config.hub_url);
    tracing::info!("Server: {}", config.server_code);

    // Connect to the hub in the background
    let hub = HubClient::start(HubConfig::new(config.hub_url.clone()));
    let (hub_handle, hub_events) = hub.into_parts();

    // Start the dashboard runtime
    let (snapshot_tx, snapshot_rx) =
        watch::channel(Arc::new(DashboardSnapshot::empty(&config.server_code)));
    let (action_tx, action_rx) = mpsc::channel(64);
    let dashboard = Dashboard::new(
        MarkerLayer::new(),
        config.server_code.clone(),
        config.focus_zoom,
    );
    let runtime = Runtime::new(dashboard, Arc::new(hub_handle), snapshot_tx);
    tokio::spawn(runtime.run(hub_events, action_rx));

    // Build router
    let state = AppState::new(snapshot_rx, action_tx);
    let app = create_router(state).nest_service("/static", ServeDir::new("static"));

    // Start server
    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server running at http://{}", config.listen_addr);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
