use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use whatsapp_gateway::config::Config;
use whatsapp_gateway::{
    AppState, BridgeTransport, FileCredentialStore, SessionManager, SessionStatus, StatusSnapshot,
    whatsapp_routes,
};

/// Application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Ensure a directory exists, creating it if necessary
fn ensure_directory(path: &Path, name: &str) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created {} directory: {:?}", name, path);
        Ok(())
    } else if path.is_dir() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} path {:?} exists but is not a directory", name, path),
        ))
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    whatsapp: StatusSnapshot,
    uptime_seconds: u64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);
    let whatsapp = state.session_manager.status().await;

    // The HTTP layer is up either way; a dropped session only degrades notifications
    let status = if whatsapp.status == SessionStatus::Connected {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        whatsapp,
        uptime_seconds: uptime,
    })
}

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Update gauge metrics for the session (called periodically)
async fn update_gauge_metrics(state: &AppState) {
    let snapshot = state.session_manager.status().await;

    let connected = if snapshot.status == SessionStatus::Connected { 1.0 } else { 0.0 };
    let pairing = if snapshot.status == SessionStatus::Pairing { 1.0 } else { 0.0 };
    metrics::gauge!("whatsapp_connected").set(connected);
    metrics::gauge!("whatsapp_pairing").set(pairing);
    metrics::gauge!("whatsapp_reconnect_exhausted")
        .set(if snapshot.reconnect_exhausted { 1.0 } else { 0.0 });
    metrics::gauge!("whatsapp_connection_attempts").set(snapshot.connection_attempts as f64);

    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);
    metrics::gauge!("whatsapp_gateway_uptime_seconds").set(uptime as f64);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Record server start time
    START_TIME.set(Instant::now()).ok();

    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whatsapp_gateway=debug,wa_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: host={}, port={}, session={}",
        config.host, config.port, config.whatsapp.session_name
    );
    info!("Protocol bridge: {}", config.whatsapp.bridge_url);

    if let Err(e) = ensure_directory(&config.whatsapp.auth_dir, "credentials") {
        warn!(
            "Failed to create credentials directory {:?}: {}",
            config.whatsapp.auth_dir, e
        );
    }

    let transport = Arc::new(BridgeTransport::new(config.whatsapp.bridge_config()));
    let store = Arc::new(FileCredentialStore::new(config.whatsapp.auth_dir.clone()));
    let session_manager = Arc::new(SessionManager::with_config(
        transport,
        store,
        config.whatsapp.session_manager_config(),
    ));

    if config.whatsapp.auto_start {
        session_manager.start().await;
    } else {
        info!("WA_AUTO_START disabled; POST /api/whatsapp/start to connect");
    }

    let app_state = AppState::new(session_manager.clone());

    // Periodic update of gauge metrics (every 5 seconds)
    let metrics_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            update_gauge_metrics(&metrics_state).await;
        }
    });

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics/prometheus", get(prometheus_metrics))
        .nest("/api/whatsapp", whatsapp_routes())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("WhatsApp gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    session_manager.shutdown().await;
    Ok(())
}
