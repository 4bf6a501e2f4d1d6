//! Axum HTTP routes for the alert dashboard.

use crate::alert::Alert;
use crate::config::ServeArgs;
use crate::error::{ServerError, ServerResult};
use crate::server::store::AlertStore;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

/// Shared application state
pub struct AppState {
    pub store: AlertStore,
}

impl AppState {
    pub fn new(alerts_file: impl Into<std::path::PathBuf>) -> Self {
        Self {
            store: AlertStore::new(alerts_file),
        }
    }
}

// ─── Route builder ───────────────────────────────────────────────

pub fn build_router(state: Arc<AppState>, static_dir: &Path) -> Router {
    let api = Router::new().route("/alerts", get(list_alerts));

    Router::new()
        .route("/alerts", post(receive_alert))
        .nest("/api", api)
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Handlers ────────────────────────────────────────────────────

async fn receive_alert(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ServerResult<impl IntoResponse> {
    let mut alert: Alert = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Invalid JSON payload");
        ServerError::BadRequest("Invalid JSON".into())
    })?;

    if alert.missing_fields() {
        return Err(ServerError::BadRequest("Missing required fields".into()));
    }

    alert.timestamp.get_or_insert_with(Utc::now);

    let host = alert.host.clone();
    let path = alert.path.clone();
    let expires = alert
        .expiration_date
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();

    state.store.upsert(alert).await.map_err(|e| {
        error!(error = %e, "Failed to save alerts");
        e
    })?;

    info!(host = %host, path = %path, expires = %expires, "Alert received");

    Ok(Json(serde_json::json!({
        "message": "Alert received successfully",
    })))
}

async fn list_alerts(State(state): State<Arc<AppState>>) -> ServerResult<impl IntoResponse> {
    let alerts = state.store.load().await.map_err(|e| {
        error!(error = %e, "Failed to load alerts");
        e
    })?;

    Ok(Json(alerts))
}

// ─── Server startup ──────────────────────────────────────────────

/// Start the dashboard server and run until Ctrl-C
pub async fn serve(args: &ServeArgs) -> ServerResult<()> {
    let listener = TcpListener::bind((args.bind.as_str(), args.port)).await?;
    let addr = listener.local_addr()?;

    let state = Arc::new(AppState::new(&args.alerts_file));
    let router = build_router(state, &args.static_dir);

    info!(
        addr = %addr,
        alerts_file = %args.alerts_file.display(),
        static_dir = %args.static_dir.display(),
        "Dashboard running"
    );
    eprintln!("Dashboard: http://{}/", addr);
    eprintln!("API endpoints:");
    eprintln!("  POST /alerts");
    eprintln!("  GET  /api/alerts");

    serve_on(listener, router, shutdown_signal()).await?;

    info!("Dashboard shut down");
    Ok(())
}

/// Serve `router` on an already bound listener until `shutdown` resolves
pub async fn serve_on<F>(listener: TcpListener, router: Router, shutdown: F) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down HTTP server"),
        Err(e) => {
            // No signal handler: run until the process is killed
            error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}
