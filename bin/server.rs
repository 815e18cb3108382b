// Balance Ledger - Web Server
// REST API over the ledger session with Axum

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use balance_ledger::{
    balance, init_tracing, open_session, Action, Config, KeyRegistry, Ledger, LedgerSession,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
struct AppState {
    session: Arc<LedgerSession>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }

    fn err(status: StatusCode, error: impl ToString) -> Response {
        (
            status,
            Json(Self {
                success: false,
                data: None,
                error: Some(error.to_string()),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct BalanceResponse {
    balance: f64,
    count: usize,
}

/// Body of POST /api/changes: the raw form fields
#[derive(Deserialize)]
struct NewChangeRequest {
    amount: String,
    #[serde(default)]
    description: String,
}

fn loaded(state: &AppState) -> Result<Ledger, Response> {
    state
        .session
        .changes()
        .ok_or_else(|| ApiResponse::<()>::err(StatusCode::SERVICE_UNAVAILABLE, "ledger not loaded"))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/changes - All changes, newest first
async fn get_changes(State(state): State<AppState>) -> Response {
    match loaded(&state) {
        Ok(changes) => ApiResponse::ok(changes),
        Err(response) => response,
    }
}

/// GET /api/balance - Derived balance
async fn get_balance(State(state): State<AppState>) -> Response {
    match loaded(&state) {
        Ok(changes) => ApiResponse::ok(BalanceResponse {
            balance: balance(&changes),
            count: changes.len(),
        }),
        Err(response) => response,
    }
}

/// POST /api/changes - Add a change from form input
async fn add_change(
    State(state): State<AppState>,
    Json(request): Json<NewChangeRequest>,
) -> Response {
    match state.session.push_input(&request.amount, &request.description) {
        Ok(changes) => ApiResponse::ok(changes),
        Err(e) => {
            warn!(amount = %request.amount, error = %e, "rejected change");
            ApiResponse::<()>::err(StatusCode::BAD_REQUEST, e)
        }
    }
}

/// DELETE /api/changes/:id - Remove a change (no-op if absent)
async fn delete_change(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    ApiResponse::ok(state.session.delete(id))
}

/// POST /api/reset - Remove every change
async fn reset(State(state): State<AppState>) -> Response {
    ApiResponse::ok(state.session.reset())
}

/// POST /api/actions - Dispatch a tagged action as-is
async fn dispatch(State(state): State<AppState>, Json(action): Json<Action>) -> Response {
    ApiResponse::ok(state.session.dispatch(action))
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/changes", get(get_changes).post(add_change))
        .route("/changes/:id", delete(delete_change))
        .route("/balance", get(get_balance))
        .route("/reset", post(reset))
        .route("/actions", post(dispatch))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("balance_ledger=info,ledger_server=info,tower_http=info");

    let config = Config::from_env();
    let registry = KeyRegistry::new();
    let session = Arc::new(open_session(&config, &registry).await?);
    info!(db = ?config.db_path, key = %config.key, "ledger loaded");

    let state = AppState {
        session: Arc::clone(&session),
    };

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.addr))?;

    info!(addr = %config.addr, "server running");
    println!("\n🚀 Server running on http://{}", config.addr);
    println!("   API: http://{}/api/changes", config.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    // Drain background writes before exiting
    session.store().flush().await;
    info!("server stopped");

    Ok(())
}
