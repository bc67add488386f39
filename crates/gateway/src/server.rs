use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Json, Router,
        extract::State,
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::get,
    },
    chrono::{DateTime, Utc},
    concierge_sessions::ConnectionState,
    serde::Serialize,
    tokio_util::sync::CancellationToken,
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
};

use crate::state::GatewayState;

/// Build the status router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/pairing-code", get(pairing_code_handler))
        .route("/qr", get(qr_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the status routes until `shutdown` is cancelled.
pub async fn start_gateway(
    bind: &str,
    port: u16,
    state: Arc<GatewayState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "status server listening");

    let app = build_gateway_app(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("status server stopped");
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true, "message": "Bot is alive" }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody<'a> {
    ok: bool,
    status: &'static str,
    timestamp: DateTime<Utc>,
    business_phone: &'a str,
    version: &'static str,
}

/// Liveness: answers `ok` whenever the process serves requests.
async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let ready = state.status.status().is_ready;
    Json(HealthBody {
        ok: true,
        status: if ready { "ready" } else { "not_ready" },
        timestamp: Utc::now(),
        business_phone: &state.business_phone,
        version: state.version,
    })
    .into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody<'a> {
    state: ConnectionState,
    /// Dashboard vocabulary (`qr_ready` instead of `pairing_ready`).
    status: &'static str,
    is_ready: bool,
    has_pairing_artifact: bool,
    #[serde(rename = "hasQR")]
    has_qr: bool,
    business_phone: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    since: DateTime<Utc>,
    timestamp: DateTime<Utc>,
}

async fn status_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let s = state.status.status();
    Json(StatusBody {
        state: s.state,
        status: s.state.dashboard_label(),
        is_ready: s.is_ready,
        has_pairing_artifact: s.has_pairing_artifact,
        has_qr: s.has_pairing_artifact,
        business_phone: &state.business_phone,
        phone_number: s.phone_number,
        reason: s.reason,
        since: s.since,
        timestamp: Utc::now(),
    })
    .into_response()
}

async fn pairing_code_handler(State(state): State<Arc<GatewayState>>) -> Response {
    match state.status.pairing_code() {
        Some(artifact) => Json(serde_json::json!({
            "artifact": artifact.payload,
            "issuedAt": artifact.issued_at,
        }))
        .into_response(),
        None => not_found("no pairing code available"),
    }
}

/// Dashboard alias of `/pairing-code`.
async fn qr_handler(State(state): State<Arc<GatewayState>>) -> Response {
    match state.status.pairing_code() {
        Some(artifact) => Json(serde_json::json!({ "qr": artifact.payload })).into_response(),
        None => not_found("No QR code available"),
    }
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}
