//! Integration tests for the status HTTP surface.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{net::SocketAddr, sync::Arc};

use {
    concierge_channels::LoginOutcome,
    concierge_gateway::{GatewayState, build_gateway_app, start_gateway},
    concierge_sessions::{SessionLifecycle, StatusSurface},
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
};

/// Start a test server over a fresh lifecycle.
async fn start_server() -> (SocketAddr, Arc<SessionLifecycle>) {
    let lifecycle = Arc::new(SessionLifecycle::new());
    let state = Arc::new(GatewayState::new(
        StatusSurface::new(Arc::clone(&lifecycle)),
        "+972525587933",
    ));
    let app = build_gateway_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, lifecycle)
}

async fn get_json(addr: SocketAddr, path: &str) -> (u16, serde_json::Value) {
    let resp = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn root_and_health_answer_while_disconnected() {
    let (addr, _) = start_server().await;

    let (code, body) = get_json(addr, "/").await;
    assert_eq!(code, 200);
    assert_eq!(body["ok"], true);

    let (code, body) = get_json(addr, "/health").await;
    assert_eq!(code, 200);
    assert_eq!(body["ok"], true);
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["businessPhone"], "+972525587933");
}

#[tokio::test]
async fn status_reports_initial_state() {
    let (addr, _) = start_server().await;

    let (code, body) = get_json(addr, "/status").await;
    assert_eq!(code, 200);
    assert_eq!(body["state"], "disconnected");
    assert_eq!(body["status"], "disconnected");
    assert_eq!(body["isReady"], false);
    assert_eq!(body["hasPairingArtifact"], false);
    assert_eq!(body["hasQR"], false);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn pairing_code_is_served_only_while_pairing() {
    let (addr, lifecycle) = start_server().await;

    let (code, body) = get_json(addr, "/pairing-code").await;
    assert_eq!(code, 404);
    assert!(body["error"].is_string());

    lifecycle.on_pairing_code_issued("data:image/png;base64,QR".into(), Some(1));

    let (code, body) = get_json(addr, "/pairing-code").await;
    assert_eq!(code, 200);
    assert_eq!(body["artifact"], "data:image/png;base64,QR");

    let (code, body) = get_json(addr, "/qr").await;
    assert_eq!(code, 200);
    assert_eq!(body["qr"], "data:image/png;base64,QR");

    let (_, body) = get_json(addr, "/status").await;
    assert_eq!(body["state"], "pairing_ready");
    assert_eq!(body["status"], "qr_ready");
    assert_eq!(body["hasPairingArtifact"], true);

    lifecycle.on_login_result(LoginOutcome::Success {
        phone_number: Some("972525587933".into()),
    });

    let (code, _) = get_json(addr, "/qr").await;
    assert_eq!(code, 404);

    let (_, body) = get_json(addr, "/status").await;
    assert_eq!(body["state"], "connected");
    assert_eq!(body["isReady"], true);
    assert_eq!(body["hasPairingArtifact"], false);
    assert_eq!(body["phoneNumber"], "972525587933");

    let (_, body) = get_json(addr, "/health").await;
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn failed_state_is_visible() {
    let (addr, lifecycle) = start_server().await;
    lifecycle.on_init_failed("browser could not start".into());

    let (_, body) = get_json(addr, "/status").await;
    assert_eq!(body["state"], "failed");
    assert_eq!(body["reason"], "browser could not start");

    // Liveness does not depend on the transport.
    let (code, body) = get_json(addr, "/health").await;
    assert_eq!(code, 200);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn server_stops_on_cancel() {
    let lifecycle = Arc::new(SessionLifecycle::new());
    let state = Arc::new(GatewayState::new(StatusSurface::new(lifecycle), ""));
    let shutdown = CancellationToken::new();

    // Port 0 picks a free port; only shutdown behaviour is checked here.
    let server = tokio::spawn(start_gateway("127.0.0.1", 0, state, shutdown.clone()));
    shutdown.cancel();

    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn cors_headers_are_present() {
    let (addr, _) = start_server().await;
    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/status"))
        .header("origin", "http://dashboard.example")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
