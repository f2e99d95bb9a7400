//! End-to-end tests for the health and message HTTP API.
//!
//! These tests spin up the **real** server on an OS-assigned ephemeral port
//! and make actual HTTP requests via `reqwest`.  The Minecraft status URL
//! points at a closed port so no test depends on an outside service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use mcbot_core::router::AI_HELP_TEXT;
use mcbot_core::{BotConfig, CommandRouter, ConnectionSupervisor, SupervisorConfig};
use mcbot_web::{AppState, WebConfig, WebServer};

// ── helpers ──────────────────────────────────────────────────────────────────

struct TestServer {
    base: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<mcbot_web::Result<()>>,
}

fn test_router() -> Arc<CommandRouter> {
    let config = Arc::new(BotConfig {
        server_name: "Test".to_owned(),
        mc_server_url: "http://127.0.0.1:1".to_owned(),
        status_timeout: Duration::from_secs(2),
        ..BotConfig::default()
    });
    Arc::new(CommandRouter::from_config(config).expect("router"))
}

/// Bind to 127.0.0.1:0, start the server, return its base URL and handles.
async fn start_test_server(state: AppState) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to port 0");
    let addr: SocketAddr = listener.local_addr().expect("get local addr");
    let base = format!("http://127.0.0.1:{}", addr.port());

    let (tx, rx) = oneshot::channel::<()>();
    let server = WebServer::new(WebConfig::default(), state);
    let task = tokio::spawn(server.serve(listener, async {
        rx.await.ok();
    }));

    // Small yield so the listener is ready.
    tokio::time::sleep(Duration::from_millis(10)).await;

    TestServer {
        base,
        shutdown: Some(tx),
        task,
    }
}

async fn get_json(url: &str) -> (u16, Value) {
    let resp = reqwest::get(url).await.expect("request failed");
    let status = resp.status().as_u16();
    (status, resp.json().await.expect("invalid JSON"))
}

async fn post_message(base: &str, content: &str) -> Value {
    let resp = reqwest::Client::new()
        .post(format!("{base}/message"))
        .json(&json!({ "content": content }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 200);
    resp.json().await.expect("invalid JSON")
}

// ── GET /health ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_running() {
    let srv = start_test_server(AppState::new(test_router(), None)).await;

    let (status, body) = get_json(&format!("{}/health", srv.base)).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "ok", "message": "Service is running" }));
}

// ── GET / and /status ────────────────────────────────────────────────────────

#[tokio::test]
async fn status_without_bot_reports_null_snapshot() {
    let srv = start_test_server(AppState::new(test_router(), None)).await;

    for path in ["/", "/status"] {
        let (status, body) = get_json(&format!("{}{path}", srv.base)).await;
        assert_eq!(status, 200, "{path}");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "QQ Bot service is running");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["uptime_seconds"].is_u64());
        assert!(body["bot"].is_null(), "{path}: {body}");
    }
}

#[tokio::test]
async fn status_includes_supervisor_snapshot() {
    let supervisor = ConnectionSupervisor::new(SupervisorConfig {
        retry_delay: Duration::from_secs(30),
        max_retries: Some(5),
    });
    let state = AppState::new(test_router(), Some(supervisor.handle()));
    let srv = start_test_server(state).await;

    let (_, body) = get_json(&format!("{}/status", srv.base)).await;
    let bot = &body["bot"];
    assert_eq!(bot["phase"], "idle");
    assert_eq!(bot["running"], true);
    assert_eq!(bot["retry_count"], 0);
    assert_eq!(bot["max_retries"], 5);
    assert!(bot["last_error"].is_null());

    supervisor.handle().stop();
    let (_, body) = get_json(&format!("{}/status", srv.base)).await;
    assert_eq!(body["bot"]["running"], false);
}

// ── POST /message ────────────────────────────────────────────────────────────

#[tokio::test]
async fn message_without_command_has_no_replies() {
    let srv = start_test_server(AppState::new(test_router(), None)).await;

    let body = post_message(&srv.base, "hello everyone").await;
    assert_eq!(
        body,
        json!({ "success": true, "command": null, "replies": [] })
    );
}

#[tokio::test]
async fn message_ai_help_returns_usage() {
    let srv = start_test_server(AppState::new(test_router(), None)).await;

    let body = post_message(&srv.base, "@bot /AI对话").await;
    assert_eq!(body["command"], "/AI对话");
    assert_eq!(body["replies"], json!([AI_HELP_TEXT]));
}

#[tokio::test]
async fn message_status_with_offline_server() {
    let srv = start_test_server(AppState::new(test_router(), None)).await;

    let body = post_message(&srv.base, "/服务器人数").await;
    assert_eq!(body["command"], "/服务器人数");
    assert_eq!(body["replies"], json!(["[Test] 服务器当前可能已离线"]));
}

#[tokio::test]
async fn message_empty_prompt_asks_for_one() {
    let srv = start_test_server(AppState::new(test_router(), None)).await;

    let body = post_message(&srv.base, "/kimi   ").await;
    assert_eq!(body["command"], "/kimi");
    let replies = body["replies"].as_array().expect("replies array");
    assert_eq!(replies.len(), 1);
    assert!(replies[0].as_str().unwrap().contains("/kimi"), "{body}");
}

#[tokio::test]
async fn message_requires_content_field() {
    let srv = start_test_server(AppState::new(test_router(), None)).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/message", srv.base))
        .json(&json!({ "text": "/AI对话" }))
        .send()
        .await
        .expect("request failed");
    assert!(resp.status().is_client_error(), "got {}", resp.status());
}

// ── CORS and shutdown ────────────────────────────────────────────────────────

#[tokio::test]
async fn cors_allows_any_origin() {
    let srv = start_test_server(AppState::new(test_router(), None)).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/health", srv.base))
        .header("Origin", "https://example.org")
        .send()
        .await
        .expect("request failed");
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn cors_preflight_allows_any_method() {
    let srv = start_test_server(AppState::new(test_router(), None)).await;

    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{}/message", srv.base))
        .header("Origin", "https://example.org")
        .header("Access-Control-Request-Method", "DELETE")
        .header("Access-Control-Request-Headers", "x-custom")
        .send()
        .await
        .expect("request failed");
    assert!(resp.status().is_success(), "got {}", resp.status());
    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    assert_eq!(header("access-control-allow-origin").as_deref(), Some("*"));
    assert_eq!(header("access-control-allow-methods").as_deref(), Some("*"));
    assert_eq!(header("access-control-allow-headers").as_deref(), Some("*"));
}

#[tokio::test]
async fn graceful_shutdown_stops_server() {
    let mut srv = start_test_server(AppState::new(test_router(), None)).await;

    srv.shutdown.take().expect("sender").send(()).ok();
    let result = tokio::time::timeout(Duration::from_secs(5), srv.task)
        .await
        .expect("server should stop")
        .expect("server task panicked");
    assert!(result.is_ok());
}
