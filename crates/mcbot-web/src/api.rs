//! REST API route handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::info;

use mcbot_core::{BufferedMessage, SupervisorSnapshot};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET / and GET /status
// ---------------------------------------------------------------------------

/// Response payload for the `/` and `/status` endpoints.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Supervisor state; `null` when the bot is disabled.
    pub bot: Option<SupervisorSnapshot>,
}

/// Liveness plus the gateway supervisor's current state.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".into(),
        message: "QQ Bot service is running".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: state.uptime_seconds(),
        bot: state.supervisor.as_ref().map(|s| s.snapshot()),
    })
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Bare liveness probe.  Never touches the bot or the network.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        message: "Service is running".into(),
    })
}

// ---------------------------------------------------------------------------
// POST /message
// ---------------------------------------------------------------------------

/// Request body for `POST /message`.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

/// Response body for `POST /message`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    /// The matched command token, or `null` when nothing matched.
    pub command: Option<String>,
    pub replies: Vec<String>,
}

/// Route one message through the command router and return its replies.
pub async fn message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MessageRequest>,
) -> Json<MessageResponse> {
    let incoming = BufferedMessage::new(body.content);
    let command = state.router.dispatch(&incoming).await;

    info!(
        command = command.as_ref().map(|c| c.token()).unwrap_or("-"),
        "handled message over HTTP"
    );

    Json(MessageResponse {
        success: true,
        command: command.map(|c| c.token().to_owned()),
        replies: incoming.into_replies(),
    })
}
