//! HTTP surface for mcbot.
//!
//! Keeps the process reachable for platform health checks and exposes the
//! command router for manual testing:
//!
//! - `GET /`, `GET /status` -- liveness plus the supervisor snapshot.
//! - `GET /health` -- bare liveness probe.
//! - `POST /message` -- run one message through the command router and
//!   return the replies instead of posting them to a group.

pub mod api;
pub mod error;
pub mod server;
pub mod state;

pub use error::{Result, WebError};
pub use server::WebServer;
pub use state::AppState;

use mcbot_core::BotConfig;

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8088,
        }
    }
}

impl From<&BotConfig> for WebConfig {
    fn from(config: &BotConfig) -> Self {
        Self {
            bind_addr: config.http_host.clone(),
            port: config.http_port,
        }
    }
}
