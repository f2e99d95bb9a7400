//! Shared application state for the web server.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use mcbot_core::{CommandRouter, SupervisorHandle};

/// Shared state accessible from every Axum handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Router used by `POST /message`.
    pub router: Arc<CommandRouter>,

    /// Handle to the gateway supervisor; `None` when the bot is not running
    /// (no credentials configured).
    pub supervisor: Option<SupervisorHandle>,

    /// When the server state was created, for uptime reporting.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(router: Arc<CommandRouter>, supervisor: Option<SupervisorHandle>) -> Self {
        Self {
            router,
            supervisor,
            started_at: Utc::now(),
        }
    }

    /// Whole seconds since the state was created.
    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}
