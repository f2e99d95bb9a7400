//! Minecraft server status client.
//!
//! Issues a single `GET {base_url}/status` and turns the JSON body into a
//! [`ServerStatus`].  Every failure mode (transport error, non-200 status,
//! non-object body) collapses into `None`, which callers render with the
//! "offline" fallback.  There are no retries here.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BotConfig;
use crate::error::Result;

const DEFAULT_UPTIME: &str = "未知";
const DEFAULT_DETAILS: &str = "无";
const DEFAULT_RANKING: &str = "暂无排行数据";

/// Phrase every "server unavailable" reply contains.
pub const OFFLINE_PHRASE: &str = "服务器当前可能已离线";

// ---------------------------------------------------------------------------
// ServerStatus
// ---------------------------------------------------------------------------

/// Status fields reported by the Minecraft status service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub online_count: i64,
    pub server_uptime: String,
    pub details: String,
    pub daily_ranking: String,
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self {
            online_count: 0,
            server_uptime: DEFAULT_UPTIME.to_owned(),
            details: DEFAULT_DETAILS.to_owned(),
            daily_ranking: DEFAULT_RANKING.to_owned(),
        }
    }
}

impl ServerStatus {
    /// Extract the known fields from a JSON object.
    ///
    /// Each field is read independently; a missing or unusable field keeps
    /// its default and never invalidates the others.
    pub fn from_json(value: &Value) -> Self {
        let defaults = Self::default();

        let online_count = value
            .get("onlineCount")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .unwrap_or(defaults.online_count);

        Self {
            online_count,
            server_uptime: text_field(value, "serverUptime").unwrap_or(defaults.server_uptime),
            details: text_field(value, "details").unwrap_or(defaults.details),
            daily_ranking: text_field(value, "dailyRanking").unwrap_or(defaults.daily_ranking),
        }
    }
}

/// Strings are used as-is; other non-null JSON values are rendered.
fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// The reply for an unreachable server.
pub fn format_offline(server_name: &str) -> String {
    format!("[{server_name}] {OFFLINE_PHRASE}")
}

/// The three-line player count reply.
pub fn format_player_count(server_name: &str, status: Option<&ServerStatus>) -> String {
    match status {
        Some(s) => format!(
            "[{server_name}] 在线人数: {}\n服务器已运行: {}\n在线玩家详情: {}",
            s.online_count, s.server_uptime, s.details
        ),
        None => format_offline(server_name),
    }
}

/// The daily online-time ranking reply.
pub fn format_daily_ranking(server_name: &str, status: Option<&ServerStatus>) -> String {
    match status {
        Some(s) => format!("[{server_name}]\n{}", s.daily_ranking),
        None => format_offline(server_name),
    }
}

// ---------------------------------------------------------------------------
// StatusClient
// ---------------------------------------------------------------------------

/// HTTP client for the Minecraft status service.
#[derive(Debug, Clone)]
pub struct StatusClient {
    http: reqwest::Client,
    status_url: String,
}

impl StatusClient {
    /// Create a client for `{base_url}/status` with the given request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            status_url: format!("{}/status", base_url.trim_end_matches('/')),
        })
    }

    /// Create a client from the shared configuration.
    pub fn from_config(config: &BotConfig) -> Result<Self> {
        Self::new(&config.mc_server_url, config.status_timeout)
    }

    /// The full URL this client queries.
    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    /// Fetch the current server status, or `None` if it is unavailable.
    pub async fn fetch_status(&self) -> Option<ServerStatus> {
        let response = match self.http.get(&self.status_url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %self.status_url, error = %e, "failed to reach status endpoint");
                return None;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            warn!(
                url = %self.status_url,
                status = %response.status(),
                "status endpoint returned non-200"
            );
            return None;
        }

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(url = %self.status_url, error = %e, "status response is not JSON");
                return None;
            }
        };

        if !body.is_object() {
            warn!(url = %self.status_url, "status response is not a JSON object");
            return None;
        }

        debug!(url = %self.status_url, "status fetched");
        Some(ServerStatus::from_json(&body))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
