//! Bot configuration.
//!
//! [`BotConfig`] is built once at process start and shared by `Arc`
//! afterwards; nothing mutates it.  Values are layered:
//!
//! 1. Built-in defaults.
//! 2. The optional `[bot]` table of `config/default.toml`.
//! 3. Process environment variables (empty values count as unset).
//!
//! File keys are the lower-cased environment variable names, so
//! `MC_SERVER_URL` in the environment and `mc_server_url` in the file set the
//! same field.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{BotError, Result};

// ---------------------------------------------------------------------------
// Keys and defaults
// ---------------------------------------------------------------------------

pub const KEY_APP_ID: &str = "BOT_APPID";
pub const KEY_SECRET: &str = "BOT_SECRET";
pub const KEY_TARGET_GROUP: &str = "TARGET_GROUP";
pub const KEY_SERVER_NAME: &str = "SERVER_NAME";
pub const KEY_MC_SERVER_URL: &str = "MC_SERVER_URL";
pub const KEY_ZHIPU_API_KEY: &str = "ZHIPU_API_KEY";
pub const KEY_KIMI_API_KEY: &str = "KIMI_API_KEY";
pub const KEY_PERSONA: &str = "AI_PERSONA";
pub const KEY_HTTP_HOST: &str = "HTTP_HOST";
pub const KEY_HTTP_PORT: &str = "HTTP_PORT";
pub const KEY_RETRY_DELAY: &str = "BOT_RETRY_DELAY_SECS";
pub const KEY_MAX_RETRIES: &str = "BOT_MAX_RETRIES";
pub const KEY_STATUS_TIMEOUT: &str = "STATUS_TIMEOUT_SECS";
pub const KEY_CHAT_TIMEOUT: &str = "CHAT_TIMEOUT_SECS";

/// Default location of the optional configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

const DEFAULT_SERVER_NAME: &str = "GTNH 2.7.2";
const DEFAULT_MC_SERVER_URL: &str = "http://localhost:25555";
const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 8088;
const DEFAULT_RETRY_DELAY_SECS: u64 = 30;
const DEFAULT_STATUS_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 60;

/// System persona sent with every chat completion unless overridden.
pub const DEFAULT_PERSONA: &str = "你是 GTNH Minecraft 服务器群里的助手。\
     请用简洁、友好的中文回答玩家的问题，回答尽量控制在几段话以内。";

// ---------------------------------------------------------------------------
// BotConfig
// ---------------------------------------------------------------------------

/// Immutable runtime configuration.
#[derive(Clone)]
pub struct BotConfig {
    /// QQ bot application id.
    pub app_id: Option<String>,
    /// QQ bot application secret.
    pub secret: Option<String>,
    /// When set, only mentions from this group are handled.
    pub target_group: Option<String>,
    /// Display name used as the `[...]` label in status replies.
    pub server_name: String,
    /// Base URL of the Minecraft server status service.
    pub mc_server_url: String,
    /// Bearer token for the Zhipu chat API.
    pub zhipu_api_key: Option<String>,
    /// Bearer token for the Kimi (Moonshot) chat API.
    pub kimi_api_key: Option<String>,
    /// System persona for chat completions.
    pub persona: String,
    /// Health server bind host.
    pub http_host: String,
    /// Health server bind port.
    pub http_port: u16,
    /// Fixed delay between gateway reconnect attempts.
    pub retry_delay: Duration,
    /// Consecutive failures after which the supervisor gives up.
    pub max_retries: Option<u32>,
    /// Timeout for the Minecraft status request.
    pub status_timeout: Duration,
    /// Timeout for chat completion requests.
    pub chat_timeout: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            secret: None,
            target_group: None,
            server_name: DEFAULT_SERVER_NAME.to_owned(),
            mc_server_url: DEFAULT_MC_SERVER_URL.to_owned(),
            zhipu_api_key: None,
            kimi_api_key: None,
            persona: DEFAULT_PERSONA.to_owned(),
            http_host: DEFAULT_HTTP_HOST.to_owned(),
            http_port: DEFAULT_HTTP_PORT,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            max_retries: None,
            status_timeout: Duration::from_secs(DEFAULT_STATUS_TIMEOUT_SECS),
            chat_timeout: Duration::from_secs(DEFAULT_CHAT_TIMEOUT_SECS),
        }
    }
}

impl BotConfig {
    /// Load configuration from `config/default.toml` (if present) and the
    /// process environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Like [`BotConfig::load`] but with an explicit config file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let file = read_bot_table(path)?;
        Self::from_lookup(|key| env_non_empty(key).or_else(|| table_value(file.as_ref(), key)))
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Keys are the upper-case environment variable names (`KEY_*`).  Keys the
    /// lookup does not know keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            app_id: get(KEY_APP_ID),
            secret: get(KEY_SECRET),
            target_group: get(KEY_TARGET_GROUP),
            server_name: get(KEY_SERVER_NAME).unwrap_or(defaults.server_name),
            mc_server_url: get(KEY_MC_SERVER_URL).unwrap_or(defaults.mc_server_url),
            zhipu_api_key: get(KEY_ZHIPU_API_KEY),
            kimi_api_key: get(KEY_KIMI_API_KEY),
            persona: get(KEY_PERSONA).unwrap_or(defaults.persona),
            http_host: get(KEY_HTTP_HOST).unwrap_or(defaults.http_host),
            http_port: parse_or(get(KEY_HTTP_PORT), KEY_HTTP_PORT, defaults.http_port)?,
            retry_delay: parse_or(get(KEY_RETRY_DELAY), KEY_RETRY_DELAY, DEFAULT_RETRY_DELAY_SECS)
                .map(Duration::from_secs)?,
            max_retries: get(KEY_MAX_RETRIES)
                .map(|raw| parse_value(&raw, KEY_MAX_RETRIES))
                .transpose()?,
            status_timeout: parse_or(
                get(KEY_STATUS_TIMEOUT),
                KEY_STATUS_TIMEOUT,
                DEFAULT_STATUS_TIMEOUT_SECS,
            )
            .map(Duration::from_secs)?,
            chat_timeout: parse_or(get(KEY_CHAT_TIMEOUT), KEY_CHAT_TIMEOUT, DEFAULT_CHAT_TIMEOUT_SECS)
                .map(Duration::from_secs)?,
        })
    }

    /// Return the bot credentials, or an error naming the first missing one.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let app_id = self.app_id.as_deref().ok_or_else(|| BotError::MissingConfig {
            key: KEY_APP_ID.to_owned(),
        })?;
        let secret = self.secret.as_deref().ok_or_else(|| BotError::MissingConfig {
            key: KEY_SECRET.to_owned(),
        })?;
        Ok((app_id, secret))
    }

    /// Return the `host:port` string the health server binds to.
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(v: &Option<String>) -> &'static str {
            if v.is_some() { "<redacted>" } else { "<unset>" }
        }

        f.debug_struct("BotConfig")
            .field("app_id", &self.app_id)
            .field("secret", &redact(&self.secret))
            .field("target_group", &self.target_group)
            .field("server_name", &self.server_name)
            .field("mc_server_url", &self.mc_server_url)
            .field("zhipu_api_key", &redact(&self.zhipu_api_key))
            .field("kimi_api_key", &redact(&self.kimi_api_key))
            .field("persona_len", &self.persona.len())
            .field("http_host", &self.http_host)
            .field("http_port", &self.http_port)
            .field("retry_delay", &self.retry_delay)
            .field("max_retries", &self.max_retries)
            .field("status_timeout", &self.status_timeout)
            .field("chat_timeout", &self.chat_timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read an environment variable, treating an empty value as unset.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_value<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| BotError::InvalidConfig {
        key: key.to_owned(),
        reason: format!("`{raw}`: {e}"),
    })
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: fmt::Display,
{
    match raw {
        Some(raw) => parse_value(&raw, key),
        None => Ok(default),
    }
}

/// Read the `[bot]` table of a TOML file.  A missing file is not an error.
fn read_bot_table(path: &Path) -> Result<Option<toml::Table>> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using environment only");
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let mut table: toml::Table = content.parse()?;

    match table.remove("bot") {
        Some(toml::Value::Table(bot)) => Ok(Some(bot)),
        Some(_) => Err(BotError::InvalidConfig {
            key: "bot".to_owned(),
            reason: format!("`[bot]` in {} must be a table", path.display()),
        }),
        None => Ok(None),
    }
}

fn table_value(table: Option<&toml::Table>, key: &str) -> Option<String> {
    match table?.get(&key.to_ascii_lowercase())? {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
