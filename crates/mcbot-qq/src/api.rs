//! QQ Open Platform REST calls: access tokens, gateway discovery, and group
//! replies.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::{QqError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const TOKEN_URL: &str = "https://bots.qq.com/app/getAppAccessToken";
const API_BASE_URL: &str = "https://api.sgroup.qq.com";

/// Refresh the cached token this long before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Platform endpoints; overridable for the sandbox environment and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QqEndpoints {
    pub token_url: String,
    pub api_base: String,
}

impl Default for QqEndpoints {
    fn default() -> Self {
        Self {
            token_url: TOKEN_URL.to_owned(),
            api_base: API_BASE_URL.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Access tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    /// Seconds; the platform sends this as a string.
    expires_in: Option<Value>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Fetches and caches the app access token.
pub struct TokenSource {
    http: reqwest::Client,
    url: String,
    app_id: String,
    secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSource")
            .field("url", &self.url)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl TokenSource {
    pub fn new(http: reqwest::Client, url: impl Into<String>, app_id: &str, secret: &str) -> Self {
        Self {
            http,
            url: url.into(),
            app_id: app_id.to_owned(),
            secret: secret.to_owned(),
            cached: Mutex::new(None),
        }
    }

    /// Return a valid access token, fetching a new one when the cached token
    /// is missing or about to expire.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let fresh = self.fetch().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "appId": self.app_id, "clientSecret": self.secret }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QqError::Api {
                endpoint: "getAppAccessToken",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: TokenResponse = response.json().await?;
        let value = body.access_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            QqError::Token {
                reason: "response has no access_token".to_owned(),
            }
        })?;

        let expires_in = body
            .expires_in
            .as_ref()
            .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
            .unwrap_or(0);
        let lifetime = Duration::from_secs(expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);

        info!(expires_in, "fetched QQ access token");
        Ok(CachedToken {
            value,
            refresh_at: Instant::now() + lifetime,
        })
    }
}

// ---------------------------------------------------------------------------
// REST client
// ---------------------------------------------------------------------------

/// Authenticated client for the bot REST API.
#[derive(Debug, Clone)]
pub struct QqApi {
    http: reqwest::Client,
    api_base: String,
    app_id: String,
    tokens: Arc<TokenSource>,
}

impl QqApi {
    pub fn new(app_id: &str, secret: &str, endpoints: QqEndpoints) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let tokens = Arc::new(TokenSource::new(
            http.clone(),
            endpoints.token_url,
            app_id,
            secret,
        ));

        Ok(Self {
            http,
            api_base: endpoints.api_base.trim_end_matches('/').to_owned(),
            app_id: app_id.to_owned(),
            tokens,
        })
    }

    /// The bot's access token, suitable for the gateway identify payload.
    pub async fn access_token(&self) -> Result<String> {
        self.tokens.token().await
    }

    async fn authorized(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        let token = self.tokens.token().await?;
        Ok(builder
            .header("Authorization", format!("QQBot {token}"))
            .header("X-Union-Appid", self.app_id.as_str()))
    }

    /// Ask the platform which websocket URL to connect to.
    pub async fn gateway_url(&self) -> Result<String> {
        let url = format!("{}/gateway", self.api_base);
        let response = self.authorized(self.http.get(&url)).await?.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QqError::Api {
                endpoint: "gateway",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response.json().await?;
        let raw = body
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| QqError::Protocol {
                reason: format!("gateway response has no url: {body}"),
            })?;

        let ws_url = Url::parse(raw).map_err(|e| QqError::Protocol {
            reason: format!("invalid gateway url {raw:?}: {e}"),
        })?;
        if !matches!(ws_url.scheme(), "ws" | "wss") {
            return Err(QqError::Protocol {
                reason: format!("gateway url is not a websocket url: {ws_url}"),
            });
        }

        debug!(url = %ws_url, "resolved gateway url");
        Ok(ws_url.into())
    }

    /// Post a passive text reply to a group mention.
    pub async fn post_group_message(
        &self,
        group_openid: &str,
        msg_id: &str,
        content: &str,
    ) -> Result<()> {
        let url = format!("{}/v2/groups/{group_openid}/messages", self.api_base);
        let body = json!({
            "content": content,
            "msg_type": 0,
            "msg_id": msg_id,
            "msg_seq": 1,
        });

        let response = self
            .authorized(self.http.post(&url))
            .await?
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QqError::Api {
                endpoint: "post_group_message",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        debug!(group = %group_openid, msg_id = %msg_id, "group message posted");
        Ok(())
    }
}
