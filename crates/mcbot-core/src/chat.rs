//! Chat completion client for the Zhipu and Kimi APIs.
//!
//! Both providers speak the OpenAI Chat Completions dialect, so a single
//! client handles them; they differ only in endpoint, model, temperature,
//! and Zhipu's extra `request_id`/`stream` fields.
//!
//! [`ChatClient::chat`] never fails: transport errors, non-200 responses,
//! missing API keys, and unexpected bodies all come back as reply text.

use std::fmt;
use std::str::FromStr;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::{BotConfig, KEY_KIMI_API_KEY, KEY_ZHIPU_API_KEY};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const ZHIPU_ENDPOINT: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";
const KIMI_ENDPOINT: &str = "https://api.moonshot.cn/v1/chat/completions";

const ZHIPU_MODEL: &str = "glm-4-flash";
const KIMI_MODEL: &str = "moonshot-v1-8k";

const ZHIPU_TEMPERATURE: f64 = 0.7;
const KIMI_TEMPERATURE: f64 = 0.3;

/// Reply used when a successful response has no completion text.
pub const RESPONSE_ERROR: &str = "AI response error";

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// The chat completion providers the bot can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    Zhipu,
    Kimi,
}

impl ChatProvider {
    /// The provider's fixed chat completions endpoint.
    pub fn default_endpoint(self) -> &'static str {
        match self {
            Self::Zhipu => ZHIPU_ENDPOINT,
            Self::Kimi => KIMI_ENDPOINT,
        }
    }

    pub fn model(self) -> &'static str {
        match self {
            Self::Zhipu => ZHIPU_MODEL,
            Self::Kimi => KIMI_MODEL,
        }
    }

    pub fn temperature(self) -> f64 {
        match self {
            Self::Zhipu => ZHIPU_TEMPERATURE,
            Self::Kimi => KIMI_TEMPERATURE,
        }
    }

    /// Configuration key holding this provider's API key.
    pub fn key_name(self) -> &'static str {
        match self {
            Self::Zhipu => KEY_ZHIPU_API_KEY,
            Self::Kimi => KEY_KIMI_API_KEY,
        }
    }
}

impl fmt::Display for ChatProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zhipu => write!(f, "zhipu"),
            Self::Kimi => write!(f, "kimi"),
        }
    }
}

impl FromStr for ChatProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zhipu" => Ok(Self::Zhipu),
            "kimi" => Ok(Self::Kimi),
            other => Err(format!("unknown chat provider `{other}` (expected zhipu or kimi)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// A single-turn chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub provider: ChatProvider,
    pub model: String,
    pub persona: String,
    pub prompt: String,
    pub temperature: f64,
    /// Only sent to Zhipu, which accepts a caller-chosen request id.
    pub request_id: Option<String>,
}

impl ChatRequest {
    pub fn new(provider: ChatProvider, persona: &str, prompt: &str) -> Self {
        let request_id = match provider {
            ChatProvider::Zhipu => Some(uuid::Uuid::now_v7().to_string()),
            ChatProvider::Kimi => None,
        };

        Self {
            provider,
            model: provider.model().to_owned(),
            persona: persona.to_owned(),
            prompt: prompt.to_owned(),
            temperature: provider.temperature(),
            request_id,
        }
    }

    /// Build the provider-specific JSON body.
    pub fn to_payload(&self) -> Value {
        let messages = json!([
            { "role": "system", "content": self.persona },
            { "role": "user", "content": self.prompt },
        ]);

        match self.provider {
            ChatProvider::Zhipu => json!({
                "model": self.model,
                "messages": messages,
                "temperature": self.temperature,
                "request_id": self.request_id,
                "stream": false,
            }),
            ChatProvider::Kimi => json!({
                "model": self.model,
                "messages": messages,
                "temperature": self.temperature,
            }),
        }
    }
}

/// Outcome of a chat completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatResponse {
    /// Text of the first completion choice.
    Completion(String),
    /// A user-facing description of what went wrong.
    Failed(String),
}

impl ChatResponse {
    /// The text to relay to the user, whichever variant this is.
    pub fn into_text(self) -> String {
        match self {
            Self::Completion(text) | Self::Failed(text) => text,
        }
    }

    pub fn is_completion(&self) -> bool {
        matches!(self, Self::Completion(_))
    }
}

/// Extract `choices[0].message.content` from a completion body.
pub fn extract_completion(body: &Value) -> Option<&str> {
    body.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
}

/// Remove every literal `http://` and `https://` from `text`.
///
/// The chat platform rejects messages that contain links, so replies are
/// scrubbed before sending.  This is lossy: the prefixes are dropped wherever
/// they appear, not only at the start of a URL.
pub fn strip_links(text: &str) -> String {
    text.replace("https://", "").replace("http://", "")
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ProviderEndpoint {
    url: String,
    api_key: Option<String>,
}

/// HTTP client for the chat completion providers.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    persona: String,
    zhipu: ProviderEndpoint,
    kimi: ProviderEndpoint,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("zhipu_url", &self.zhipu.url)
            .field("kimi_url", &self.kimi.url)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Create a client using the configured keys, persona, and timeout.
    pub fn new(config: &BotConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.chat_timeout)
            .build()?;

        Ok(Self {
            http,
            persona: config.persona.clone(),
            zhipu: ProviderEndpoint {
                url: ChatProvider::Zhipu.default_endpoint().to_owned(),
                api_key: config.zhipu_api_key.clone(),
            },
            kimi: ProviderEndpoint {
                url: ChatProvider::Kimi.default_endpoint().to_owned(),
                api_key: config.kimi_api_key.clone(),
            },
        })
    }

    /// Point a provider at a different URL (self-hosted proxies, tests).
    pub fn with_endpoint(mut self, provider: ChatProvider, url: impl Into<String>) -> Self {
        self.endpoint_mut(provider).url = url.into();
        self
    }

    fn endpoint(&self, provider: ChatProvider) -> &ProviderEndpoint {
        match provider {
            ChatProvider::Zhipu => &self.zhipu,
            ChatProvider::Kimi => &self.kimi,
        }
    }

    fn endpoint_mut(&mut self, provider: ChatProvider) -> &mut ProviderEndpoint {
        match provider {
            ChatProvider::Zhipu => &mut self.zhipu,
            ChatProvider::Kimi => &mut self.kimi,
        }
    }

    /// Ask `provider` about `prompt` and return the reply text.
    pub async fn chat(&self, provider: ChatProvider, prompt: &str) -> String {
        let request = ChatRequest::new(provider, &self.persona, prompt);
        self.complete(&request).await.into_text()
    }

    /// Send a prepared request.
    pub async fn complete(&self, request: &ChatRequest) -> ChatResponse {
        let endpoint = self.endpoint(request.provider);

        let Some(api_key) = endpoint.api_key.as_deref() else {
            warn!(provider = %request.provider, "chat requested but no API key configured");
            return ChatResponse::Failed(format!(
                "{} 未配置 API Key ({})",
                request.provider,
                request.provider.key_name()
            ));
        };

        debug!(
            provider = %request.provider,
            model = %request.model,
            prompt_len = request.prompt.len(),
            "sending chat completion"
        );

        let response = match self
            .http
            .post(&endpoint.url)
            .header(AUTHORIZATION, format!("Bearer {api_key}"))
            .header(CONTENT_TYPE, "application/json")
            .json(&request.to_payload())
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(provider = %request.provider, error = %e, "chat request failed");
                return ChatResponse::Failed(format!("AI 请求异常: {e}"));
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(
                provider = %request.provider,
                status = status.as_u16(),
                body = %truncate(&body, 200),
                "chat API returned non-200"
            );
            return ChatResponse::Failed(format!("AI 请求失败，状态码: {}", status.as_u16()));
        }

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(provider = %request.provider, error = %e, "chat response is not JSON");
                return ChatResponse::Failed(RESPONSE_ERROR.to_owned());
            }
        };

        match extract_completion(&body) {
            Some(text) => {
                info!(provider = %request.provider, reply_len = text.len(), "chat completion received");
                ChatResponse::Completion(text.to_owned())
            }
            None => {
                warn!(provider = %request.provider, "chat response has no choices[0].message.content");
                ChatResponse::Failed(RESPONSE_ERROR.to_owned())
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
