//! Gateway wire format.
//!
//! Every frame is a JSON object `{op, d, s, t}`.  Only the opcodes and
//! dispatch types the bot acts on are modelled; everything else is logged and
//! skipped.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Gateway opcodes.
pub mod op {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Intent bit for group and C2C (public) messages.
pub const INTENT_PUBLIC_MESSAGES: u64 = 1 << 25;

/// One gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    pub fn identify(access_token: &str, intents: u64) -> Self {
        Self {
            op: op::IDENTIFY,
            d: json!({
                "token": format!("QQBot {access_token}"),
                "intents": intents,
                "shard": [0, 1],
                "properties": {
                    "$os": std::env::consts::OS,
                    "$browser": "mcbot",
                    "$device": "mcbot",
                },
            }),
            s: None,
            t: None,
        }
    }

    pub fn heartbeat(last_seq: Option<u64>) -> Self {
        Self {
            op: op::HEARTBEAT,
            d: json!(last_seq),
            s: None,
            t: None,
        }
    }
}

/// A group @-mention as delivered by `GROUP_AT_MESSAGE_CREATE`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupAtMessage {
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub group_openid: String,
    #[serde(default)]
    pub author: Option<GroupAuthor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupAuthor {
    #[serde(default)]
    pub member_openid: Option<String>,
}

/// What a received frame means to the session loop.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Hello { heartbeat_interval_ms: u64 },
    Ready { session_id: Option<String> },
    GroupAtMessage(GroupAtMessage),
    /// A dispatch type the bot does not handle.
    OtherDispatch(String),
    HeartbeatAck,
    /// The server asks for an immediate heartbeat.
    HeartbeatRequest,
    Reconnect,
    InvalidSession,
    Unknown(u8),
}

impl GatewayEvent {
    /// Interpret a frame.  Malformed payloads for known events are errors.
    pub fn classify(payload: GatewayPayload) -> serde_json::Result<Self> {
        Ok(match payload.op {
            op::HELLO => Self::Hello {
                heartbeat_interval_ms: payload
                    .d
                    .get("heartbeat_interval")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(45_000),
            },
            op::HEARTBEAT_ACK => Self::HeartbeatAck,
            op::HEARTBEAT => Self::HeartbeatRequest,
            op::RECONNECT => Self::Reconnect,
            op::INVALID_SESSION => Self::InvalidSession,
            op::DISPATCH => match payload.t.as_deref() {
                Some("READY") => Self::Ready {
                    session_id: payload
                        .d
                        .get("session_id")
                        .and_then(|v| v.as_str())
                        .map(str::to_owned),
                },
                Some("GROUP_AT_MESSAGE_CREATE") => {
                    Self::GroupAtMessage(serde_json::from_value(payload.d)?)
                }
                other => Self::OtherDispatch(other.unwrap_or_default().to_owned()),
            },
            other => Self::Unknown(other),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
