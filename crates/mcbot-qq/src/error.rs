//! QQ binding error types.

use mcbot_core::BotError;

/// Errors raised while talking to the QQ Open Platform.
#[derive(Debug, thiserror::Error)]
pub enum QqError {
    /// An HTTP request failed before a response arrived.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a non-success status.
    #[error("{endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    /// The app id / secret were rejected or the token response was unusable.
    #[error("access token error: {reason}")]
    Token { reason: String },

    /// A websocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The gateway sent something that breaks the session protocol.
    #[error("gateway protocol error: {reason}")]
    Protocol { reason: String },

    /// The gateway asked us to reconnect (op 7) or invalidated the session
    /// (op 9).
    #[error("gateway requested reconnect: {reason}")]
    Reconnect { reason: String },

    /// The websocket closed.
    #[error("gateway closed: {reason}")]
    Closed { reason: String },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the QQ crate.
pub type Result<T> = std::result::Result<T, QqError>;

impl From<QqError> for BotError {
    fn from(err: QqError) -> Self {
        BotError::Connection {
            reason: err.to_string(),
        }
    }
}
