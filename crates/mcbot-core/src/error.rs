//! Core error types.
//!
//! Errors only cross component boundaries where a caller can act on them:
//! configuration loading, client construction, sending replies, and gateway
//! sessions handed to the supervisor.  The status and chat clients degrade
//! to text instead of returning errors.

/// Unified error type for the mcbot core.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    // -- Configuration -------------------------------------------------------
    /// A configuration value could not be parsed.
    #[error("config error: {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    /// A value required by the requested operation is not configured.
    #[error("missing config value: {key}")]
    MissingConfig { key: String },

    /// The configuration file is not valid TOML.
    #[error("config file parse error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    // -- Transport -----------------------------------------------------------
    /// An outbound HTTP request could not be built or sent.
    #[error("http error: {reason}")]
    Http { reason: String },

    /// Sending a reply back to the chat platform failed.
    #[error("reply failed: {reason}")]
    Reply { reason: String },

    /// The gateway session ended abnormally.
    #[error("connection error: {reason}")]
    Connection { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, BotError>;

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http {
            reason: err.to_string(),
        }
    }
}
