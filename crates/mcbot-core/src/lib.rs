//! Core of mcbot, a group chat bot for a Minecraft server community.
//!
//! ```text
//! gateway event ──> CommandRouter ──┬──> StatusClient ──> GET {mc}/status
//!                                   └──> ChatClient   ──> POST chat/completions
//!                         │
//!                    reply text ──> IncomingMessage::reply
//!
//! ConnectionSupervisor wraps the gateway session and restarts it on failure.
//! ```
//!
//! ## Modules
//!
//! - [`config`] -- Immutable, layered bot configuration.
//! - [`router`] -- Substring command matching and dispatch.
//! - [`status`] -- Minecraft status client and reply formatting.
//! - [`chat`] -- Zhipu/Kimi chat completion client and link stripping.
//! - [`supervisor`] -- Fixed-delay reconnect loop with cooperative stop.
//! - [`message`] -- The `IncomingMessage` seam gateways implement.
//! - [`error`] -- Core error types.

pub mod chat;
pub mod config;
pub mod error;
pub mod message;
pub mod router;
pub mod status;
pub mod supervisor;

pub use chat::{ChatClient, ChatProvider, ChatRequest, ChatResponse, strip_links};
pub use config::BotConfig;
pub use error::{BotError, Result};
pub use message::{BufferedMessage, IncomingMessage};
pub use router::{Command, CommandRouter};
pub use status::{ServerStatus, StatusClient};
pub use supervisor::{
    ConnectionSupervisor, Connector, SessionReporter, StopReason, SupervisorConfig,
    SupervisorHandle, SupervisorPhase, SupervisorSnapshot,
};
