//! QQ Open Platform binding for mcbot.
//!
//! Connects to the bot websocket gateway, turns group @-mentions into
//! [`mcbot_core::IncomingMessage`]s for the command router, and posts the
//! router's replies back through the REST API.  Only the pieces the bot uses
//! are implemented: app access tokens, gateway discovery, identify and
//! heartbeat, and passive text replies.  Session resume is not supported;
//! every reconnect identifies afresh.

pub mod api;
pub mod error;
pub mod gateway;
pub mod message;
pub mod payload;

pub use api::{QqApi, QqEndpoints, TokenSource};
pub use error::{QqError, Result};
pub use gateway::QqGateway;
pub use message::GroupMessage;
pub use payload::{GatewayEvent, GatewayPayload, GroupAtMessage};
