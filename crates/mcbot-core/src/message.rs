//! The narrow message seam between the gateway and the command router.
//!
//! The router only ever reads a message's text and sends one text reply.
//! Gateway bindings implement [`IncomingMessage`] for their own event types;
//! [`BufferedMessage`] collects replies in memory for the HTTP entry point
//! and for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;

/// An inbound group mention as seen by the router.
#[async_trait]
pub trait IncomingMessage: Send + Sync {
    /// The raw message text.
    fn text(&self) -> &str;

    /// Send a text reply to the group/message this event came from.
    async fn reply(&self, content: &str) -> Result<()>;
}

/// A message whose replies are captured instead of being sent anywhere.
#[derive(Debug, Default)]
pub struct BufferedMessage {
    text: String,
    replies: Mutex<Vec<String>>,
}

impl BufferedMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            replies: Mutex::new(Vec::new()),
        }
    }

    /// Replies sent so far, in order.
    pub fn replies(&self) -> Vec<String> {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Consume the message and return its replies.
    pub fn into_replies(self) -> Vec<String> {
        self.replies.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl IncomingMessage for BufferedMessage {
    fn text(&self) -> &str {
        &self.text
    }

    async fn reply(&self, content: &str) -> Result<()> {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(content.to_owned());
        Ok(())
    }
}
