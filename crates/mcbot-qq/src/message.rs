//! Group mentions adapted to the router's message seam.

use async_trait::async_trait;

use mcbot_core::{BotError, IncomingMessage};

use crate::api::QqApi;
use crate::payload::GroupAtMessage;

/// A group @-mention that replies through the QQ REST API.
#[derive(Debug, Clone)]
pub struct GroupMessage {
    api: QqApi,
    event: GroupAtMessage,
}

impl GroupMessage {
    pub fn new(api: QqApi, event: GroupAtMessage) -> Self {
        Self { api, event }
    }

    pub fn group_openid(&self) -> &str {
        &self.event.group_openid
    }

    pub fn id(&self) -> &str {
        &self.event.id
    }
}

#[async_trait]
impl IncomingMessage for GroupMessage {
    fn text(&self) -> &str {
        &self.event.content
    }

    async fn reply(&self, content: &str) -> mcbot_core::Result<()> {
        self.api
            .post_group_message(&self.event.group_openid, &self.event.id, content)
            .await
            .map_err(|e| BotError::Reply {
                reason: e.to_string(),
            })
    }
}
