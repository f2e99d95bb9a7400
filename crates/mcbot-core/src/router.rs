//! Command routing for group mention messages.
//!
//! Commands are recognised by plain substring search over a fixed, ordered
//! token list; the first token that occurs anywhere in the text wins.  There
//! is no tokenisation, so a token embedded in a longer word still matches.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chat::{ChatClient, ChatProvider, strip_links};
use crate::config::BotConfig;
use crate::message::IncomingMessage;
use crate::status::{StatusClient, format_daily_ranking, format_player_count};

// ---------------------------------------------------------------------------
// Command tokens
// ---------------------------------------------------------------------------

pub const CMD_SERVER_STATUS: &str = "/服务器人数";
pub const CMD_DAILY_RANKING: &str = "/在线排行";
pub const CMD_AI_HELP: &str = "/AI对话";
pub const CMD_ZHIPU: &str = "/zhipu";
pub const CMD_KIMI: &str = "/kimi";

/// Match order.  Earlier tokens take precedence when several occur.
pub const COMMAND_TOKENS: [&str; 5] = [
    CMD_SERVER_STATUS,
    CMD_DAILY_RANKING,
    CMD_AI_HELP,
    CMD_ZHIPU,
    CMD_KIMI,
];

/// Reply to `/AI对话`.
pub const AI_HELP_TEXT: &str = "AI 对话使用方法:\n\
     /zhipu <问题>  使用智谱 GLM 回答\n\
     /kimi <问题>  使用 Kimi 回答";

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A recognised command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/服务器人数`: online player count, uptime, and player details.
    ServerStatus,
    /// `/在线排行`: today's online-time ranking.
    DailyRanking,
    /// `/AI对话`: usage help for the AI commands.
    AiHelp,
    /// `/zhipu` or `/kimi` followed by a (possibly empty) prompt.
    Chat {
        provider: ChatProvider,
        prompt: String,
    },
}

impl Command {
    /// Find the first command token (in [`COMMAND_TOKENS`] order) that occurs
    /// in `text`.
    pub fn parse(text: &str) -> Option<Self> {
        COMMAND_TOKENS.iter().find_map(|token| {
            let idx = text.find(token)?;
            let rest = &text[idx + token.len()..];
            match *token {
                CMD_SERVER_STATUS => Some(Self::ServerStatus),
                CMD_DAILY_RANKING => Some(Self::DailyRanking),
                CMD_AI_HELP => Some(Self::AiHelp),
                CMD_ZHIPU => Some(Self::chat(ChatProvider::Zhipu, rest)),
                CMD_KIMI => Some(Self::chat(ChatProvider::Kimi, rest)),
                _ => None,
            }
        })
    }

    fn chat(provider: ChatProvider, rest: &str) -> Self {
        Self::Chat {
            provider,
            prompt: rest.trim().to_owned(),
        }
    }

    /// The literal token this command was matched by.
    pub fn token(&self) -> &'static str {
        match self {
            Self::ServerStatus => CMD_SERVER_STATUS,
            Self::DailyRanking => CMD_DAILY_RANKING,
            Self::AiHelp => CMD_AI_HELP,
            Self::Chat {
                provider: ChatProvider::Zhipu,
                ..
            } => CMD_ZHIPU,
            Self::Chat {
                provider: ChatProvider::Kimi,
                ..
            } => CMD_KIMI,
        }
    }
}

/// Reply for a chat command with nothing after the token.
pub fn prompt_required_text(token: &str) -> String {
    format!("请在 {token} 后面输入你的问题，例如: {token} 今天适合挖矿吗")
}

// ---------------------------------------------------------------------------
// CommandRouter
// ---------------------------------------------------------------------------

/// Dispatches recognised commands to the status and chat clients.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    config: Arc<BotConfig>,
    status: StatusClient,
    chat: ChatClient,
}

impl CommandRouter {
    pub fn new(config: Arc<BotConfig>, status: StatusClient, chat: ChatClient) -> Self {
        Self {
            config,
            status,
            chat,
        }
    }

    /// Build both clients from the configuration.
    pub fn from_config(config: Arc<BotConfig>) -> crate::Result<Self> {
        let status = StatusClient::from_config(&config)?;
        let chat = ChatClient::new(&config)?;
        Ok(Self::new(config, status, chat))
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Handle one inbound message.
    ///
    /// Returns the matched command, or `None` if the text contains no command
    /// token (in which case nothing is sent).  A failed reply is logged and
    /// otherwise ignored.
    pub async fn dispatch(&self, message: &dyn IncomingMessage) -> Option<Command> {
        let Some(command) = Command::parse(message.text()) else {
            debug!("message contains no command, ignoring");
            return None;
        };

        info!(command = command.token(), "handling command");
        let reply = self.respond(&command).await;

        match message.reply(&reply).await {
            Ok(()) => info!(command = command.token(), reply_len = reply.len(), "reply sent"),
            Err(e) => warn!(command = command.token(), error = %e, "failed to send reply"),
        }

        Some(command)
    }

    /// Produce the reply text for a command.
    pub async fn respond(&self, command: &Command) -> String {
        let server_name = &self.config.server_name;

        match command {
            Command::ServerStatus => {
                let status = self.status.fetch_status().await;
                format_player_count(server_name, status.as_ref())
            }
            Command::DailyRanking => {
                let status = self.status.fetch_status().await;
                format_daily_ranking(server_name, status.as_ref())
            }
            Command::AiHelp => AI_HELP_TEXT.to_owned(),
            Command::Chat { prompt, .. } if prompt.is_empty() => {
                prompt_required_text(command.token())
            }
            Command::Chat { provider, prompt } => {
                let reply = self.chat.chat(*provider, prompt).await;
                strip_links(&reply)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
