//! CLI entry point for mcbot.
//!
//! This binary provides the `mcbot` command: `serve` runs the QQ bot and the
//! health server, `status` and `chat` make one-shot calls for checking a
//! deployment by hand.

mod helpers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use mcbot_core::config::DEFAULT_CONFIG_PATH;
use mcbot_core::status::format_player_count;
use mcbot_core::{
    BotConfig, ChatClient, ChatProvider, CommandRouter, ConnectionSupervisor, StatusClient,
    SupervisorConfig, strip_links,
};
use mcbot_qq::QqGateway;
use mcbot_web::{AppState, WebConfig, WebServer};

use crate::helpers::{init_tracing, shutdown_signal};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// mcbot: QQ group bot for a Minecraft server community.
#[derive(Parser)]
#[command(
    name = "mcbot",
    version,
    about = "QQ group bot for a Minecraft server community",
    long_about = "Answers group @-mentions with Minecraft server status and AI chat replies, \
                  and serves a small health endpoint for the hosting platform."
)]
struct Cli {
    /// Optional TOML config file; environment variables take precedence.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot and the health server (default).
    Serve,

    /// Fetch the Minecraft server status once and print it.
    Status,

    /// Ask an AI provider one question and print the reply.
    Chat {
        /// Which provider to ask.
        #[arg(long, short, default_value = "zhipu")]
        provider: ChatProvider,

        /// The question.
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Before tracing, so RUST_LOG may come from .env.
    let dotenv = dotenvy::dotenv();
    init_tracing(&cli.log_level, cli.json_logs);
    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "failed to parse .env, ignoring it"),
    }

    let config = BotConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    let config = Arc::new(config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(config).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Chat { provider, prompt } => cmd_chat(&config, provider, &prompt.join(" ")).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(config: Arc<BotConfig>) -> Result<()> {
    info!(config = ?config, "starting mcbot");

    let router = Arc::new(
        CommandRouter::from_config(Arc::clone(&config)).context("failed to build command router")?,
    );

    // The supervisor gets its own thread and runtime; HTTP stays on this one.
    let (supervisor, bot_thread) = match QqGateway::from_router(Arc::clone(&router)) {
        Ok(gateway) => {
            let supervisor = ConnectionSupervisor::new(SupervisorConfig::from(config.as_ref()));
            let handle = supervisor.handle();
            let thread = supervisor
                .spawn_thread(gateway)
                .context("failed to spawn supervisor thread")?;
            (Some(handle), Some(thread))
        }
        Err(e) => {
            warn!(error = %e, "QQ bot disabled, serving HTTP only");
            (None, None)
        }
    };

    let state = AppState::new(router, supervisor.clone());
    let server = WebServer::new(WebConfig::from(config.as_ref()), state);

    let on_shutdown = supervisor.clone();
    let served = server
        .start(async move {
            shutdown_signal().await;
            info!("shutdown requested");
            if let Some(handle) = on_shutdown {
                handle.stop();
            }
        })
        .await;

    if let Some(handle) = &supervisor {
        handle.stop();
    }

    // A live gateway session is not interrupted by stop; only join a thread
    // that has already finished.
    if let Some(thread) = bot_thread {
        if thread.is_finished() {
            match thread.join() {
                Ok(reason) => info!(?reason, "supervisor thread exited"),
                Err(_) => warn!("supervisor thread panicked"),
            }
        } else {
            info!("leaving active gateway session to process exit");
        }
    }

    served.context("web server failed")?;
    info!("mcbot stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

async fn cmd_status(config: &BotConfig) -> Result<()> {
    let client = StatusClient::from_config(config).context("failed to build status client")?;
    info!(url = %client.status_url(), "fetching server status");

    let status = client.fetch_status().await;
    println!("{}", format_player_count(&config.server_name, status.as_ref()));
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: chat
// ---------------------------------------------------------------------------

async fn cmd_chat(config: &BotConfig, provider: ChatProvider, prompt: &str) -> Result<()> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        bail!("prompt must not be empty");
    }

    let client = ChatClient::new(config).context("failed to build chat client")?;
    let reply = client.chat(provider, prompt).await;
    println!("{}", strip_links(&reply));
    Ok(())
}
