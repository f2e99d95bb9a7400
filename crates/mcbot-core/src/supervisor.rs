//! Connection supervisor for the gateway session.
//!
//! The supervisor repeatedly awaits a [`Connector`] session, which only
//! returns when the connection ends.  An error counts as a failure: the
//! retry counter goes up and, unless the configured ceiling is reached, the
//! loop sleeps a fixed delay and reconnects.  The counter resets to zero
//! whenever a session reports [`SessionReporter::connected`], and on a clean
//! return, which also reconnects immediately.
//!
//! ```text
//! Idle ──> Connecting ──> Running ──err──> Backoff ──delay──> Connecting
//!               ^             │                │
//!               └────ok───────┘                └──ceiling / stop──> Stopped
//! ```
//!
//! [`SupervisorHandle::stop`] is cooperative: it never interrupts a session
//! in progress, but no new session starts once it has been called.  A stop
//! during backoff ends the sleep early.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::BotConfig;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// A gateway connection the supervisor can (re)start.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and serve events until the connection ends.
    ///
    /// Implementations call [`SessionReporter::connected`] once the session
    /// is established so the supervisor can report `Running`.
    async fn connect_and_serve(&self, session: SessionReporter) -> Result<()>;
}

/// Lets a running session report progress back to the supervisor.
#[derive(Debug, Clone)]
pub struct SessionReporter {
    shared: Arc<Shared>,
}

impl SessionReporter {
    /// Mark the session as established.
    ///
    /// A successful connection clears the failure streak, so a session that
    /// later drops starts counting from zero again.
    pub fn connected(&self) {
        self.shared.update(|s| {
            s.phase = SupervisorPhase::Running;
            s.retry_count = 0;
        });
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle phase of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorPhase {
    Idle,
    Connecting,
    Running,
    Backoff,
    Stopped,
}

/// Why the supervisor loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// [`SupervisorHandle::stop`] was called.
    Requested,
    /// The configured retry ceiling was reached.
    RetriesExhausted,
}

/// Point-in-time view of the supervisor, safe to read from any thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorSnapshot {
    pub phase: SupervisorPhase,
    pub running: bool,
    /// Consecutive failures since the last established connection.
    pub retry_count: u32,
    /// Total sessions started.
    pub attempts: u64,
    pub max_retries: Option<u32>,
    pub last_error: Option<String>,
}

/// Retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub retry_delay: Duration,
    pub max_retries: Option<u32>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

impl From<&BotConfig> for SupervisorConfig {
    fn from(config: &BotConfig) -> Self {
        Self {
            retry_delay: config.retry_delay,
            max_retries: config.max_retries,
        }
    }
}

#[derive(Debug)]
struct Shared {
    running: watch::Sender<bool>,
    snapshot: Mutex<SupervisorSnapshot>,
}

impl Shared {
    fn update<R>(&self, f: impl FnOnce(&mut SupervisorSnapshot) -> R) -> R {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut snapshot)
    }

    fn snapshot(&self) -> SupervisorSnapshot {
        let mut snapshot = self
            .snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        snapshot.running = *self.running.borrow();
        snapshot
    }

    fn is_running(&self) -> bool {
        *self.running.borrow()
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle for stopping and observing a supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    shared: Arc<Shared>,
}

impl SupervisorHandle {
    /// Request a stop.  Takes effect before the next connection attempt.
    pub fn stop(&self) {
        self.shared.running.send_replace(false);
        info!("supervisor stop requested");
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        self.shared.snapshot()
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Keeps a gateway connection alive across transient failures.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    config: SupervisorConfig,
    shared: Arc<Shared>,
}

impl ConnectionSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (running, _) = watch::channel(true);
        let snapshot = SupervisorSnapshot {
            phase: SupervisorPhase::Idle,
            running: true,
            retry_count: 0,
            attempts: 0,
            max_retries: config.max_retries,
            last_error: None,
        };

        Self {
            config,
            shared: Arc::new(Shared {
                running,
                snapshot: Mutex::new(snapshot),
            }),
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run the supervision loop until stopped or out of retries.
    pub async fn run<C>(&self, connector: &C) -> StopReason
    where
        C: Connector + ?Sized,
    {
        let mut stop_rx = self.shared.running.subscribe();

        let reason = loop {
            if !self.shared.is_running() {
                break StopReason::Requested;
            }

            let retry_count = self.shared.update(|s| {
                s.phase = SupervisorPhase::Connecting;
                s.attempts += 1;
                s.retry_count
            });
            info!(retry_count, "connecting gateway session");

            let session = SessionReporter {
                shared: Arc::clone(&self.shared),
            };

            match connector.connect_and_serve(session).await {
                Ok(()) => {
                    self.shared.update(|s| s.retry_count = 0);
                    info!("gateway session ended cleanly, reconnecting");
                }
                Err(e) => {
                    let message = e.to_string();
                    // Counts from zero again if the session got connected.
                    let retry_count = self.shared.update(|s| {
                        s.retry_count = s.retry_count.saturating_add(1);
                        s.last_error = Some(message.clone());
                        s.retry_count
                    });
                    warn!(
                        error = %message,
                        retry_count,
                        max_retries = ?self.config.max_retries,
                        "gateway session failed"
                    );

                    if let Some(max) = self.config.max_retries
                        && retry_count >= max
                    {
                        error!(retry_count, "retry ceiling reached, supervisor giving up");
                        break StopReason::RetriesExhausted;
                    }

                    if !self.shared.is_running() {
                        break StopReason::Requested;
                    }

                    self.shared.update(|s| s.phase = SupervisorPhase::Backoff);
                    info!(
                        delay_secs = self.config.retry_delay.as_secs_f64(),
                        "waiting before reconnect"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                        _ = stop_requested(&mut stop_rx) => {}
                    }
                }
            }
        };

        self.shared.running.send_replace(false);
        self.shared.update(|s| s.phase = SupervisorPhase::Stopped);
        info!(?reason, "supervisor stopped");
        reason
    }

    /// Run the loop on a dedicated OS thread with its own Tokio runtime.
    ///
    /// The thread is independent of any runtime serving HTTP, so health
    /// checks stay responsive while the gateway is connecting or backing off.
    pub fn spawn_thread<C>(self, connector: C) -> std::io::Result<JoinHandle<StopReason>>
    where
        C: Connector + 'static,
    {
        std::thread::Builder::new()
            .name("mcbot-supervisor".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!(error = %e, "failed to build supervisor runtime");
                        self.shared.running.send_replace(false);
                        self.shared.update(|s| {
                            s.phase = SupervisorPhase::Stopped;
                            s.last_error = Some(e.to_string());
                        });
                        return StopReason::Requested;
                    }
                };
                runtime.block_on(self.run(&connector))
            })
    }
}

/// Resolve once the running flag has been cleared.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        let running = *rx.borrow_and_update();
        if !running || rx.changed().await.is_err() {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_supervisor_is_idle_and_running() {
        let sup = ConnectionSupervisor::new(SupervisorConfig::default());
        let snap = sup.handle().snapshot();
        assert_eq!(snap.phase, SupervisorPhase::Idle);
        assert!(snap.running);
        assert_eq!(snap.retry_count, 0);
        assert_eq!(snap.attempts, 0);
    }

    #[test]
    fn stop_is_visible_through_every_handle() {
        let sup = ConnectionSupervisor::new(SupervisorConfig::default());
        let a = sup.handle();
        let b = sup.handle();
        a.stop();
        assert!(!b.is_running());
        assert!(!b.snapshot().running);
    }

    #[test]
    fn config_is_taken_from_bot_config() {
        let bot = BotConfig {
            retry_delay: Duration::from_secs(5),
            max_retries: Some(3),
            ..BotConfig::default()
        };
        let cfg = SupervisorConfig::from(&bot);
        assert_eq!(cfg.retry_delay, Duration::from_secs(5));
        assert_eq!(cfg.max_retries, Some(3));
    }
}
