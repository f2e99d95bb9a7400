//! Behavioural tests for the connection supervisor.
//!
//! Connectors here are scripted fakes; the retry delay is a few
//! milliseconds so the loops run quickly in real time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use mcbot_core::{
    BotError, ConnectionSupervisor, Connector, SessionReporter, StopReason, SupervisorConfig,
    SupervisorPhase,
};

// ── fakes ────────────────────────────────────────────────────────────────────

fn failure(n: u64) -> BotError {
    BotError::Connection {
        reason: format!("simulated failure #{n}"),
    }
}

/// Fails every attempt.
#[derive(Default)]
struct AlwaysFails {
    attempts: AtomicU64,
}

#[async_trait]
impl Connector for AlwaysFails {
    async fn connect_and_serve(&self, _session: SessionReporter) -> mcbot_core::Result<()> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        Err(failure(n))
    }
}

/// Plays back a fixed script of outcomes (`true` = clean exit), then fails.
struct Scripted {
    script: Mutex<VecDeque<bool>>,
    attempts: AtomicU64,
}

impl Scripted {
    fn new(script: &[bool]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            attempts: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Connector for Scripted {
    async fn connect_and_serve(&self, session: SessionReporter) -> mcbot_core::Result<()> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let clean = self.script.lock().unwrap().pop_front().unwrap_or(false);
        if clean {
            session.connected();
            Ok(())
        } else {
            Err(failure(n))
        }
    }
}

/// Blocks inside the session until released.
#[derive(Default)]
struct Blocking {
    entered: Notify,
    release: Notify,
    attempts: AtomicU64,
}

#[async_trait]
impl Connector for Blocking {
    async fn connect_and_serve(&self, session: SessionReporter) -> mcbot_core::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        session.connected();
        self.entered.notify_one();
        self.release.notified().await;
        Err(BotError::Connection {
            reason: "released".to_owned(),
        })
    }
}

/// Plays back a script of sessions (`true` = reaches the connected state
/// before dropping, `false` = fails to connect).  Every session ends in an
/// error, like a gateway asking the client to reconnect.
struct DropsAfterConnect {
    script: Mutex<VecDeque<bool>>,
    attempts: AtomicU64,
}

impl DropsAfterConnect {
    fn new(script: &[bool]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            attempts: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Connector for DropsAfterConnect {
    async fn connect_and_serve(&self, session: SessionReporter) -> mcbot_core::Result<()> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        // An exhausted script keeps connecting.
        if self.script.lock().unwrap().pop_front().unwrap_or(true) {
            session.connected();
            return Err(BotError::Connection {
                reason: format!("server sent op 7 (session #{n})"),
            });
        }
        Err(failure(n))
    }
}

fn fast(max_retries: Option<u32>) -> SupervisorConfig {
    SupervisorConfig {
        retry_delay: Duration::from_millis(5),
        max_retries,
    }
}

// ── retry ceiling ────────────────────────────────────────────────────────────

#[tokio::test]
async fn stops_after_max_retries_consecutive_failures() {
    let connector = AlwaysFails::default();
    let sup = ConnectionSupervisor::new(fast(Some(3)));
    let handle = sup.handle();

    let reason = sup.run(&connector).await;

    assert_eq!(reason, StopReason::RetriesExhausted);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);

    let snap = handle.snapshot();
    assert_eq!(snap.phase, SupervisorPhase::Stopped);
    assert!(!snap.running);
    assert_eq!(snap.retry_count, 3);
    assert_eq!(snap.attempts, 3);
    assert_eq!(snap.last_error.as_deref(), Some("connection error: simulated failure #3"));

    // No further attempts after the ceiling.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn clean_exit_resets_retry_count() {
    // fail, clean, fail, fail -> the clean session resets the counter, so a
    // ceiling of 2 is only reached on the fourth attempt.
    let connector = Scripted::new(&[false, true, false, false]);
    let sup = ConnectionSupervisor::new(fast(Some(2)));

    let reason = sup.run(&connector).await;

    assert_eq!(reason, StopReason::RetriesExhausted);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn established_connection_resets_retry_count() {
    // fail, fail, connect+drop, fail, fail: the connection restarts the
    // streak at the drop, so a ceiling of 3 is reached on the fifth attempt
    // instead of the third.
    let connector = DropsAfterConnect::new(&[false, false, true, false, false]);
    let sup = ConnectionSupervisor::new(fast(Some(3)));
    let handle = sup.handle();

    let reason = sup.run(&connector).await;

    assert_eq!(reason, StopReason::RetriesExhausted);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 5);
    let snap = handle.snapshot();
    assert_eq!(snap.retry_count, 3);
    assert_eq!(snap.attempts, 5);
}

#[tokio::test]
async fn connected_sessions_that_drop_never_exhaust_retries() {
    let connector = Arc::new(DropsAfterConnect::new(&[]));
    let sup = ConnectionSupervisor::new(fast(Some(2)));
    let handle = sup.handle();

    let task = {
        let connector = Arc::clone(&connector);
        tokio::spawn(async move { sup.run(connector.as_ref()).await })
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while connector.attempts.load(Ordering::SeqCst) < 6 {
        assert!(!task.is_finished(), "supervisor gave up on healthy sessions");
        assert!(tokio::time::Instant::now() < deadline, "supervisor stalled");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let snap = handle.snapshot();
    assert!(snap.retry_count <= 1, "retry_count = {}", snap.retry_count);
    assert!(
        snap.last_error
            .as_deref()
            .is_some_and(|e| e.contains("server sent op 7")),
        "last_error = {:?}",
        snap.last_error
    );

    handle.stop();
    let reason = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("supervisor did not stop")
        .unwrap();
    assert_eq!(reason, StopReason::Requested);
}

// ── unbounded retries and stop ───────────────────────────────────────────────

#[tokio::test]
async fn unbounded_retries_continue_until_stop() {
    let connector = Arc::new(AlwaysFails::default());
    let sup = ConnectionSupervisor::new(fast(None));
    let handle = sup.handle();

    let task = {
        let connector = Arc::clone(&connector);
        tokio::spawn(async move { sup.run(connector.as_ref()).await })
    };

    // Let it fail a handful of times.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while connector.attempts.load(Ordering::SeqCst) < 5 {
        assert!(tokio::time::Instant::now() < deadline, "supervisor stalled");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    handle.stop();
    let reason = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("supervisor did not stop")
        .unwrap();
    assert_eq!(reason, StopReason::Requested);

    let after_stop = connector.attempts.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(connector.attempts.load(Ordering::SeqCst), after_stop);
    assert_eq!(handle.snapshot().phase, SupervisorPhase::Stopped);
}

#[tokio::test]
async fn stop_during_backoff_ends_the_wait() {
    let connector = Arc::new(AlwaysFails::default());
    let sup = ConnectionSupervisor::new(SupervisorConfig {
        retry_delay: Duration::from_secs(3600),
        max_retries: None,
    });
    let handle = sup.handle();

    let task = {
        let connector = Arc::clone(&connector);
        tokio::spawn(async move { sup.run(connector.as_ref()).await })
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while handle.snapshot().phase != SupervisorPhase::Backoff {
        assert!(tokio::time::Instant::now() < deadline, "never reached backoff");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    handle.stop();
    let reason = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("stop did not interrupt backoff")
        .unwrap();

    assert_eq!(reason, StopReason::Requested);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stop_does_not_interrupt_a_running_session() {
    let connector = Arc::new(Blocking::default());
    let sup = ConnectionSupervisor::new(fast(None));
    let handle = sup.handle();

    let task = {
        let connector = Arc::clone(&connector);
        tokio::spawn(async move { sup.run(connector.as_ref()).await })
    };

    connector.entered.notified().await;
    assert_eq!(handle.snapshot().phase, SupervisorPhase::Running);

    handle.stop();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!task.is_finished(), "stop must not preempt the session");

    connector.release.notify_one();
    let reason = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("supervisor did not finish")
        .unwrap();

    assert_eq!(reason, StopReason::Requested);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn runs_on_a_dedicated_thread() {
    let sup = ConnectionSupervisor::new(fast(Some(2)));
    let handle = sup.handle();

    let join = sup.spawn_thread(AlwaysFails::default()).unwrap();
    let reason = join.join().unwrap();

    assert_eq!(reason, StopReason::RetriesExhausted);
    assert_eq!(handle.snapshot().attempts, 2);
}
