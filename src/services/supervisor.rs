//! Connection Supervisor
//!
//! Owns one exchange's live connection:
//! `Disconnected -> Connecting -> Connected -> Draining -> Closed`.
//!
//! While connected, a reader task decodes frames and hands snapshots to the
//! sink in arrival order, and a heartbeat task writes a keepalive frame on a
//! fixed interval. Writes go through one mutex so frames never interleave.
//! Either task exiting marks the session done, which sends the supervisor
//! back to `Connecting`. Recorder failures are counted and logged only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::services::exchange::{ClientError, ExchangeClient, FrameReader, FrameWriter, RawMessage};
use crate::services::recorder::SnapshotSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Connected,
    Draining,
    Closed,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Disconnected => "disconnected",
            SupervisorState::Connecting => "connecting",
            SupervisorState::Connected => "connected",
            SupervisorState::Draining => "draining",
            SupervisorState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Floor for `heartbeat_interval`; a zero period cannot drive a timer.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub heartbeat_interval: Duration,
    /// Delay before re-dialing after a dropped connection; doubles per
    /// consecutive dial failure
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    /// Upper bound on waiting for the peer to acknowledge a close
    pub drain_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(25),
            reconnect_base_delay: Duration::from_millis(500),
            reconnect_max_delay: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SupervisorConfig {
    fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures.min(16)).unwrap_or(u32::MAX);
        self.reconnect_base_delay
            .saturating_mul(factor)
            .min(self.reconnect_max_delay)
    }
}

#[derive(Debug, Default)]
pub struct SupervisorCounters {
    reconnects: AtomicU64,
    recorded: AtomicU64,
    dropped: AtomicU64,
    ignored: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorStats {
    /// Connections lost unexpectedly
    pub reconnects: u64,
    /// Snapshots accepted by the sink, duplicates included
    pub recorded: u64,
    /// Snapshots the sink failed to persist
    pub dropped: u64,
    /// Frames that carried nothing to record or failed to decode
    pub ignored: u64,
}

impl SupervisorCounters {
    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            reconnects: self.reconnects.load(Ordering::Relaxed),
            recorded: self.recorded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub exchange: String,
    pub from: SupervisorState,
    pub to: SupervisorState,
}

/// Resolves once `rx` holds `true`, or once its sender is gone.
pub async fn signaled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// One live connection: the shared writer plus its reader and heartbeat tasks.
struct Session<W> {
    writer: Arc<Mutex<W>>,
    done: watch::Receiver<bool>,
    reader: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl<W> Session<W> {
    fn abort(&self) {
        self.reader.abort();
        self.heartbeat.abort();
    }
}

enum Step<W> {
    Disconnected,
    Connecting { delay: Duration },
    Connected(Session<W>),
    Draining(Session<W>),
    Closed,
}

impl<W> Step<W> {
    fn state(&self) -> SupervisorState {
        match self {
            Step::Disconnected => SupervisorState::Disconnected,
            Step::Connecting { .. } => SupervisorState::Connecting,
            Step::Connected(_) => SupervisorState::Connected,
            Step::Draining(_) => SupervisorState::Draining,
            Step::Closed => SupervisorState::Closed,
        }
    }
}

pub struct ConnectionSupervisor<C: ExchangeClient> {
    name: String,
    client: Arc<C>,
    sink: Arc<dyn SnapshotSink>,
    config: SupervisorConfig,
    state_tx: watch::Sender<SupervisorState>,
    transitions_tx: broadcast::Sender<Transition>,
    counters: Arc<SupervisorCounters>,
}

impl<C: ExchangeClient> ConnectionSupervisor<C> {
    pub fn new(client: Arc<C>, sink: Arc<dyn SnapshotSink>, mut config: SupervisorConfig) -> Self {
        if config.heartbeat_interval < MIN_HEARTBEAT_INTERVAL {
            warn!(
                exchange = %client.name(),
                requested_ms = config.heartbeat_interval.as_millis() as u64,
                "Heartbeat interval too small, clamping"
            );
            config.heartbeat_interval = MIN_HEARTBEAT_INTERVAL;
        }
        let (state_tx, _) = watch::channel(SupervisorState::Disconnected);
        let (transitions_tx, _) = broadcast::channel(64);
        Self {
            name: client.name().to_string(),
            client,
            sink,
            config,
            state_tx,
            transitions_tx,
            counters: Arc::new(SupervisorCounters::default()),
        }
    }

    /// Every state change from here on, in order
    pub fn transitions(&self) -> broadcast::Receiver<Transition> {
        self.transitions_tx.subscribe()
    }

    /// Starts the supervisor task. It runs until `shutdown` turns true and the
    /// drain completes.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> SupervisorHandle {
        let handle = SupervisorHandle {
            name: self.name.clone(),
            state: self.state_tx.subscribe(),
            counters: self.counters.clone(),
        };
        tokio::spawn(self.run(shutdown));
        handle
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut current = SupervisorState::Disconnected;
        let mut step: Step<C::Writer> = Step::Disconnected;
        let mut failures: u32 = 0;

        loop {
            step = match step {
                Step::Disconnected => {
                    if *shutdown.borrow() {
                        Step::Closed
                    } else {
                        Step::Connecting {
                            delay: Duration::ZERO,
                        }
                    }
                }
                Step::Connecting { delay } => self.dial(&mut shutdown, delay, &mut failures).await,
                Step::Connected(mut session) => {
                    let ended = tokio::select! {
                        _ = signaled(&mut session.done) => true,
                        _ = signaled(&mut shutdown) => false,
                    };
                    if ended {
                        session.abort();
                        if *shutdown.borrow() {
                            Step::Closed
                        } else {
                            self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
                            warn!(exchange = %self.name, "Connection lost, reconnecting");
                            Step::Connecting {
                                delay: self.config.reconnect_base_delay,
                            }
                        }
                    } else {
                        Step::Draining(session)
                    }
                }
                Step::Draining(session) => {
                    self.drain(session).await;
                    Step::Closed
                }
                Step::Closed => break,
            };

            let next = step.state();
            self.enter(current, next);
            current = next;
        }
    }

    async fn dial(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        delay: Duration,
        failures: &mut u32,
    ) -> Step<C::Writer> {
        if *shutdown.borrow() {
            return Step::Closed;
        }

        if !delay.is_zero() {
            debug!(exchange = %self.name, delay_ms = delay.as_millis() as u64, "Waiting before dialing");
            tokio::select! {
                _ = signaled(shutdown) => return Step::Closed,
                _ = sleep(delay) => {}
            }
        }

        let attempt = tokio::select! {
            _ = signaled(shutdown) => {
                info!(exchange = %self.name, "Shutdown requested while dialing, abandoning dial");
                return Step::Closed;
            }
            result = timeout(self.config.connect_timeout, self.client.connect()) => result,
        };

        let error = match attempt {
            Ok(Ok((reader, writer))) => {
                *failures = 0;
                info!(exchange = %self.name, "Connected");
                return Step::Connected(self.open_session(reader, writer));
            }
            Ok(Err(e)) => e,
            Err(_) => ClientError::Connect(format!(
                "timed out after {:?}",
                self.config.connect_timeout
            )),
        };

        let delay = self.config.backoff(*failures);
        *failures = failures.saturating_add(1);
        warn!(
            exchange = %self.name,
            error = %error,
            retry_in_ms = delay.as_millis() as u64,
            "Dial failed"
        );
        Step::Connecting { delay }
    }

    fn open_session(&self, reader: C::Reader, writer: C::Writer) -> Session<C::Writer> {
        let (done_tx, done_rx) = watch::channel(false);
        let done_tx = Arc::new(done_tx);
        let writer = Arc::new(Mutex::new(writer));

        let reader = tokio::spawn(read_loop(
            self.name.clone(),
            self.client.clone(),
            self.sink.clone(),
            self.counters.clone(),
            reader,
            done_tx.clone(),
        ));
        let heartbeat = tokio::spawn(heartbeat_loop(
            self.name.clone(),
            writer.clone(),
            self.client.keepalive(),
            self.config.heartbeat_interval,
            done_tx,
        ));

        Session {
            writer,
            done: done_rx,
            reader,
            heartbeat,
        }
    }

    /// Sends the close frame and waits, bounded, for the reader to observe
    /// the connection closing.
    async fn drain(&self, mut session: Session<C::Writer>) {
        session.heartbeat.abort();

        let name = &self.name;
        let writer = session.writer.clone();
        let drained = timeout(self.config.drain_timeout, async {
            if let Err(e) = writer.lock().await.close().await {
                debug!(exchange = %name, error = %e, "Close frame not sent");
            }
            signaled(&mut session.done).await;
        })
        .await;

        if drained.is_err() {
            warn!(exchange = %self.name, "Peer did not acknowledge close in time");
        }
        session.reader.abort();
    }

    fn enter(&self, from: SupervisorState, to: SupervisorState) {
        if from == to {
            return;
        }
        info!(exchange = %self.name, %from, %to, "Supervisor state changed");
        self.state_tx.send_replace(to);
        let _ = self.transitions_tx.send(Transition {
            exchange: self.name.clone(),
            from,
            to,
        });
    }
}

async fn read_loop<C: ExchangeClient>(
    name: String,
    client: Arc<C>,
    sink: Arc<dyn SnapshotSink>,
    counters: Arc<SupervisorCounters>,
    mut reader: C::Reader,
    done: Arc<watch::Sender<bool>>,
) {
    loop {
        let frame = match reader.read_next().await {
            Ok(frame) => frame,
            Err(ClientError::Closed) => {
                debug!(exchange = %name, "Connection closed");
                break;
            }
            Err(e) => {
                warn!(exchange = %name, error = %e, "Read failed");
                break;
            }
        };

        let snapshots = match client.decode(&frame) {
            Ok(snapshots) => snapshots,
            Err(e) => {
                counters.ignored.fetch_add(1, Ordering::Relaxed);
                warn!(exchange = %name, error = %e, "Dropping undecodable frame");
                continue;
            }
        };
        if snapshots.is_empty() {
            counters.ignored.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        for snapshot in snapshots {
            let kind = snapshot.kind();
            match sink.record(snapshot).await {
                Ok(outcome) => {
                    counters.recorded.fetch_add(1, Ordering::Relaxed);
                    trace!(exchange = %name, kind, ?outcome, "Snapshot recorded");
                }
                Err(e) => {
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(exchange = %name, kind, error = %e, "Dropping snapshot");
                }
            }
        }
    }

    done.send_replace(true);
}

async fn heartbeat_loop<W: FrameWriter>(
    name: String,
    writer: Arc<Mutex<W>>,
    frame: RawMessage,
    period: Duration,
    done: Arc<watch::Sender<bool>>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let sent = writer.lock().await.write_frame(frame.clone()).await;
        if let Err(e) = sent {
            warn!(exchange = %name, error = %e, "Heartbeat write failed");
            break;
        }
        trace!(exchange = %name, "Heartbeat sent");
    }

    done.send_replace(true);
}

/// Observer side of a running supervisor
#[derive(Clone)]
pub struct SupervisorHandle {
    name: String,
    state: watch::Receiver<SupervisorState>,
    counters: Arc<SupervisorCounters>,
}

impl SupervisorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> SupervisorStats {
        self.counters.stats()
    }

    /// Waits until the given state is reached. Returns false if the
    /// supervisor stopped without reaching it.
    pub async fn wait_for(&self, target: SupervisorState) -> bool {
        let mut rx = self.state.clone();
        loop {
            let current = *rx.borrow_and_update();
            if current == target {
                return true;
            }
            if current == SupervisorState::Closed || rx.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Resolves once shutdown has fully completed
    pub async fn wait_closed(&self) {
        self.wait_for(SupervisorState::Closed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = SupervisorConfig {
            reconnect_base_delay: Duration::from_millis(100),
            reconnect_max_delay: Duration::from_millis(1000),
            ..Default::default()
        };
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(800));
        assert_eq!(config.backoff(4), Duration::from_millis(1000));
        assert_eq!(config.backoff(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&SupervisorState::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");
        assert_eq!(SupervisorState::Draining.to_string(), "draining");
    }

    #[tokio::test]
    async fn test_signaled_sees_value_set_before_wait() {
        let (tx, mut rx) = watch::channel(false);
        tx.send_replace(true);
        signaled(&mut rx).await;
    }

    #[tokio::test]
    async fn test_signaled_returns_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        signaled(&mut rx).await;
    }
}
