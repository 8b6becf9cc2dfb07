//! Cancellable status polling task.
//!
//! One fetch is issued as soon as the poller starts. The next one is only
//! scheduled after the previous fetch has resolved and its result has been
//! handed to the [`StatusSink`], so fetches for a session never overlap. The
//! loop ends when the sink reports a terminal status, when the failure cap is
//! reached, or when the handle is cancelled or dropped.

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use serde::Serialize;
use tokio::{select, sync::watch, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backend::TrainingBackend;
use crate::config::MonitorConfig;
use crate::protocol::StatusPayload;
use crate::session::SessionId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerState {
    /// No session to poll.
    #[default]
    Idle,
    Polling,
    /// A terminal status was observed.
    Settled,
    /// Gave up after too many consecutive failures.
    Stalled,
    Cancelled,
}

impl PollerState {
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Polling)
    }
}

impl fmt::Display for PollerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Idle => "idle",
                Self::Polling => "polling",
                Self::Settled => "settled",
                Self::Stalled => "stalled",
                Self::Cancelled => "cancelled",
            }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkVerdict {
    Continue,
    Terminal,
    /// The sink no longer tracks this session; stop without further fetches.
    Detached,
}

/// Receives everything the poller learns about a session.
pub trait StatusSink: Send + Sync + 'static {
    fn on_status(&self, session_id: &SessionId, status: StatusPayload) -> SinkVerdict;

    fn on_stall(&self, session_id: &SessionId, failures: u32, last_error: &anyhow::Error);
}

pub struct StatusPoller {
    backend: Arc<dyn TrainingBackend>,
    session_id: Option<SessionId>,
    sink: Arc<dyn StatusSink>,
    config: MonitorConfig,
}

impl StatusPoller {
    pub fn new(
        backend: Arc<dyn TrainingBackend>,
        session_id: Option<SessionId>,
        sink: Arc<dyn StatusSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            backend,
            session_id,
            sink,
            config,
        }
    }

    /// Spawn the polling loop. Without a session the handle stays idle and
    /// nothing is fetched.
    pub fn start(self) -> PollerHandle {
        let cancel = CancellationToken::new();
        let (tx_state, rx_state) = watch::channel(PollerState::Idle);

        let Some(session_id) = self.session_id else {
            debug!("No session to poll, poller stays idle");
            return PollerHandle {
                cancel,
                rx_state,
                join: None,
            };
        };

        tx_state.send_replace(PollerState::Polling);
        let join = tokio::spawn(poll_loop(
            self.backend,
            session_id,
            self.sink,
            self.config,
            cancel.clone(),
            tx_state,
        ));

        PollerHandle {
            cancel,
            rx_state,
            join: Some(join),
        }
    }
}

/// Owner of a running poller. Dropping it cancels the loop.
pub struct PollerHandle {
    cancel: CancellationToken,
    rx_state: watch::Receiver<PollerState>,
    join: Option<JoinHandle<PollerState>>,
}

impl PollerHandle {
    pub fn state(&self) -> PollerState {
        *self.rx_state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.rx_state.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the loop to end and return its final state.
    pub async fn join(mut self) -> PollerState {
        match self.join.take() {
            Some(join) => join.await.unwrap_or(PollerState::Cancelled),
            None => self.state(),
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    backend: Arc<dyn TrainingBackend>,
    session_id: SessionId,
    sink: Arc<dyn StatusSink>,
    config: MonitorConfig,
    cancel: CancellationToken,
    tx_state: watch::Sender<PollerState>,
) -> PollerState {
    let mut failures: u32 = 0;
    info!(session_id = %session_id, "Starting status polling");

    let final_state = loop {
        let fetched = select! {
            _ = cancel.cancelled() => break PollerState::Cancelled,
            result = tokio::time::timeout(
                config.fetch_timeout(),
                backend.get_training_status(&session_id),
            ) => result,
        };

        let fetched = match fetched {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "status fetch timed out after {:?}",
                config.fetch_timeout()
            )),
        };

        match fetched {
            Ok(status) => {
                if failures > 0 {
                    info!(session_id = %session_id, failures, "Status polling recovered");
                }
                failures = 0;
                match sink.on_status(&session_id, status) {
                    SinkVerdict::Continue => {}
                    SinkVerdict::Terminal => break PollerState::Settled,
                    SinkVerdict::Detached => break PollerState::Cancelled,
                }
            }
            Err(err) => {
                failures += 1;
                warn!(
                    session_id = %session_id,
                    failures,
                    "Failed to fetch training status: {err:#}"
                );
                if config.is_failure_cap_reached(failures) {
                    sink.on_stall(&session_id, failures, &err);
                    break PollerState::Stalled;
                }
            }
        }

        let delay = config.next_delay(failures);
        trace!(session_id = %session_id, ?delay, "Scheduling next status fetch");
        select! {
            _ = cancel.cancelled() => break PollerState::Cancelled,
            _ = sleep(delay) => {}
        }
    };

    info!(session_id = %session_id, state = %final_state, "Status polling finished");
    tx_state.send_replace(final_state);
    final_state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StatusType;
    use crate::testing::{MockBackend, RecordingSink};
    use std::time::Duration;

    fn config() -> MonitorConfig {
        MonitorConfig {
            backoff_jitter: 0.0,
            ..Default::default()
        }
    }

    fn running(epoch: u32) -> StatusPayload {
        StatusPayload {
            current_epoch: Some(epoch),
            ..StatusPayload::with_status(StatusType::Running)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_without_session() {
        let backend = Arc::new(MockBackend::new());
        let sink = Arc::new(RecordingSink::default());
        let handle = StatusPoller::new(backend.clone(), None, sink.clone(), config()).start();

        sleep(Duration::from_secs(60)).await;
        assert_eq!(handle.state(), PollerState::Idle);
        assert_eq!(backend.status_calls(), 0);
        assert!(sink.statuses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_first_fetch_never_schedules_another() {
        let backend = Arc::new(MockBackend::new());
        backend.push_status(StatusPayload::with_status(StatusType::Completed));
        let sink = Arc::new(RecordingSink::default());

        let handle =
            StatusPoller::new(backend.clone(), Some("s1".into()), sink.clone(), config()).start();
        assert_eq!(handle.join().await, PollerState::Settled);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_the_interval_until_terminal() {
        let backend = Arc::new(MockBackend::new());
        backend.push_status(running(1));
        backend.push_status(running(2));
        backend.push_status(StatusPayload::with_status(StatusType::Stopped));
        let sink = Arc::new(RecordingSink::default());

        let start = tokio::time::Instant::now();
        let handle =
            StatusPoller::new(backend.clone(), Some("s1".into()), sink.clone(), config()).start();
        assert_eq!(handle.join().await, PollerState::Settled);

        assert_eq!(backend.status_calls(), 3);
        assert_eq!(sink.statuses().len(), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_back_off_and_recover() {
        let backend = Arc::new(MockBackend::new());
        backend.push_status_error("connection reset");
        backend.push_status_error("connection reset");
        backend.push_status(StatusPayload::with_status(StatusType::Completed));
        let sink = Arc::new(RecordingSink::default());

        let start = tokio::time::Instant::now();
        let handle =
            StatusPoller::new(backend.clone(), Some("s1".into()), sink.clone(), config()).start();
        assert_eq!(handle.join().await, PollerState::Settled);

        // 4s after the first failure, 8s after the second
        assert_eq!(start.elapsed(), Duration::from_millis(12_000));
        assert_eq!(backend.status_calls(), 3);
        assert!(sink.stalls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalls_after_the_failure_cap() {
        let backend = Arc::new(MockBackend::new());
        for _ in 0..5 {
            backend.push_status_error("service unavailable");
        }
        let sink = Arc::new(RecordingSink::default());
        let config = MonitorConfig {
            max_consecutive_failures: Some(3),
            ..config()
        };

        let handle =
            StatusPoller::new(backend.clone(), Some("s1".into()), sink.clone(), config).start();
        assert_eq!(handle.join().await, PollerState::Stalled);
        assert_eq!(backend.status_calls(), 3);

        let stalls = sink.stalls();
        assert_eq!(stalls.len(), 1);
        assert_eq!(stalls[0].0, 3);
        assert!(stalls[0].1.contains("service unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetch_counts_as_failure() {
        let backend = Arc::new(MockBackend::new());
        backend.set_status_delay(Duration::from_secs(120));
        backend.push_status(running(1));
        let sink = Arc::new(RecordingSink::default());
        let config = MonitorConfig {
            max_consecutive_failures: Some(1),
            ..config()
        };

        let handle =
            StatusPoller::new(backend.clone(), Some("s1".into()), sink.clone(), config).start();
        assert_eq!(handle.join().await, PollerState::Stalled);
        assert!(sink.statuses().is_empty());
        assert!(sink.stalls()[0].1.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_further_fetches() {
        let backend = Arc::new(MockBackend::new());
        backend.push_status(running(1));
        let sink = Arc::new(RecordingSink::default());

        let handle =
            StatusPoller::new(backend.clone(), Some("s1".into()), sink.clone(), config()).start();
        sleep(Duration::from_millis(4_500)).await;
        let calls_before = backend.status_calls();
        assert_eq!(calls_before, 3);

        handle.cancel();
        let mut rx = handle.subscribe();
        rx.wait_for(|state| *state == PollerState::Cancelled)
            .await
            .unwrap();

        sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.status_calls(), calls_before);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_fetch_is_discarded_after_cancel() {
        let backend = Arc::new(MockBackend::new());
        backend.set_status_delay(Duration::from_secs(5));
        backend.push_status(running(1));
        let sink = Arc::new(RecordingSink::default());

        let handle =
            StatusPoller::new(backend.clone(), Some("s1".into()), sink.clone(), config()).start();
        sleep(Duration::from_secs(1)).await;
        drop(handle);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.status_calls(), 1);
        assert!(sink.statuses().is_empty());
    }
}
