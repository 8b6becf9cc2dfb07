//! Owner of the one session currently being monitored.
//!
//! [`TrainingMonitor`] ties the initiator, poller, merge and export together.
//! Its state sits behind a [`Mutex`] that is never held across an `.await`,
//! and every change is published as a [`MonitorSnapshot`] on a watch channel.
//! Each attach bumps a generation counter; poll results and export answers
//! that belong to an older generation are dropped.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::TrainingBackend;
use crate::config::MonitorConfig;
use crate::errors::MonitorError;
use crate::export::{check_exportable, request_export};
use crate::initiator::{initiate, TrainingParams};
use crate::lifecycle::{observe_transition, Affordances, Transition};
use crate::location::LocationSink;
use crate::merge::merge;
use crate::poller::{PollerHandle, PollerState, SinkVerdict, StatusPoller, StatusSink};
use crate::protocol::{ExportResult, StatusPayload};
use crate::session::{SessionId, StatusType, TrainingSession};

/// Everything a view needs to render the monitored session.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub session: Option<TrainingSession>,
    pub affordances: Affordances,
    pub poller: PollerState,
    /// Inline error banner: the last failure worth showing to the user.
    pub error: Option<String>,
    pub export_in_flight: bool,
    pub export_result: Option<ExportResult>,
    pub starting: bool,
}

#[derive(Default)]
struct MonitorInner {
    generation: u64,
    session: Option<TrainingSession>,
    poller: PollerState,
    error: Option<String>,
    export_in_flight: bool,
    export_result: Option<ExportResult>,
    starting: bool,
}

impl MonitorInner {
    fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            affordances: self
                .session
                .as_ref()
                .map(|s| Affordances::of(s, self.export_in_flight))
                .unwrap_or_default(),
            session: self.session.clone(),
            poller: self.poller,
            error: self.error.clone(),
            export_in_flight: self.export_in_flight,
            export_result: self.export_result.clone(),
            starting: self.starting,
        }
    }
}

struct MonitorShared {
    inner: Mutex<MonitorInner>,
    tx_snapshot: watch::Sender<MonitorSnapshot>,
}

impl MonitorShared {
    fn lock(&self) -> MutexGuard<'_, MonitorInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mutate the state and publish the resulting snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut MonitorInner) -> R) -> R {
        let mut inner = self.lock();
        let result = f(&mut inner);
        self.tx_snapshot.send_replace(inner.snapshot());
        result
    }

    fn report(&self, err: &MonitorError) {
        if err.is_local_rejection() {
            debug!("Rejected locally: {err}");
            return;
        }
        self.update(|inner| inner.error = Some(err.to_string()));
    }
}

/// Feeds poll results for one generation into the shared state.
struct GenerationSink {
    shared: Arc<MonitorShared>,
    generation: u64,
}

impl StatusSink for GenerationSink {
    fn on_status(&self, session_id: &SessionId, status: StatusPayload) -> SinkVerdict {
        self.shared.update(|inner| {
            if inner.generation != self.generation {
                return SinkVerdict::Detached;
            }
            let Some(current) = inner.session.as_ref() else {
                return SinkVerdict::Detached;
            };

            let next = merge(current, &status);
            match observe_transition(Some(current.status_type), &next) {
                Some(Transition::Failed { reason }) => {
                    warn!(session_id = %session_id, "Training failed: {reason}");
                    inner.error = Some(reason);
                }
                Some(Transition::Finished(outcome)) => {
                    info!(session_id = %session_id, status = %outcome, "Training finished");
                }
                Some(Transition::Progressed { from, to }) => {
                    info!(
                        session_id = %session_id,
                        from = %from,
                        to = %to,
                        "Training status changed"
                    );
                }
                Some(Transition::Started(_)) | None => {}
            }

            let terminal = next.is_terminal();
            inner.session = Some(next);
            if terminal {
                inner.poller = PollerState::Settled;
                SinkVerdict::Terminal
            } else {
                SinkVerdict::Continue
            }
        })
    }

    fn on_stall(&self, session_id: &SessionId, failures: u32, last_error: &anyhow::Error) {
        let err = MonitorError::Stalled {
            session_id: session_id.clone(),
            failures,
            last_error: format!("{last_error:#}"),
        };
        warn!("{err}");
        self.shared.update(|inner| {
            if inner.generation == self.generation {
                inner.poller = PollerState::Stalled;
                inner.error = Some(err.to_string());
            }
        });
    }
}

/// Clears the in-flight flag even when the export future is dropped early.
struct ExportGuard<'a> {
    shared: &'a MonitorShared,
    generation: u64,
}

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        self.shared.update(|inner| {
            if inner.generation == self.generation {
                inner.export_in_flight = false;
            }
        });
    }
}

pub struct TrainingMonitor {
    backend: Arc<dyn TrainingBackend>,
    config: MonitorConfig,
    location: Arc<dyn LocationSink>,
    shared: Arc<MonitorShared>,
    poller: Mutex<Option<PollerHandle>>,
}

impl TrainingMonitor {
    pub fn new(
        backend: Arc<dyn TrainingBackend>,
        config: MonitorConfig,
        location: Arc<dyn LocationSink>,
    ) -> Self {
        let (tx_snapshot, _) = watch::channel(MonitorSnapshot::default());
        Self {
            backend,
            config,
            location,
            shared: Arc::new(MonitorShared {
                inner: Mutex::new(MonitorInner::default()),
                tx_snapshot,
            }),
            poller: Mutex::new(None),
        }
    }

    /// Start a new run, or continue `continue_from`, and begin monitoring it.
    /// On failure the previously monitored session (if any) is left as is.
    pub async fn start(
        &self,
        params: &TrainingParams,
        continue_from: Option<&SessionId>,
    ) -> Result<TrainingSession, MonitorError> {
        self.shared.update(|inner| {
            inner.starting = true;
            inner.error = None;
        });

        let started = initiate(self.backend.as_ref(), params, continue_from).await;
        self.shared.update(|inner| inner.starting = false);

        match started {
            Ok(session) => {
                self.monitor_session(session.clone());
                Ok(session)
            }
            Err(err) => {
                self.shared.report(&err);
                Err(err)
            }
        }
    }

    /// Continue training from the weights of the current, finished session.
    /// An empty dataset id in `params` reuses the session's dataset.
    pub async fn continue_current(
        &self,
        mut params: TrainingParams,
    ) -> Result<TrainingSession, MonitorError> {
        let session = self.session().ok_or(MonitorError::NoSession)?;
        if !session.is_terminal() {
            return Err(MonitorError::NotTerminal {
                session_id: session.session_id,
                status: session.status_type,
            });
        }
        if params.dataset_artifact_id.trim().is_empty() {
            if let Some(dataset) = &session.dataset_artifact_id {
                params.dataset_artifact_id = dataset.clone();
            }
        }
        self.start(&params, Some(&session.session_id)).await
    }

    /// Resume monitoring a session by id. Its state is rebuilt from the next
    /// status fetch.
    pub fn attach(&self, session_id: SessionId) {
        info!(session_id = %session_id, "Attaching to training session");
        self.monitor_session(TrainingSession::new(session_id, StatusType::Preparing));
    }

    /// Stop monitoring. The remote session is left untouched.
    pub fn detach(&self) {
        self.shared.update(|inner| {
            inner.generation += 1;
            inner.session = None;
            inner.poller = PollerState::Idle;
            inner.error = None;
            inner.export_in_flight = false;
            inner.export_result = None;
        });
        if let Some(handle) = self.take_poller() {
            handle.cancel();
        }
    }

    /// Ask the service to stop the run. The local status only changes once a
    /// later poll reports it.
    pub async fn stop(&self) -> Result<(), MonitorError> {
        let session_id = self
            .session()
            .map(|s| s.session_id)
            .ok_or(MonitorError::NoSession)?;

        info!(session_id = %session_id, "Stopping training");
        match self.backend.stop_training(&session_id).await {
            Ok(()) => Ok(()),
            Err(source) => {
                warn!(session_id = %session_id, "Stop failed: {source:#}");
                let err = MonitorError::Stop { session_id, source };
                self.shared.report(&err);
                Err(err)
            }
        }
    }

    /// Export the finished model. At most one export request is ever
    /// outstanding, and none is sent once an artifact id is known.
    pub async fn export(&self, model_name: Option<&str>) -> Result<ExportResult, MonitorError> {
        let claimed = self.shared.update(|inner| -> Result<_, MonitorError> {
            let session = inner.session.as_ref().ok_or(MonitorError::NoSession)?;
            check_exportable(session, inner.export_in_flight)?;
            let session_id = session.session_id.clone();
            inner.export_in_flight = true;
            inner.error = None;
            Ok((session_id, inner.generation))
        });
        let (session_id, generation) = match claimed {
            Ok(claimed) => claimed,
            Err(err) => {
                self.shared.report(&err);
                return Err(err);
            }
        };

        let _guard = ExportGuard {
            shared: &self.shared,
            generation,
        };
        let result = request_export(self.backend.as_ref(), &session_id, model_name).await;

        self.shared.update(|inner| {
            if inner.generation != generation {
                return;
            }
            match &result {
                Ok(exported) => {
                    if let Some(session) = inner.session.as_mut() {
                        let payload = StatusPayload {
                            exported_artifact_id: Some(exported.artifact_id.clone()),
                            ..Default::default()
                        };
                        *session = merge(session, &payload);
                    }
                    inner.export_result = Some(exported.clone());
                }
                Err(err) => inner.error = Some(err.to_string()),
            }
        });
        result
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.shared.tx_snapshot.borrow().clone()
    }

    pub fn session(&self) -> Option<TrainingSession> {
        self.shared.lock().session.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.shared.tx_snapshot.subscribe()
    }

    /// Resolve once the poller is no longer running and return how it ended.
    pub async fn wait_settled(&self) -> PollerState {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|snapshot| snapshot.poller.is_finished())
            .await
            .map(|snapshot| snapshot.poller);
        settled.unwrap_or(PollerState::Cancelled)
    }

    fn monitor_session(&self, session: TrainingSession) {
        let session_id = session.session_id.clone();
        // later polls repeat the seeded status, so a failure is only visible now
        let error = match observe_transition(None, &session) {
            Some(Transition::Failed { reason }) => {
                warn!(session_id = %session_id, "Training failed: {reason}");
                Some(reason)
            }
            _ => None,
        };
        let generation = self.shared.update(|inner| {
            inner.generation += 1;
            inner.session = Some(session);
            inner.poller = PollerState::Polling;
            inner.error = error;
            inner.export_in_flight = false;
            inner.export_result = None;
            inner.generation
        });
        self.location.set_session(&session_id);

        let sink = Arc::new(GenerationSink {
            shared: self.shared.clone(),
            generation,
        });
        let handle = StatusPoller::new(
            self.backend.clone(),
            Some(session_id),
            sink,
            self.config.clone(),
        )
        .start();

        let previous = self
            .poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    fn take_poller(&self) -> Option<PollerHandle> {
        self.poller.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}
