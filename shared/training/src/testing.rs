//! Scripted stand-ins for the remote service and the poller's sink.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::backend::TrainingBackend;
use crate::location::LocationSink;
use crate::poller::{SinkVerdict, StatusSink};
use crate::protocol::{ExportResult, StartResponse, StartTrainingParams, StatusPayload};
use crate::session::SessionId;

#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    Start(StartTrainingParams),
    Status(SessionId),
    Stop(SessionId),
    Export(SessionId, Option<String>),
}

#[derive(Default)]
struct MockState {
    start: VecDeque<Result<StartResponse, String>>,
    statuses: VecDeque<Result<StatusPayload, String>>,
    last_status: Option<StatusPayload>,
    export: VecDeque<Result<ExportResult, String>>,
    stop_error: Option<String>,
    status_delay: Duration,
    export_delay: Duration,
    calls: Vec<BackendCall>,
}

/// In-memory [`TrainingBackend`] answering from scripted queues. Once the
/// status queue is drained the last successful status is repeated.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn push_start(&self, response: StartResponse) {
        self.with_state(|s| s.start.push_back(Ok(response)));
    }

    pub fn push_start_error(&self, message: &str) {
        self.with_state(|s| s.start.push_back(Err(message.to_string())));
    }

    pub fn push_status(&self, status: StatusPayload) {
        self.with_state(|s| s.statuses.push_back(Ok(status)));
    }

    pub fn push_status_error(&self, message: &str) {
        self.with_state(|s| s.statuses.push_back(Err(message.to_string())));
    }

    pub fn push_export(&self, result: ExportResult) {
        self.with_state(|s| s.export.push_back(Ok(result)));
    }

    pub fn push_export_error(&self, message: &str) {
        self.with_state(|s| s.export.push_back(Err(message.to_string())));
    }

    pub fn fail_stop(&self, message: &str) {
        self.with_state(|s| s.stop_error = Some(message.to_string()));
    }

    pub fn set_status_delay(&self, delay: Duration) {
        self.with_state(|s| s.status_delay = delay);
    }

    pub fn set_export_delay(&self, delay: Duration) {
        self.with_state(|s| s.export_delay = delay);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn status_calls(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::Status(_)))
    }

    pub fn export_calls(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::Export(..)))
    }

    pub fn start_calls(&self) -> Vec<StartTrainingParams> {
        self.with_state(|s| {
            s.calls
                .iter()
                .filter_map(|c| match c {
                    BackendCall::Start(params) => Some(params.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.with_state(|s| s.calls.iter().filter(|c| pred(c)).count())
    }
}

#[async_trait]
impl TrainingBackend for MockBackend {
    async fn start_training(&self, params: &StartTrainingParams) -> Result<StartResponse> {
        let next = self.with_state(|s| {
            s.calls.push(BackendCall::Start(params.clone()));
            s.start.pop_front()
        });
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("start_training was not scripted")),
        }
    }

    async fn get_training_status(&self, session_id: &SessionId) -> Result<StatusPayload> {
        let delay = self.with_state(|s| {
            s.calls.push(BackendCall::Status(session_id.clone()));
            s.status_delay
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.with_state(|s| match s.statuses.pop_front() {
            Some(Ok(status)) => {
                s.last_status = Some(status.clone());
                Ok(status)
            }
            Some(Err(message)) => Err(anyhow!(message)),
            None => s
                .last_status
                .clone()
                .ok_or_else(|| anyhow!("get_training_status was not scripted")),
        })
    }

    async fn stop_training(&self, session_id: &SessionId) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(BackendCall::Stop(session_id.clone()));
            match &s.stop_error {
                Some(message) => Err(anyhow!(message.clone())),
                None => Ok(()),
            }
        })
    }

    async fn export_model(
        &self,
        session_id: &SessionId,
        model_name: Option<&str>,
    ) -> Result<ExportResult> {
        let delay = self.with_state(|s| {
            s.calls.push(BackendCall::Export(
                session_id.clone(),
                model_name.map(str::to_string),
            ));
            s.export_delay
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.with_state(|s| s.export.pop_front()) {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("export_model was not scripted")),
        }
    }
}

/// Sink that records what the poller delivered and settles on terminal
/// statuses.
#[derive(Default)]
pub struct RecordingSink {
    statuses: Mutex<Vec<StatusPayload>>,
    stalls: Mutex<Vec<(u32, String)>>,
}

impl RecordingSink {
    pub fn statuses(&self) -> Vec<StatusPayload> {
        self.statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn stalls(&self) -> Vec<(u32, String)> {
        self.stalls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl StatusSink for RecordingSink {
    fn on_status(&self, _session_id: &SessionId, status: StatusPayload) -> SinkVerdict {
        let terminal = status.is_terminal();
        self.statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(status);
        if terminal {
            SinkVerdict::Terminal
        } else {
            SinkVerdict::Continue
        }
    }

    fn on_stall(&self, _session_id: &SessionId, failures: u32, last_error: &anyhow::Error) {
        self.stalls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((failures, format!("{last_error:#}")));
    }
}

/// Location sink that remembers every session route it was given.
#[derive(Default)]
pub struct RecordingLocation {
    sessions: Mutex<Vec<SessionId>>,
}

impl RecordingLocation {
    pub fn sessions(&self) -> Vec<SessionId> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl LocationSink for RecordingLocation {
    fn set_session(&self, session_id: &SessionId) {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(session_id.clone());
    }
}
