mod backend;
mod config;
mod context;
mod errors;
mod export;
mod initiator;
mod lifecycle;
mod location;
mod merge;
mod monitor;
mod poller;
mod protocol;
mod report;
mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::TrainingBackend;
pub use config::{
    MonitorConfig, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_MAX_BACKOFF_MS,
    DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_POLL_INTERVAL_MS,
};
pub use context::{
    AppContext, ConnectionInfo, TrainingContext, DEFAULT_SERVER_URL, DEFAULT_SERVICE_ID,
    DEFAULT_WORKSPACE,
};
pub use errors::MonitorError;
pub use export::{check_exportable, request_export};
pub use initiator::{initiate, TrainingParams};
pub use lifecycle::{observe_transition, Affordances, Transition};
pub use location::{parse_session_route, session_route, LocationSink, LogLocation};
pub use merge::{merge, policy_for, FieldPolicy, FIELD_POLICIES};
pub use monitor::{MonitorSnapshot, TrainingMonitor};
pub use poller::{PollerHandle, PollerState, SinkVerdict, StatusPoller, StatusSink};
pub use protocol::{ExportResult, StartResponse, StartTrainingParams, StatusPayload};
pub use report::{SessionReport, SnapshotReport};
pub use session::{InstanceMetrics, SessionId, StatusType, TestMetrics, TrainingSession};
