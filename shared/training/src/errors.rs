use thiserror::Error;

use crate::session::{SessionId, StatusType};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("invalid training parameters: {0}")]
    InvalidParams(String),

    #[error("failed to start training: {0:#}")]
    Initiation(#[source] anyhow::Error),

    #[error("failed to stop training session {session_id}: {source:#}")]
    Stop {
        session_id: SessionId,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to export session {session_id}: {source:#}")]
    Export {
        session_id: SessionId,
        #[source]
        source: anyhow::Error,
    },

    #[error("an export of session {0} is already in flight")]
    ExportInFlight(SessionId),

    #[error("session {session_id} was already exported as {artifact_id}")]
    AlreadyExported {
        session_id: SessionId,
        artifact_id: String,
    },

    #[error("session {session_id} is still {status}; only finished sessions can be exported")]
    NotTerminal {
        session_id: SessionId,
        status: StatusType,
    },

    #[error("no training session is being monitored")]
    NoSession,

    #[error("status polling for session {session_id} stalled after {failures} consecutive failures: {last_error}")]
    Stalled {
        session_id: SessionId,
        failures: u32,
        last_error: String,
    },
}

impl MonitorError {
    /// Local guard rejections: nothing was sent to the service.
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidParams(_)
                | Self::ExportInFlight(_)
                | Self::AlreadyExported { .. }
                | Self::NotTerminal { .. }
                | Self::NoSession
        )
    }
}
