use serde::Serialize;

use crate::session::{StatusType, TrainingSession};

const DEFAULT_FAILURE_REASON: &str = "training failed without a message";

/// What the user may do with a session right now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Affordances {
    pub is_training: bool,
    pub can_export: bool,
    pub can_stop: bool,
    pub can_continue: bool,
}

impl Affordances {
    pub fn of(session: &TrainingSession, export_in_flight: bool) -> Self {
        let status = session.status_type;
        let terminal = status.is_terminal();
        Self {
            is_training: matches!(status, StatusType::Preparing | StatusType::Running),
            can_export: terminal && session.exported_artifact_id.is_none() && !export_in_flight,
            can_stop: status == StatusType::Running,
            can_continue: terminal && session.dataset_artifact_id.is_some(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Started(StatusType),
    Progressed { from: StatusType, to: StatusType },
    /// Entered `failed`; carries the reason to surface to the user.
    Failed { reason: String },
    /// Entered `completed` or `stopped`. Export stays user-triggered.
    Finished(StatusType),
}

/// Classify a status change between two observations of the same session.
pub fn observe_transition(prev: Option<StatusType>, next: &TrainingSession) -> Option<Transition> {
    let to = next.status_type;
    match prev {
        Some(from) if from == to => None,
        _ if to == StatusType::Failed => Some(Transition::Failed {
            reason: next
                .message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()),
        }),
        _ if to.is_terminal() => Some(Transition::Finished(to)),
        None => Some(Transition::Started(to)),
        Some(from) => Some(Transition::Progressed { from, to }),
    }
}
