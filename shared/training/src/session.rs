use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque identifier the training service assigns to a run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusType {
    Preparing,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl StatusType {
    /// `completed`, `failed` and `stopped` end a session; nothing else does.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Position along the lifecycle. A session never moves to a lower rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Preparing => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed | Self::Stopped => 2,
        }
    }
}

impl fmt::Display for StatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Preparing => "preparing",
                Self::Running => "running",
                Self::Completed => "completed",
                Self::Failed => "failed",
                Self::Stopped => "stopped",
            }
        )
    }
}

impl FromStr for StatusType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "preparing" => Self::Preparing,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "stopped" => Self::Stopped,
            other => return Err(format!("unknown training status {other:?}")),
        })
    }
}

/// Validation scores for a single epoch, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub pixel_accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub iou: f64,
}

/// Average precision at several IoU thresholds, reported once training has
/// finished against held-out test data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceMetrics {
    pub ap_0_5: f64,
    pub ap_0_75: f64,
    pub ap_0_9: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_images: Option<u64>,
}

/// Local cache of one remote training run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainingSession {
    pub session_id: SessionId,
    pub status_type: StatusType,
    pub message: Option<String>,
    pub dataset_artifact_id: Option<String>,
    pub train_losses: Vec<f64>,
    /// `None` marks an epoch where validation was skipped.
    pub test_losses: Vec<Option<f64>>,
    pub current_epoch: Option<u32>,
    pub total_epochs: Option<u32>,
    pub current_batch: Option<u32>,
    pub total_batches: Option<u32>,
    pub elapsed_seconds: Option<f64>,
    pub n_train: Option<u64>,
    pub n_test: Option<u64>,
    pub start_time: Option<String>,
    pub test_metrics: Vec<Option<TestMetrics>>,
    pub instance_metrics: Option<InstanceMetrics>,
    pub exported_artifact_id: Option<String>,
}

impl TrainingSession {
    pub fn new(session_id: SessionId, status_type: StatusType) -> Self {
        Self {
            session_id,
            status_type,
            message: None,
            dataset_artifact_id: None,
            train_losses: Vec::new(),
            test_losses: Vec::new(),
            current_epoch: None,
            total_epochs: None,
            current_batch: None,
            total_batches: None,
            elapsed_seconds: None,
            n_train: None,
            n_test: None,
            start_time: None,
            test_metrics: Vec::new(),
            instance_metrics: None,
            exported_artifact_id: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status_type.is_terminal()
    }

    /// Validation loss for a 1-based epoch. The outer `None` means the epoch
    /// is unknown, the inner one that validation was skipped for it.
    pub fn test_loss_at(&self, epoch: usize) -> Option<Option<f64>> {
        epoch
            .checked_sub(1)
            .and_then(|idx| self.test_losses.get(idx).copied())
    }

    /// Most recent epoch that carries validation metrics.
    pub fn latest_test_metrics(&self) -> Option<(usize, &TestMetrics)> {
        self.test_metrics
            .iter()
            .enumerate()
            .rev()
            .find_map(|(idx, m)| m.as_ref().map(|m| (idx + 1, m)))
    }
}

/// Accepts either a JSON string or a number and keeps it as text.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(n) => n.to_string(),
    }))
}
