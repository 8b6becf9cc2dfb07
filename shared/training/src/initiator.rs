use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::TrainingBackend;
use crate::errors::MonitorError;
use crate::merge::merge;
use crate::protocol::StartTrainingParams;
use crate::session::{SessionId, StatusType, TrainingSession};

/// Hyperparameters and data locations for a fine-tuning run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub dataset_artifact_id: String,
    /// Pretrained model to start from. Ignored when continuing a session.
    pub model: String,
    /// Glob of training images inside the dataset artifact.
    pub train_images: String,
    /// Glob of the matching annotation masks.
    pub train_annotations: String,
    pub n_epochs: u32,
    pub learning_rate: f64,
    pub weight_decay: f64,
    /// Validate every N epochs; `None` leaves it to the service.
    pub validation_interval: Option<u32>,
    pub test_images: Option<String>,
    pub test_annotations: Option<String>,
}

impl TrainingParams {
    pub fn validate(&self) -> Result<(), MonitorError> {
        let invalid = |msg: &str| Err(MonitorError::InvalidParams(msg.to_string()));

        if self.dataset_artifact_id.trim().is_empty() {
            return invalid("dataset artifact id is empty");
        }
        if self.model.trim().is_empty() {
            return invalid("model identifier is empty");
        }
        if self.train_images.trim().is_empty() || self.train_annotations.trim().is_empty() {
            return invalid("training image and annotation paths are required");
        }
        if self.n_epochs == 0 {
            return invalid("epoch count must be at least 1");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid("learning rate must be a positive number");
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return invalid("weight decay must be zero or positive");
        }
        if self.validation_interval == Some(0) {
            return invalid("validation interval must be at least 1");
        }
        if self.test_images.is_some() != self.test_annotations.is_some() {
            return invalid("test images and test annotations must be given together");
        }
        Ok(())
    }

    /// Build the service request. Continuing a session swaps the model for
    /// the previous session id so the service resumes from its weights.
    pub fn to_request(&self, continue_from: Option<&SessionId>) -> StartTrainingParams {
        StartTrainingParams {
            artifact_id: self.dataset_artifact_id.clone(),
            model: match continue_from {
                Some(session_id) => session_id.to_string(),
                None => self.model.clone(),
            },
            train_images: self.train_images.clone(),
            train_annotations: self.train_annotations.clone(),
            n_epochs: self.n_epochs,
            learning_rate: self.learning_rate,
            weight_decay: self.weight_decay,
            validation_interval: self.validation_interval,
            test_images: self.test_images.clone(),
            test_annotations: self.test_annotations.clone(),
        }
    }
}

/// Ask the service to start (or continue) training and seed a local session
/// from its answer. Nothing is established when this fails.
pub async fn initiate(
    backend: &dyn TrainingBackend,
    params: &TrainingParams,
    continue_from: Option<&SessionId>,
) -> Result<TrainingSession, MonitorError> {
    params.validate()?;
    let request = params.to_request(continue_from);

    info!(
        dataset = %request.artifact_id,
        model = %request.model,
        epochs = request.n_epochs,
        continuing = continue_from.is_some(),
        "Starting training"
    );

    let response = backend.start_training(&request).await.map_err(|err| {
        warn!("start_training failed: {err:#}");
        MonitorError::Initiation(err)
    })?;

    let seed = TrainingSession::new(
        response.session_id.clone(),
        response.status_type.unwrap_or(StatusType::Preparing),
    );
    let session = merge(&seed, &response.as_status());
    info!(
        session_id = %session.session_id,
        status = %session.status_type,
        "Training session started"
    );
    Ok(session)
}
