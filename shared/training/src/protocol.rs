use serde::{Deserialize, Serialize};

use crate::session::{string_or_number, InstanceMetrics, SessionId, StatusType, TestMetrics};

/// Keyword arguments of `start_training`, as the service expects them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartTrainingParams {
    pub artifact_id: String,
    /// Pretrained model identifier, or a previous session id when continuing.
    pub model: String,
    pub train_images: String,
    pub train_annotations: String,
    pub n_epochs: u32,
    pub learning_rate: f64,
    pub weight_decay: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_images: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_annotations: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StartResponse {
    pub session_id: SessionId,
    #[serde(default)]
    pub dataset_artifact_id: Option<String>,
    #[serde(default)]
    pub status_type: Option<StatusType>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub train_losses: Option<Vec<f64>>,
    #[serde(default)]
    pub test_losses: Option<Vec<Option<f64>>>,
    #[serde(default)]
    pub current_epoch: Option<u32>,
    #[serde(default)]
    pub total_epochs: Option<u32>,
    #[serde(default)]
    pub n_train: Option<u64>,
    #[serde(default)]
    pub n_test: Option<u64>,
}

impl StartResponse {
    /// The start response carries a subset of the status fields; view it as a
    /// status payload so it can seed a session through the same merge.
    pub fn as_status(&self) -> StatusPayload {
        StatusPayload {
            status_type: self.status_type,
            message: self.message.clone(),
            train_losses: self.train_losses.clone(),
            test_losses: self.test_losses.clone(),
            current_epoch: self.current_epoch,
            total_epochs: self.total_epochs,
            n_train: self.n_train,
            n_test: self.n_test,
            dataset_artifact_id: self.dataset_artifact_id.clone(),
            ..Default::default()
        }
    }
}

/// Partial status snapshot returned by `get_training_status`. Absent fields
/// mean "unchanged", not "cleared".
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub status_type: Option<StatusType>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub train_losses: Option<Vec<f64>>,
    #[serde(default)]
    pub test_losses: Option<Vec<Option<f64>>>,
    #[serde(default)]
    pub current_epoch: Option<u32>,
    #[serde(default)]
    pub total_epochs: Option<u32>,
    #[serde(default)]
    pub elapsed_seconds: Option<f64>,
    #[serde(default)]
    pub n_train: Option<u64>,
    #[serde(default)]
    pub n_test: Option<u64>,
    #[serde(default)]
    pub current_batch: Option<u32>,
    #[serde(default)]
    pub total_batches: Option<u32>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub start_time: Option<String>,
    #[serde(default)]
    pub test_metrics: Option<Vec<Option<TestMetrics>>>,
    #[serde(default)]
    pub instance_metrics: Option<InstanceMetrics>,
    #[serde(default)]
    pub exported_artifact_id: Option<String>,
    #[serde(default)]
    pub dataset_artifact_id: Option<String>,
}

impl StatusPayload {
    pub fn with_status(status_type: StatusType) -> Self {
        Self {
            status_type: Some(status_type),
            ..Default::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status_type.is_some_and(StatusType::is_terminal)
    }
}

/// Result of `export_model`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ExportResult {
    pub artifact_id: String,
    #[serde(default)]
    pub artifact_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_payload_keeps_null_validation_losses() {
        let payload: StatusPayload = serde_json::from_str(
            r#"{"status_type":"running","message":"epoch 3","test_losses":[0.3,null,0.25],"current_epoch":3}"#,
        )
        .unwrap();
        assert_eq!(payload.status_type, Some(StatusType::Running));
        assert_eq!(payload.test_losses, Some(vec![Some(0.3), None, Some(0.25)]));
        assert_eq!(payload.train_losses, None);
    }

    #[test]
    fn start_time_accepts_numbers_and_strings() {
        let numeric: StatusPayload =
            serde_json::from_str(r#"{"status_type":"running","start_time":1700000000.5}"#).unwrap();
        assert_eq!(numeric.start_time.as_deref(), Some("1700000000.5"));

        let text: StatusPayload =
            serde_json::from_str(r#"{"status_type":"running","start_time":"2024-05-01T10:00:00Z"}"#)
                .unwrap();
        assert_eq!(text.start_time.as_deref(), Some("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn start_params_omit_absent_validation() {
        let params = StartTrainingParams {
            artifact_id: "bioimage-io/nuclei".into(),
            model: "cyto3".into(),
            train_images: "images/*.tif".into(),
            train_annotations: "annotations/*_mask.tif".into(),
            n_epochs: 10,
            learning_rate: 1e-6,
            weight_decay: 1e-4,
            validation_interval: None,
            test_images: None,
            test_annotations: None,
        };
        let value = serde_json::to_value(&params).unwrap();
        assert!(value.get("validation_interval").is_none());
        assert!(value.get("test_images").is_none());
        assert_eq!(value["n_epochs"], 10);
    }

    #[test]
    fn export_result_defaults_missing_lists() {
        let result: ExportResult =
            serde_json::from_str(r#"{"artifact_id":"ws/model-1","status":"ok"}"#).unwrap();
        assert!(result.files.is_empty());
        assert_eq!(result.download_url, None);
    }
}
