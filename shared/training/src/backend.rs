use anyhow::Result;
use async_trait::async_trait;

use crate::protocol::{ExportResult, StartResponse, StartTrainingParams, StatusPayload};
use crate::session::SessionId;

/// The remote training service. Implementations only translate calls; all
/// retry, merge and lifecycle decisions are made by the monitor.
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    async fn start_training(&self, params: &StartTrainingParams) -> Result<StartResponse>;

    async fn get_training_status(&self, session_id: &SessionId) -> Result<StatusPayload>;

    async fn stop_training(&self, session_id: &SessionId) -> Result<()>;

    async fn export_model(
        &self,
        session_id: &SessionId,
        model_name: Option<&str>,
    ) -> Result<ExportResult>;
}
