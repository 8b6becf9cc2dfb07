use tracing::{info, warn};

use crate::backend::TrainingBackend;
use crate::errors::MonitorError;
use crate::protocol::ExportResult;
use crate::session::{SessionId, TrainingSession};

/// Local guards that run before any export request is sent.
pub fn check_exportable(
    session: &TrainingSession,
    export_in_flight: bool,
) -> Result<(), MonitorError> {
    if let Some(artifact_id) = &session.exported_artifact_id {
        return Err(MonitorError::AlreadyExported {
            session_id: session.session_id.clone(),
            artifact_id: artifact_id.clone(),
        });
    }
    if export_in_flight {
        return Err(MonitorError::ExportInFlight(session.session_id.clone()));
    }
    if !session.is_terminal() {
        return Err(MonitorError::NotTerminal {
            session_id: session.session_id.clone(),
            status: session.status_type,
        });
    }
    Ok(())
}

/// Send one export request. Failures are not retried.
pub async fn request_export(
    backend: &dyn TrainingBackend,
    session_id: &SessionId,
    model_name: Option<&str>,
) -> Result<ExportResult, MonitorError> {
    info!(session_id = %session_id, model_name, "Exporting trained model");
    match backend.export_model(session_id, model_name).await {
        Ok(result) => {
            info!(
                session_id = %session_id,
                artifact_id = %result.artifact_id,
                "Model exported"
            );
            Ok(result)
        }
        Err(source) => {
            warn!(session_id = %session_id, "Export failed: {source:#}");
            Err(MonitorError::Export {
                session_id: session_id.clone(),
                source,
            })
        }
    }
}
