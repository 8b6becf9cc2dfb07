//! Explicit application context handed to every view.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::TrainingBackend;
use crate::config::MonitorConfig;
use crate::location::{LocationSink, LogLocation};
use crate::monitor::TrainingMonitor;

pub const DEFAULT_SERVER_URL: &str = "https://hypha.aicell.io";
pub const DEFAULT_WORKSPACE: &str = "bioimage-io";
pub const DEFAULT_SERVICE_ID: &str = "cellpose-finetuning";

/// Where the training service lives and how to authenticate against it.
/// Read from the `[connection]` table of the config file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionInfo {
    pub server_url: String,
    pub workspace: String,
    pub service_id: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            workspace: DEFAULT_WORKSPACE.to_string(),
            service_id: DEFAULT_SERVICE_ID.to_string(),
            token: None,
        }
    }
}

impl ConnectionInfo {
    /// Base URL of the service's HTTP functions.
    pub fn service_url(&self) -> String {
        format!(
            "{}/{}/services/{}",
            self.server_url.trim_end_matches('/'),
            self.workspace.trim_matches('/'),
            self.service_id.trim_matches('/'),
        )
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("server_url", &self.server_url)
            .field("workspace", &self.workspace)
            .field("service_id", &self.service_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// State scoped to the training feature.
#[derive(Clone)]
pub struct TrainingContext {
    pub config: MonitorConfig,
    pub location: Arc<dyn LocationSink>,
}

impl Default for TrainingContext {
    fn default() -> Self {
        Self {
            config: MonitorConfig::default(),
            location: Arc::new(LogLocation),
        }
    }
}

#[derive(Clone)]
pub struct AppContext {
    connection: ConnectionInfo,
    backend: Arc<dyn TrainingBackend>,
    training: TrainingContext,
}

impl AppContext {
    pub fn new(
        connection: ConnectionInfo,
        backend: Arc<dyn TrainingBackend>,
        training: TrainingContext,
    ) -> Self {
        Self {
            connection,
            backend,
            training,
        }
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    pub fn backend(&self) -> Arc<dyn TrainingBackend> {
        self.backend.clone()
    }

    pub fn training(&self) -> &TrainingContext {
        &self.training
    }

    /// A fresh monitor bound to this context's backend and training state.
    pub fn monitor(&self) -> TrainingMonitor {
        TrainingMonitor::new(
            self.backend.clone(),
            self.training.config.clone(),
            self.training.location.clone(),
        )
    }
}
