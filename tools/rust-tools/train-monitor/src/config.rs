//! Layered configuration: CLI flags and env vars win over the TOML config
//! file, which wins over built-in defaults.

use std::path::Path;

use anyhow::{Context, Result};
use bioimage_training::{ConnectionInfo, MonitorConfig};
use clap::Args;
use serde::Deserialize;
use tracing::{debug, warn};

/// Contents of the optional config file.
///
/// ```toml
/// [connection]
/// server_url = "https://hypha.aicell.io"
/// workspace = "bioimage-io"
/// service_id = "cellpose-finetuning"
///
/// [monitor]
/// poll_interval_ms = 2000
/// max_consecutive_failures = 20
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub connection: ConnectionInfo,
    pub monitor: MonitorConfig,
}

impl FileConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No config file given, using defaults");
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        if config.connection.token.is_some() {
            warn!(
                "Config file {} contains a token; prefer the HYPHA_TOKEN env var",
                path.display()
            );
        }
        Ok(config)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Hypha server URL
    #[clap(long, env = "HYPHA_SERVER_URL")]
    pub server_url: Option<String>,

    /// Workspace the training service is registered in
    #[clap(long, env = "HYPHA_WORKSPACE")]
    pub workspace: Option<String>,

    /// Id of the training service
    #[clap(long, env = "HYPHA_SERVICE_ID")]
    pub service_id: Option<String>,

    /// Bearer token for the Hypha server
    #[clap(long, env = "HYPHA_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl ConnectionArgs {
    pub fn apply(&self, mut connection: ConnectionInfo) -> ConnectionInfo {
        if let Some(server_url) = &self.server_url {
            connection.server_url = server_url.clone();
        }
        if let Some(workspace) = &self.workspace {
            connection.workspace = workspace.clone();
        }
        if let Some(service_id) = &self.service_id {
            connection.service_id = service_id.clone();
        }
        if let Some(token) = &self.token {
            connection.token = Some(token.clone());
        }
        connection
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct MonitorArgs {
    /// Delay between status fetches while training runs
    #[clap(long, env = "TRAIN_MONITOR_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Give up polling after this many consecutive failed fetches
    #[clap(long, env = "TRAIN_MONITOR_MAX_FAILURES")]
    pub max_consecutive_failures: Option<u32>,

    /// A status fetch slower than this counts as failed
    #[clap(long, env = "TRAIN_MONITOR_FETCH_TIMEOUT_MS")]
    pub fetch_timeout_ms: Option<u64>,
}

impl MonitorArgs {
    pub fn apply(&self, mut config: MonitorConfig) -> MonitorConfig {
        if let Some(poll_interval_ms) = self.poll_interval_ms {
            config.poll_interval_ms = poll_interval_ms;
        }
        if let Some(max) = self.max_consecutive_failures {
            config.max_consecutive_failures = Some(max);
        }
        if let Some(fetch_timeout_ms) = self.fetch_timeout_ms {
            config.fetch_timeout_ms = fetch_timeout_ms;
        }
        config
    }
}
