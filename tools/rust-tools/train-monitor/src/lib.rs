use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use bioimage_hypha::HyphaClient;
use bioimage_training::{session_route, AppContext, LocationSink, SessionId, TrainingContext};

pub mod commands;
pub mod config;

use config::{ConnectionArgs, FileConfig, MonitorArgs};

/// Load environment variables from a file into the host process, so they are
/// visible to `env`-backed CLI arguments.
pub fn load_and_apply_env_file(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read env file: {}", path.display()))?;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            std::env::set_var(key.trim().trim_matches('"'), value.trim().trim_matches('"'));
        }
    }
    Ok(())
}

/// Prints the resumable route of every session the monitor picks up.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrintLocation;

impl LocationSink for PrintLocation {
    fn set_session(&self, session_id: &SessionId) {
        println!("Monitoring {}", session_route(session_id));
    }
}

/// Resolve configuration (flags and env over the config file over defaults)
/// and connect to the training service.
pub fn build_context(
    file: FileConfig,
    connection: &ConnectionArgs,
    monitor: &MonitorArgs,
) -> Result<AppContext> {
    let connection = connection.apply(file.connection);
    let config = monitor.apply(file.monitor);
    let client =
        HyphaClient::new(connection.clone()).context("Failed to create Hypha HTTP client")?;

    Ok(AppContext::new(
        connection,
        Arc::new(client),
        TrainingContext {
            config,
            location: Arc::new(PrintLocation),
        },
    ))
}
