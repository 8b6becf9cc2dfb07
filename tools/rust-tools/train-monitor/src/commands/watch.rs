use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bioimage_training::{
    AppContext, MonitorSnapshot, PollerState, SnapshotReport, StatusType, TrainingMonitor,
};
use clap::Args;
use tracing::info;

use super::{parse_session_arg, Command, OutputFormat};

#[derive(Debug, Clone, Args)]
#[command()]
pub struct CommandWatch {
    /// Session id, `/train/<id>` route or a URL containing one
    pub session: String,
    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[async_trait]
impl Command for CommandWatch {
    async fn execute(self, ctx: AppContext) -> Result<()> {
        let session_id = parse_session_arg(&self.session)?;
        let monitor = ctx.monitor();
        monitor.attach(session_id);

        let outcome = follow(&monitor, self.format).await?;
        ensure_succeeded(&monitor.snapshot(), outcome)
    }
}

/// Print every change of the monitored session until polling ends. Ctrl-C
/// detaches from the session without stopping it.
pub async fn follow(monitor: &TrainingMonitor, format: OutputFormat) -> Result<PollerState> {
    let mut rx = monitor.subscribe();
    let mut last_shown = None;
    loop {
        let snapshot = rx.borrow_and_update().clone();
        let shown = (snapshot.session.clone(), snapshot.error.clone());
        if last_shown.as_ref() != Some(&shown) {
            print_snapshot(&snapshot, format)?;
            last_shown = Some(shown);
        }
        if snapshot.poller.is_finished() {
            return Ok(snapshot.poller);
        }

        tokio::select! {
            changed = rx.changed() => changed.context("Monitor stopped publishing updates")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, detaching from the session");
                monitor.detach();
                return Ok(PollerState::Cancelled);
            }
        }
    }
}

pub fn print_snapshot(snapshot: &MonitorSnapshot, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", SnapshotReport(snapshot)),
        OutputFormat::Json => println!("{}", serde_json::to_string(snapshot)?),
    }
    Ok(())
}

/// Turn a failed or stalled session into a non-zero exit.
pub fn ensure_succeeded(snapshot: &MonitorSnapshot, outcome: PollerState) -> Result<()> {
    let reason = || snapshot.error.clone().unwrap_or_default();
    if outcome == PollerState::Stalled {
        bail!("Gave up monitoring: {}", reason());
    }
    if let Some(session) = &snapshot.session {
        if session.status_type == StatusType::Failed {
            bail!("Training session {} failed: {}", session.session_id, reason());
        }
    }
    Ok(())
}
