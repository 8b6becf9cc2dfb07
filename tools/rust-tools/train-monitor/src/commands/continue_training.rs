use anyhow::{bail, Result};
use async_trait::async_trait;
use bioimage_training::{AppContext, PollerState};
use clap::Args;

use super::start::TrainingArgs;
use super::status::fetch_session;
use super::watch::{ensure_succeeded, follow};
use super::{parse_session_arg, Command, OutputFormat};

#[derive(Debug, Clone, Args)]
#[command()]
pub struct CommandContinue {
    /// Finished session whose weights the new run starts from
    pub session: String,

    // --dataset defaults to the dataset of the previous session
    #[clap(flatten)]
    pub training: TrainingArgs,

    /// Return once the session has started instead of following it
    #[clap(long)]
    pub detach: bool,

    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[async_trait]
impl Command for CommandContinue {
    async fn execute(self, ctx: AppContext) -> Result<()> {
        let previous = parse_session_arg(&self.session)?;
        let current = fetch_session(&ctx, &previous).await?;
        if !current.is_terminal() {
            bail!(
                "Session {previous} is still {}; stop it or wait for it to finish first",
                current.status_type
            );
        }

        let monitor = ctx.monitor();
        monitor.attach(previous.clone());
        if monitor.wait_settled().await != PollerState::Settled {
            bail!(
                "Could not load session {previous}: {}",
                monitor.snapshot().error.unwrap_or_default()
            );
        }

        let session = monitor.continue_current(self.training.into_params()).await?;
        println!("Continuing session {previous} as {}", session.session_id);
        if self.detach {
            return Ok(());
        }

        let outcome = follow(&monitor, self.format).await?;
        ensure_succeeded(&monitor.snapshot(), outcome)
    }
}
