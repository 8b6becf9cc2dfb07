use anyhow::Result;
use async_trait::async_trait;
use bioimage_training::AppContext;
use clap::Args;

use super::watch::{ensure_succeeded, follow};
use super::{parse_session_arg, Command, OutputFormat};

#[derive(Debug, Clone, Args)]
#[command()]
pub struct CommandStop {
    /// Session id, `/train/<id>` route or a URL containing one
    pub session: String,

    /// Keep following the session until the service confirms the stop
    #[clap(long)]
    pub wait: bool,

    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[async_trait]
impl Command for CommandStop {
    async fn execute(self, ctx: AppContext) -> Result<()> {
        let session_id = parse_session_arg(&self.session)?;
        let monitor = ctx.monitor();
        monitor.attach(session_id.clone());

        monitor.stop().await?;
        println!("Requested stop of session {session_id}");
        if !self.wait {
            monitor.detach();
            return Ok(());
        }

        let outcome = follow(&monitor, self.format).await?;
        ensure_succeeded(&monitor.snapshot(), outcome)
    }
}
