use anyhow::{Context, Result};
use async_trait::async_trait;
use bioimage_training::{
    merge, Affordances, AppContext, SessionId, SessionReport, StatusType, TrainingSession,
};
use clap::Args;

use super::{parse_session_arg, Command, OutputFormat};

#[derive(Debug, Clone, Args)]
#[command()]
pub struct CommandStatus {
    /// Session id, `/train/<id>` route or a URL containing one
    pub session: String,
    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[async_trait]
impl Command for CommandStatus {
    async fn execute(self, ctx: AppContext) -> Result<()> {
        let session_id = parse_session_arg(&self.session)?;
        let session = fetch_session(&ctx, &session_id).await?;

        match self.format {
            OutputFormat::Text => {
                print!("{}", SessionReport(&session));
                let flags = Affordances::of(&session, false);
                let available: Vec<&str> = [
                    (flags.can_stop, "stop"),
                    (flags.can_export, "export"),
                    (flags.can_continue, "continue"),
                ]
                .into_iter()
                .filter_map(|(allowed, action)| allowed.then_some(action))
                .collect();
                if !available.is_empty() {
                    println!("Available: {}", available.join(", "));
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&session)?),
        }
        Ok(())
    }
}

/// One-off status fetch, folded into a fresh session.
pub async fn fetch_session(ctx: &AppContext, session_id: &SessionId) -> Result<TrainingSession> {
    let payload = ctx
        .backend()
        .get_training_status(session_id)
        .await
        .with_context(|| format!("Failed to fetch status of session {session_id}"))?;
    Ok(merge(
        &TrainingSession::new(session_id.clone(), StatusType::Preparing),
        &payload,
    ))
}
