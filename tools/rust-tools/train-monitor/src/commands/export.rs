use anyhow::Result;
use async_trait::async_trait;
use bioimage_training::{check_exportable, request_export, AppContext};
use clap::Args;

use super::status::fetch_session;
use super::{parse_session_arg, Command, OutputFormat};

#[derive(Debug, Clone, Args)]
#[command()]
pub struct CommandExport {
    /// Finished session whose model should be exported
    pub session: String,

    /// Name for the exported model artifact
    #[clap(long)]
    pub model_name: Option<String>,

    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[async_trait]
impl Command for CommandExport {
    async fn execute(self, ctx: AppContext) -> Result<()> {
        let session_id = parse_session_arg(&self.session)?;
        let session = fetch_session(&ctx, &session_id).await?;
        check_exportable(&session, false)?;

        let backend = ctx.backend();
        let result =
            request_export(backend.as_ref(), &session_id, self.model_name.as_deref()).await?;

        match self.format {
            OutputFormat::Text => {
                println!("Exported session {session_id} as {}", result.artifact_id);
                if let Some(url) = &result.artifact_url {
                    println!("Artifact: {url}");
                }
                if let Some(url) = &result.download_url {
                    println!("Download: {url}");
                }
                for file in &result.files {
                    println!("  {file}");
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        }
        Ok(())
    }
}
