use anyhow::Result;
use async_trait::async_trait;
use bioimage_training::AppContext;

/// Trait for executable commands that talk to the training service
#[async_trait]
pub trait Command {
    async fn execute(self, ctx: AppContext) -> Result<()>;
}
