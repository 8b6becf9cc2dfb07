use anyhow::Result;
use async_trait::async_trait;
use bioimage_training::{AppContext, TrainingParams};
use clap::Args;

use super::watch::{ensure_succeeded, follow};
use super::{Command, OutputFormat};

#[derive(Debug, Clone, Args)]
pub struct TrainingArgs {
    /// Dataset artifact holding images and annotations
    #[clap(long, env = "DATASET_ARTIFACT_ID")]
    pub dataset: Option<String>,

    /// Pretrained model to fine-tune
    #[clap(long, default_value = "cyto3")]
    pub model: String,

    /// Glob of training images inside the dataset
    #[clap(long)]
    pub train_images: String,

    /// Glob of annotation masks matching the training images
    #[clap(long)]
    pub train_annotations: String,

    #[clap(long, default_value_t = 10)]
    pub n_epochs: u32,

    #[clap(long, default_value_t = 1e-6)]
    pub learning_rate: f64,

    #[clap(long, default_value_t = 1e-4)]
    pub weight_decay: f64,

    /// Run validation every N epochs
    #[clap(long)]
    pub validation_interval: Option<u32>,

    #[clap(long, requires = "test_annotations")]
    pub test_images: Option<String>,

    #[clap(long, requires = "test_images")]
    pub test_annotations: Option<String>,
}

impl TrainingArgs {
    pub fn into_params(self) -> TrainingParams {
        TrainingParams {
            dataset_artifact_id: self.dataset.unwrap_or_default(),
            model: self.model,
            train_images: self.train_images,
            train_annotations: self.train_annotations,
            n_epochs: self.n_epochs,
            learning_rate: self.learning_rate,
            weight_decay: self.weight_decay,
            validation_interval: self.validation_interval,
            test_images: self.test_images,
            test_annotations: self.test_annotations,
        }
    }
}

#[derive(Debug, Clone, Args)]
#[command()]
pub struct CommandStart {
    #[clap(flatten)]
    pub training: TrainingArgs,

    /// Return once the session has started instead of following it
    #[clap(long)]
    pub detach: bool,

    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[async_trait]
impl Command for CommandStart {
    async fn execute(self, ctx: AppContext) -> Result<()> {
        let Self {
            training,
            detach,
            format,
        } = self;

        let monitor = ctx.monitor();
        let session = monitor.start(&training.into_params(), None).await?;
        println!("Started training session {}", session.session_id);
        if detach {
            return Ok(());
        }

        let outcome = follow(&monitor, format).await?;
        ensure_succeeded(&monitor.snapshot(), outcome)
    }
}
