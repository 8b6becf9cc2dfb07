mod command;

pub mod continue_training;
pub mod export;
pub mod start;
pub mod status;
pub mod stop;
pub mod watch;

use anyhow::{Context, Result};
use bioimage_training::{parse_session_route, SessionId};
use clap::ValueEnum;

pub use command::Command;
pub use continue_training::CommandContinue;
pub use export::CommandExport;
pub use start::{CommandStart, TrainingArgs};
pub use status::CommandStatus;
pub use stop::CommandStop;
pub use watch::{follow, CommandWatch};

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Accepts a bare session id, a `/train/<id>` route or a URL containing one.
pub fn parse_session_arg(input: &str) -> Result<SessionId> {
    parse_session_route(input).with_context(|| format!("No training session id in {input:?}"))
}
