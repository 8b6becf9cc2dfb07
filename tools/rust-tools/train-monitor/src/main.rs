use std::path::PathBuf;

use anyhow::Result;
use bioimage_logging::{logging, LogOutput};
use clap::{Parser, Subcommand};
use tokio::runtime::Builder;
use tracing::Level;
use train_monitor::commands::{
    Command, CommandContinue, CommandExport, CommandStart, CommandStatus, CommandStop,
    CommandWatch,
};
use train_monitor::config::{ConnectionArgs, FileConfig, MonitorArgs};
use train_monitor::{build_context, load_and_apply_env_file};

#[derive(Parser, Debug)]
#[command(name = "train-monitor")]
#[command(about = "Start, follow and export fine-tuning sessions on a Hypha training service")]
struct CliArgs {
    /// TOML file with `[connection]` and `[monitor]` tables
    #[clap(long, env = "TRAIN_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Path to .env file with environment variables
    #[clap(long)]
    env_file: Option<PathBuf>,

    #[clap(flatten)]
    connection: ConnectionArgs,

    #[clap(flatten)]
    monitor: MonitorArgs,

    #[clap(long, env, value_enum, default_value_t = LogOutput::Console)]
    logs: LogOutput,

    #[clap(long, env, default_value_t = Level::WARN)]
    log_level: Level,

    /// Append detailed logs to this file
    #[clap(long, env)]
    write_log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a new training session and follow it
    Start(CommandStart),
    /// Start a new session from the weights of a finished one
    Continue(CommandContinue),
    /// Follow an existing session until it finishes
    Watch(CommandWatch),
    /// Ask the service to stop a running session
    Stop(CommandStop),
    /// Export the model of a finished session
    Export(CommandExport),
    /// Print the current state of a session
    Status(CommandStatus),
    // Prints the help, optionally as markdown. Used for docs generation.
    #[clap(hide = true)]
    PrintAllHelp {
        #[arg(long, required = true)]
        markdown: bool,
    },
}

async fn async_main() -> Result<()> {
    let mut args = CliArgs::parse();
    if let Some(env_file) = args.env_file.clone() {
        load_and_apply_env_file(&env_file)?;
        // env-backed arguments have to see the freshly loaded values
        args = CliArgs::parse();
    }

    if let Commands::PrintAllHelp { markdown } = args.command {
        assert!(markdown);
        clap_markdown::print_help_markdown::<CliArgs>();
        return Ok(());
    }

    logging()
        .with_output(args.logs)
        .with_level(args.log_level)
        .with_log_file(args.write_log_file.clone())
        .init()?;

    let file = FileConfig::load(args.config.as_deref())?;
    let ctx = build_context(file, &args.connection, &args.monitor)?;

    match args.command {
        Commands::Start(command) => command.execute(ctx).await,
        Commands::Continue(command) => command.execute(ctx).await,
        Commands::Watch(command) => command.execute(ctx).await,
        Commands::Stop(command) => command.execute(ctx).await,
        Commands::Export(command) => command.execute(ctx).await,
        Commands::Status(command) => command.execute(ctx).await,
        Commands::PrintAllHelp { .. } => Ok(()),
    }
}

fn main() -> Result<()> {
    Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}
