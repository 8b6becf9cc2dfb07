use std::{fs::OpenOptions, path::PathBuf};

use anyhow::Context;
use clap::ValueEnum;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Env var holding the filter for the log file, in `RUST_LOG` syntax.
pub const WRITE_LOG_ENV: &str = "WRITE_RUST_LOG";

// transport internals are rarely useful and very chatty
const QUIET_DIRECTIVES: &[&str] = &[
    "hyper=warn",
    "hyper_util=warn",
    "reqwest=warn",
    "tokio=off",
    "runtime=off",
];

#[derive(Clone, Debug, Copy, ValueEnum, PartialEq)]
pub enum LogOutput {
    Console,
    Json,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub struct LoggingBuilder {
    output: LogOutput,
    level: Level,
    write_logs_file: Option<PathBuf>,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// Create a new logging builder with default settings
    pub fn new() -> Self {
        Self {
            output: LogOutput::Console,
            level: Level::INFO,
            write_logs_file: None,
        }
    }

    /// Set the log output format
    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Set the log level used when `RUST_LOG` is not set
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Also append logs to this file (optional)
    pub fn with_log_file<P: Into<Option<PathBuf>>>(mut self, path: P) -> Self {
        self.write_logs_file = path.into();
        self
    }

    /// Build the subscriber without installing it.
    pub fn build(self) -> anyhow::Result<impl Subscriber + Send + Sync> {
        let output_filter = output_logs_filter(self.level)?;
        let mut layers: Vec<BoxedLayer> = vec![match self.output {
            // stdout is reserved for command output
            LogOutput::Console => fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(output_filter)
                .boxed(),
            LogOutput::Json => fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .flatten_event(true)
                .with_current_span(true)
                .with_filter(output_filter)
                .boxed(),
        }];

        if let Some(path) = self.write_logs_file {
            let log_file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            layers.push(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(log_file)
                    .with_filter(detailed_logs_filter(self.level)?)
                    .boxed(),
            );
        }

        Ok(tracing_subscriber::registry().with(layers))
    }

    /// Build the subscriber and install it as the global default.
    pub fn init(self) -> anyhow::Result<()> {
        tracing::subscriber::set_global_default(self.build()?)
            .context("a global tracing subscriber is already installed")?;
        Ok(())
    }
}

/// Create a new logging builder
pub fn logging() -> LoggingBuilder {
    LoggingBuilder::new()
}

fn output_logs_filter(level: Level) -> anyhow::Result<EnvFilter> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env()?;
    quiet(filter)
}

fn detailed_logs_filter(level: Level) -> anyhow::Result<EnvFilter> {
    let filter = if std::env::var(WRITE_LOG_ENV).is_ok() {
        EnvFilter::builder().with_env_var(WRITE_LOG_ENV).from_env()?
    } else {
        EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env()?
    };
    quiet(filter)
}

fn quiet(filter: EnvFilter) -> anyhow::Result<EnvFilter> {
    QUIET_DIRECTIVES.iter().try_fold(filter, |filter, directive| {
        Ok(filter.add_directive(directive.parse()?))
    })
}
