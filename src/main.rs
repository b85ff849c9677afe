use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use skyctl::commands::{self, Command, Context};
use skyctl::config::Config;
use skyctl::output::{self, OutputFormat};
use skyctl::remote::{HttpResourceService, InMemoryService, RemoteResourceService};
use skyctl::resource::{describe, CoreError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Endpoint selecting the in-memory provider
const MEMORY_ENDPOINT: &str = "memory://";

/// Command-line front end for cloud log, table, object and notification services
#[derive(Parser, Debug)]
#[command(name = "skyctl", version, about, long_about = None)]
struct Args {
    /// Gateway endpoint (or memory:// for a dry run)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Region to operate in
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Seconds to wait for create/delete to settle
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, global = true)]
    output: Option<OutputFormat>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: TopLevel,
}

#[derive(Subcommand, Debug)]
enum TopLevel {
    #[command(flatten)]
    Service(Command),
    /// Show or change the saved configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the saved configuration
    Show,
    /// Save the given global flags as defaults
    Set {
        /// Bulk request chunks in flight at once
        #[arg(long)]
        batch_concurrency: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("skyctl {} started with log level: {:?}", skyctl::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("skyctl").join("skyctl.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".skyctl").join("skyctl.log");
    }
    PathBuf::from("skyctl.log")
}

fn build_service(endpoint: &str, region: &str) -> Result<Arc<dyn RemoteResourceService>> {
    if endpoint == MEMORY_ENDPOINT {
        tracing::info!("Using in-memory provider");
        return Ok(Arc::new(InMemoryService::new()));
    }
    tracing::info!("Using endpoint: {}, region: {}", endpoint, region);
    Ok(Arc::new(HttpResourceService::new(endpoint, region)?))
}

fn run_config(mut config: Config, args: &Args, command: &ConfigCommand) -> Result<()> {
    if let ConfigCommand::Set { batch_concurrency } = command {
        if args.endpoint.is_some() {
            config.endpoint = args.endpoint.clone();
        }
        if args.region.is_some() {
            config.region = args.region.clone();
        }
        if args.output.is_some() {
            config.output = args.output;
        }
        if args.timeout.is_some() {
            config.timeout_secs = args.timeout;
        }
        if batch_concurrency.is_some() {
            config.batch_concurrency = *batch_concurrency;
        }
        config.save().context("Failed to save configuration")?;
    }
    let format = config.effective_output(args.output);
    output::print(&serde_json::to_value(&config)?, format)
}

/// Message printed for a failed command
fn error_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<CoreError>() {
        Some(core) if !core.is_timeout() => match core.remote() {
            Some(remote) => format!("{core}\n{}", describe(remote)),
            None => core.to_string(),
        },
        _ => format!("{err:#}"),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: {err:#}");
            None
        }
    };

    let result = run(args).await;
    if let Err(err) = &result {
        tracing::error!("{:#}", err);
        eprintln!("Error: {}", error_message(err));
    }

    // Flush buffered log lines before exiting
    drop(log_guard);
    if result.is_err() {
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load();
    let format = config.effective_output(args.output);

    let command = match &args.command {
        TopLevel::Config(cmd) => return run_config(config, &args, cmd),
        TopLevel::Service(cmd) => cmd,
    };

    let endpoint = config.effective_endpoint(args.endpoint.as_deref());
    let region = config.effective_region(args.region.as_deref());
    let service = build_service(&endpoint, &region)?;

    let ctx = Context::new(service, &region)
        .with_policy(config.poll_policy())
        .with_timeout(config.effective_timeout(args.timeout))
        .with_batch_concurrency(config.batch_concurrency());

    let value = commands::run(&ctx, command).await?;
    output::print(&value, format)
}
