use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use custodian::config::Config;
use custodian::policy::{self, RunOptions};
use custodian::provider::http::format_provider_error;
use custodian::session::Session;
use custodian::Error;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Declarative policies over cloud resources
#[derive(Parser, Debug)]
#[command(name = "custodian", version, about, long_about = None)]
struct Args {
    /// Log level (RUST_LOG takes precedence when set)
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Config file (default: <config dir>/custodian/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Azure subscription to query
    #[arg(long, global = true)]
    subscription: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the policies of a file
    Run {
        policy_file: PathBuf,

        /// Directory receiving <policy>/resources.json and metadata.json
        #[arg(short = 's', long, default_value = ".")]
        output_dir: PathBuf,

        /// Filter and record, but skip actions
        #[arg(long)]
        dry_run: bool,
    },
    /// Check a policy file without contacting any provider
    Validate { policy_file: PathBuf },
    /// List resource types, or the filters and actions of one
    Schema { resource: Option<String> },
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

fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match level.to_tracing_level() {
            Some(level) => EnvFilter::new(level.as_str().to_lowercase()),
            None => return Ok(None),
        },
    };

    let (writer, guard) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {:?}", parent))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .with_target(true)
        .init();

    tracing::debug!("custodian started with log level: {:?}", level);
    Ok(Some(guard))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(subscription) = &args.subscription {
        config.subscription_id = Some(subscription.clone());
    }
    Ok(config)
}

async fn run(session: &Session, policy_file: &Path, output_dir: PathBuf, dry_run: bool) -> Result<()> {
    let policies = policy::load_file(policy_file, session)?;
    let options = RunOptions { output_dir, dry_run };

    let mut failed = Vec::new();
    for policy in &policies {
        match policy.run(session, &options).await {
            Ok(report) => println!(
                "{}: {} of {} {} resources matched",
                report.policy, report.matched, report.total, report.resource_type
            ),
            Err(Error::Provider(e)) => {
                tracing::error!("Policy {} failed: {}", policy.name(), format_provider_error(&e));
                tracing::debug!("Provider error detail: {:#}", e);
                failed.push(policy.name().to_string());
            }
            Err(e) => {
                tracing::error!("Policy {} failed: {}", policy.name(), e);
                failed.push(policy.name().to_string());
            }
        }
    }

    if !failed.is_empty() {
        bail!("{} of {} policies failed: {}", failed.len(), policies.len(), failed.join(", "));
    }
    Ok(())
}

fn validate(session: &Session, policy_file: &Path) -> Result<()> {
    let policies = policy::load_file(policy_file, session)?;
    println!("{:?}: {} valid policies", policy_file, policies.len());
    Ok(())
}

fn schema(session: &Session, resource: Option<&str>) -> Result<()> {
    let registry = session.resource_registry();
    let output = match resource {
        None => json!(registry.keys()),
        Some(key) => {
            let rt = registry.require(key)?;
            json!({
                "resource": rt.key,
                "display_name": rt.display_name,
                "provider": rt.provider.to_string(),
                "filters": session.filter_registry(key)?.names().collect::<Vec<_>>(),
                "actions": session.action_registry().names().collect::<Vec<_>>(),
            })
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level, args.log_file.as_deref())?;

    let config = load_config(&args)?;
    let session = Session::new(config)?;

    match args.command {
        Command::Run {
            ref policy_file,
            ref output_dir,
            dry_run,
        } => run(&session, policy_file, output_dir.clone(), dry_run).await,
        Command::Validate { ref policy_file } => validate(&session, policy_file),
        Command::Schema { ref resource } => schema(&session, resource.as_deref()),
    }
}
