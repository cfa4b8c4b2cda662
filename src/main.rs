use std::path::PathBuf;
use std::process::{Command, ExitCode};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use call_limiter::config::{LimiterConfig, StorageBackend};
use call_limiter::ratelimit::LogBackend;
use call_limiter::{FileSharedLog, Limiter, LimiterError};

/// Exit status reported when a call is denied (`EX_TEMPFAIL`). A program started
/// by `run` that exits with this status is indistinguishable from a denial.
const DENIED_EXIT_CODE: u8 = 75;

/// Throttle commands and scripts with sliding-window rate rules.
#[derive(Debug, Parser)]
#[command(name = "call-limiter", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of the shared log store; state persists across invocations
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Shared log document name
    #[arg(long, global = true)]
    database: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Admit or deny one call; exits 75 when denied
    Check(CallArgs),
    /// Run a program if the call is admitted, passing its exit status through;
    /// exits 75 without running it when denied
    Run {
        #[command(flatten)]
        call: CallArgs,
        /// Program and arguments to run
        #[arg(last = true, required = true)]
        program: Vec<String>,
    },
    /// Forget every recorded call for a key
    Reset {
        #[arg(long)]
        key: String,
    },
    /// Print the recorded call timestamps for a key as JSON
    Inspect {
        #[arg(long)]
        key: String,
    },
}

#[derive(Debug, Args)]
struct CallArgs {
    /// Key the call is counted under
    #[arg(long)]
    key: Option<String>,
    /// Rule string, e.g. "10/minute;100/day"
    #[arg(long)]
    limits: Option<String>,
    /// Key value that bypasses throttling
    #[arg(long)]
    exempt: Option<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = LimiterConfig::load(cli.config.as_deref())?;
    if let Some(store) = &cli.store {
        config.storage.backend = StorageBackend::File;
        config.storage.path = Some(store.clone());
    }
    if let Some(database) = &cli.database {
        config.storage.database_name = database.clone();
    }
    config.validate()?;

    let builder = Limiter::builder().with_config(&config);
    match (config.storage.backend, &config.storage.path) {
        (StorageBackend::File, Some(path)) => {
            let store = FileSharedLog::open(path)
                .with_context(|| format!("opening store at {}", path.display()))?;
            let limiter = builder.build_shared(store)?;
            info!(store = %path.display(), database = %limiter.database(), "Using file store");
            execute(&limiter, cli.command)
        }
        _ => {
            debug!("Using in-process log; state is discarded on exit");
            execute(&builder.build(), cli.command)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

fn execute<B: LogBackend>(limiter: &Limiter<B>, command: Cmd) -> anyhow::Result<ExitCode> {
    match command {
        Cmd::Check(call) => match admit(limiter, &call) {
            Ok(()) => Ok(ExitCode::SUCCESS),
            Err(LimiterError::RateLimitExceeded) => {
                eprintln!("rate limit exceeded");
                Ok(ExitCode::from(DENIED_EXIT_CODE))
            }
            Err(e) => Err(e.into()),
        },
        Cmd::Run { call, program } => {
            let status = match admit(limiter, &call) {
                Ok(()) => Command::new(&program[0])
                    .args(&program[1..])
                    .status()
                    .with_context(|| format!("running {}", program[0]))?,
                Err(LimiterError::RateLimitExceeded) => {
                    eprintln!("rate limit exceeded, not running {}", program[0]);
                    return Ok(ExitCode::from(DENIED_EXIT_CODE));
                }
                Err(e) => return Err(e.into()),
            };
            let code = status.code().unwrap_or(1);
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
        Cmd::Reset { key } => {
            limiter.reset(key.as_str())?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Inspect { key } => {
            let entries = limiter.entries(&key)?;
            println!("{}", serde_json::to_string(&entries)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn admit<B: LogBackend>(limiter: &Limiter<B>, call: &CallArgs) -> call_limiter::Result<()> {
    let mut limit = limiter.limit();
    if let Some(key) = &call.key {
        limit = limit.key(key);
    }
    if let Some(limits) = &call.limits {
        limit = limit.limitations(limits);
    }
    if let Some(exempt) = &call.exempt {
        limit = limit.exempt(exempt);
    }
    limit.check()
}
