//! Skiff Runner
//!
//! A pull-based CI job agent. It claims a job from a job board (or reads one
//! from a local file), runs the job's shell script, relays the script's
//! output, and reports the job's lifecycle back to the job's state URL.
//!
//! Architecture:
//! - Configuration: command-line flags with environment fallbacks
//! - Repositories: where jobs come from (job board, local payloads)
//! - Services: business logic (running scripts, streaming output, status reports)
//! - Scheduler: waiting for a job under a deadline
//!
//! Exit codes: `2` job source setup (or reading the payload given to `run`),
//! `3` runner setup, `4` waiting for a job, `5` running the job.

mod config;
mod repository;
mod scheduler;
mod scope;
mod service;

use anyhow::Result;
use clap::{Parser, Subcommand};
use skiff_client::CallbackClient;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::repository::{JobSource, SourceError, source_for_url};
use crate::scheduler::{FetchRetryWaiter, WaitError, Waiter};
use crate::scope::{Cancelled, Scope};
use crate::service::{
    CopyStreamer, DestinationSinks, RunError, Runner, ScriptRunner, UrlStatuser,
};

#[derive(Parser)]
#[command(name = "skiff-runner")]
#[command(about = "Skiff CI job agent", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, env = "SKIFF_DEBUG", global = true)]
    debug: bool,

    /// Maximum lifetime of the agent in seconds
    #[arg(long, env = "SKIFF_MAX_LIFETIME", default_value_t = 5 * 60 * 60, global = true)]
    max_lifetime: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for a job from a job source and run it
    Wait {
        /// Job source URL (http(s):// job board, file:// payload, or - for stdin)
        #[arg(long, env = "SKIFF_JOB_URL")]
        url: String,

        /// Maximum time to wait for a job, in seconds
        #[arg(long, env = "SKIFF_MAX_WAIT_TIME", default_value_t = 30 * 60)]
        max_wait_time: u64,

        /// Pause between fetch attempts, in seconds
        #[arg(long, env = "SKIFF_WAIT_INTERVAL", default_value_t = 3)]
        wait_interval: u64,

        /// Keep waiting for further jobs until the agent's lifetime ends
        #[arg(long, env = "SKIFF_CONTINUOUS")]
        continuous: bool,
    },
    /// Run a single job payload
    Run {
        /// Path to the job payload, or - for stdin
        #[arg(long, env = "SKIFF_JSON", default_value = "-")]
        json: String,
    },
}

/// Failures that end the agent, each with its own exit code
#[derive(Debug)]
enum Failure {
    Source(anyhow::Error),
    Fetch(SourceError),
    Runner(anyhow::Error),
    Wait(WaitError),
    Run(RunError),
}

impl Failure {
    fn exit_code(&self) -> u8 {
        match self {
            Failure::Source(_) | Failure::Fetch(_) => 2,
            Failure::Runner(_) => 3,
            Failure::Wait(_) => 4,
            Failure::Run(_) => 5,
        }
    }
}

impl From<WaitError> for Failure {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Cancelled(_) => Failure::Wait(err),
            WaitError::Run(e) => Failure::Run(e),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.debug {
        "skiff_runner=debug,skiff_client=debug"
    } else {
        "skiff_runner=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = build_config(cli);
    info!(
        processor_id = %config.processor_id,
        job_url = %config.job_url,
        debug = config.debug,
        "Starting Skiff Runner"
    );

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            match &failure {
                Failure::Source(e) => error!("Failed to set up job source: {:#}", e),
                Failure::Fetch(e) => error!("Failed to fetch job: {}", e),
                Failure::Runner(e) => error!("Failed to set up runner: {:#}", e),
                Failure::Wait(e) => error!("Failed to acquire a job: {}", e),
                Failure::Run(e) => error!("Job run failed: {}", e),
            }
            ExitCode::from(failure.exit_code())
        }
    }
}

fn build_config(cli: Cli) -> Config {
    let mut config = Config {
        debug: cli.debug,
        max_lifetime: Duration::from_secs(cli.max_lifetime),
        ..Config::default()
    };

    match cli.command {
        Commands::Wait {
            url,
            max_wait_time,
            wait_interval,
            continuous,
        } => {
            config.job_url = url;
            config.max_wait = Duration::from_secs(max_wait_time);
            config.wait_interval = Duration::from_secs(wait_interval);
            config.continuous = continuous;
        }
        Commands::Run { json } => {
            config.single_job = true;
            config.job_url = if json == "-" {
                json
            } else {
                format!("file://{}", json)
            };
        }
    }

    config
}

async fn run(config: Config) -> Result<(), Failure> {
    config.validate().map_err(Failure::Source)?;

    let root = Scope::new().with_timeout(config.max_lifetime);
    spawn_signal_handler(root.clone()).map_err(Failure::Source)?;

    let source = source_for_url(&config.job_url, &config.processor_id)
        .map_err(|e| Failure::Source(e.into()))?;
    let runner = build_runner(&config).map_err(Failure::Runner)?;

    if config.single_job {
        return run_single(source.as_ref(), runner.as_ref(), &root).await;
    }

    let waiter = FetchRetryWaiter::new(source, runner, config.wait_interval, config.max_wait);

    if !config.continuous {
        waiter.wait(&root).await?;
        info!("Job completed");
        return Ok(());
    }

    info!("Waiting for jobs until the agent's lifetime ends");
    loop {
        match waiter.wait(&root).await {
            Ok(()) => info!("Job completed"),
            Err(WaitError::Cancelled(Cancelled::DeadlineExceeded)) if !root.is_done() => {
                info!("No job within the wait window, waiting again");
            }
            Err(e @ WaitError::Run(_)) => warn!("Job run failed: {}", e),
            Err(e @ WaitError::Cancelled(_)) => {
                info!("Stopped waiting for jobs: {}", e);
                return Ok(());
            }
        }

        if root.is_done() {
            info!("Agent lifetime over");
            return Ok(());
        }
    }
}

/// Fetches exactly one job and runs it, without retrying the source
async fn run_single(
    source: &dyn JobSource,
    runner: &dyn Runner,
    scope: &Scope,
) -> Result<(), Failure> {
    let job = source.fetch(scope).await.map_err(Failure::Fetch)?;
    info!(job_id = %job.id(), "Running job");

    runner.run(scope, job).await.map_err(Failure::Run)?;
    info!("Job completed");
    Ok(())
}

fn build_runner(config: &Config) -> Result<Arc<dyn Runner>> {
    if config.script_dir.as_os_str().is_empty() {
        anyhow::bail!("script directory cannot be empty");
    }

    let callbacks = CallbackClient::new();
    let runner = ScriptRunner::new(
        Arc::new(UrlStatuser::new(callbacks.clone())),
        Arc::new(CopyStreamer::new()),
        Arc::new(DestinationSinks::new(callbacks)),
    )
    .with_interpreter(config.interpreter.clone())
    .with_script_dir(config.script_dir.clone());

    info!(interpreter = %runner.interpreter(), "Runner initialized");
    Ok(Arc::new(runner))
}

/// Cancels `scope` on SIGINT or SIGTERM
fn spawn_signal_handler(scope: Scope) -> Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("Received SIGINT, shutting down"),
            _ = terminate.recv() => info!("Received SIGTERM, shutting down"),
            _ = scope.done() => return,
        }
        scope.cancel();
    });

    Ok(())
}
