//! Agent configuration
//!
//! Defines the agent's tunables: where jobs come from, how long to wait for
//! one, and how long the agent may live.

use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
///
/// Built from command-line flags (which fall back to `SKIFF_*` environment
/// variables) on top of [`Config::default`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity sent to the job board in the `From` header
    pub processor_id: String,

    /// Enables debug logging
    pub debug: bool,

    /// Upper bound on the whole process lifetime
    pub max_lifetime: Duration,

    /// Where jobs come from (`http(s)://` job board, `file://` payload or `-`)
    pub job_url: String,

    /// How long a wait may take before giving up
    pub max_wait: Duration,

    /// Pause between fetch attempts while waiting
    pub wait_interval: Duration,

    /// Keep waiting for jobs after the first one has run
    pub continuous: bool,

    /// Fetch one job without waiting or retrying (the `run` command)
    pub single_job: bool,

    /// Shell used to run job scripts
    pub interpreter: String,

    /// Directory job scripts are written to
    pub script_dir: PathBuf,
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.processor_id.is_empty() {
            anyhow::bail!("processor_id cannot be empty");
        }

        if self.job_url.is_empty() {
            anyhow::bail!("job URL cannot be empty");
        }

        if self.max_lifetime.is_zero() {
            anyhow::bail!("max_lifetime must be greater than 0");
        }

        if self.max_wait.is_zero() {
            anyhow::bail!("max_wait must be greater than 0");
        }

        if self.wait_interval.is_zero() {
            anyhow::bail!("wait_interval must be greater than 0");
        }

        if self.interpreter.is_empty() {
            anyhow::bail!("interpreter cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            processor_id: processor_id(),
            debug: false,
            max_lifetime: Duration::from_secs(5 * 60 * 60),
            job_url: String::new(),
            max_wait: Duration::from_secs(30 * 60),
            wait_interval: Duration::from_secs(3),
            continuous: false,
            single_job: false,
            interpreter: "bash".to_string(),
            script_dir: std::env::temp_dir(),
        }
    }
}

/// Identity of this agent process: `<uuid>@<pid>.<hostname>`
pub fn processor_id() -> String {
    let hostname = nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string());

    format!(
        "{}@{}.{}",
        uuid::Uuid::new_v4(),
        std::process::id(),
        hostname
    )
}
