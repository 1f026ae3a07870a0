//! Execution service
//!
//! Runs one job end to end:
//! - decodes the job script and writes it to a temporary file
//! - wires the script's combined stdout/stderr into the `stdouterr` stream
//! - launches the interpreter and waits for it, or kills it when the scope ends
//! - reports each lifecycle transition through the statuser
//!
//! Status reporting is best effort. A failed report is logged and execution
//! carries on. Once the caller's scope is done, reports are still attempted
//! under a short grace period so the terminal state gets recorded.

use async_trait::async_trait;
use skiff_core::domain::state::STATE_UPDATE_COUNT;
use skiff_core::{JobRecord, STDOUTERR, ScriptError, State, StateUpdate};
use std::os::fd::OwnedFd;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::unix::pipe;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::scope::Scope;
use crate::service::streamer::{BoundStream, StreamError};
use crate::service::{SinkProvider, Statuser, Streamer};

/// Time allowed for a status report sent after the caller's scope is done
const REPORT_GRACE: Duration = Duration::from_secs(5);

/// Service trait for running a single job
#[async_trait]
pub trait Runner: Send + Sync {
    /// Runs `job` to completion
    ///
    /// Cancelling `scope` kills the job's process.
    async fn run(&self, scope: &Scope, job: JobRecord) -> Result<(), RunError>;
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to extract job script: {0}")]
    ScriptDecode(#[from] ScriptError),

    #[error("failed to write job script to {path}: {source}")]
    ScriptWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job has no {0:?} stream")]
    MissingStream(String),

    #[error("failed to open sink for stream {stream:?}: {source}")]
    Sink {
        stream: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output pipe: {0}")]
    Pipe(#[source] std::io::Error),

    #[error("failed to start {interpreter}: {source}")]
    Launch {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no process state found: {0}")]
    NoProcessState(#[source] std::io::Error),

    #[error("process did not exit: {0}")]
    AbnormalExit(ExitStatus),

    #[error("process exited with code {0}")]
    NonZeroExit(i32),
}

/// Runner that executes the job script with a shell interpreter
pub struct ScriptRunner {
    interpreter: String,
    script_dir: PathBuf,
    statuser: Arc<dyn Statuser>,
    streamer: Arc<dyn Streamer>,
    sinks: Arc<dyn SinkProvider>,
}

impl ScriptRunner {
    /// Creates a runner using `bash` and the system temp directory
    pub fn new(
        statuser: Arc<dyn Statuser>,
        streamer: Arc<dyn Streamer>,
        sinks: Arc<dyn SinkProvider>,
    ) -> Self {
        Self {
            interpreter: "bash".to_string(),
            script_dir: std::env::temp_dir(),
            statuser,
            streamer,
            sinks,
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_script_dir(mut self, script_dir: impl Into<PathBuf>) -> Self {
        self.script_dir = script_dir.into();
        self
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    fn script_path(&self, job: &JobRecord) -> PathBuf {
        let name = match job.id() {
            "" => format!("unnamed-{}-{}", std::process::id(), uuid::Uuid::new_v4().simple()),
            id => id.to_string(),
        };
        self.script_dir
            .join(format!("skiff-job-{}.{}", name, self.interpreter_name()))
    }

    fn interpreter_name(&self) -> &str {
        Path::new(&self.interpreter)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("sh")
    }

    /// Launches the script and waits for it or for the scope to end
    async fn execute(
        &self,
        scope: &Scope,
        script: &Path,
        output: std::io::PipeWriter,
        reporter: &mut StatusReporter<'_>,
    ) -> Result<(), RunError> {
        let stderr = output.try_clone().map_err(RunError::Pipe)?;

        let mut command = Command::new(&self.interpreter);
        command
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::from(output))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        reporter.report(State::Received, State::Started).await;

        debug!(job_id = %reporter.job.id(), interpreter = %self.interpreter, "Starting command");
        let spawned = command.spawn();
        // The command keeps copies of the pipe's write end; the stream only
        // sees end of file once they are closed
        drop(command);

        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                error!(job_id = %reporter.job.id(), "Failed to start command: {}", source);
                reporter.report(State::Started, State::Failed).await;
                return Err(RunError::Launch {
                    interpreter: self.interpreter.clone(),
                    source,
                });
            }
        };

        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = scope.done() => None,
        };

        let status = match finished {
            Some(status) => status,
            None => {
                warn!(job_id = %reporter.job.id(), "Job interrupted, killing process");
                if let Err(e) = child.start_kill() {
                    warn!(job_id = %reporter.job.id(), "Failed to kill process: {}", e);
                }
                child.wait().await
            }
        }
        .map_err(RunError::NoProcessState)?;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(RunError::NonZeroExit(code)),
            None => Err(RunError::AbnormalExit(status)),
        }
    }
}

#[async_trait]
impl Runner for ScriptRunner {
    async fn run(&self, scope: &Scope, job: JobRecord) -> Result<(), RunError> {
        let job = Arc::new(job);
        let mut reporter = StatusReporter::new(self.statuser.as_ref(), scope, &job);

        info!(job_id = %job.id(), "Starting job");
        reporter.report(State::Queued, State::Received).await;

        debug!(job_id = %job.id(), "Extracting script");
        let script = job.script().inspect_err(|e| {
            error!(job_id = %job.id(), "Failed to extract job script: {}", e);
        })?;

        let script_path = self.script_path(&job);
        debug!(job_id = %job.id(), path = %script_path.display(), len = script.len(), "Writing script");
        write_script(&script_path, &script).await?;
        let _script_file = ScriptFile(script_path.clone());

        let run_scope = match job.hard_limit() {
            Some(limit) => {
                debug!(job_id = %job.id(), ?limit, "Applying hard time limit");
                scope.with_timeout(limit)
            }
            None => scope.child(),
        };

        let Some(spec) = job.stream(STDOUTERR).cloned() else {
            error!(job_id = %job.id(), "Job has no {} stream", STDOUTERR);
            reporter.report(State::Received, State::Errored).await;
            return Err(RunError::MissingStream(STDOUTERR.to_string()));
        };

        let sink = match self.sinks.open(&job, &spec).await {
            Ok(sink) => sink,
            Err(source) => {
                error!(job_id = %job.id(), stream = %spec.name, "Failed to open stream sink: {}", source);
                reporter.report(State::Received, State::Errored).await;
                return Err(RunError::Sink {
                    stream: spec.name,
                    source,
                });
            }
        };

        let (reader, writer) = std::io::pipe().map_err(RunError::Pipe)?;
        let source = pipe::Receiver::from_owned_fd(OwnedFd::from(reader)).map_err(RunError::Pipe)?;
        let bound = BoundStream::bind(&spec, Some(Box::new(source)), Some(sink));

        debug!(job_id = %job.id(), "Starting {} streamer", STDOUTERR);
        let stream_scope = run_scope.child();
        let stream_task = {
            let streamer = self.streamer.clone();
            let scope = stream_scope.clone();
            let job = job.clone();
            tokio::spawn(async move { streamer.stream(&scope, &job, bound).await })
        };

        let outcome = self.execute(&run_scope, &script_path, writer, &mut reporter).await;

        stream_scope.cancel();
        match stream_task.await {
            Ok(Ok(())) | Ok(Err(StreamError::Cancelled(_))) => {}
            Ok(Err(e)) => warn!(job_id = %job.id(), "Output streaming failed: {}", e),
            Err(e) => warn!(job_id = %job.id(), "Streamer task failed: {}", e),
        }
        run_scope.cancel();

        match &outcome {
            Ok(()) => {
                reporter.report(State::Started, State::Passed).await;
                info!(job_id = %job.id(), "Job passed");
            }
            // Launch failures have already been reported
            Err(RunError::Launch { .. }) => {}
            Err(RunError::NonZeroExit(code)) => {
                reporter.report(State::Started, State::Failed).await;
                info!(job_id = %job.id(), code, "Job failed");
            }
            Err(e) => {
                reporter.report(State::Started, State::Errored).await;
                warn!(job_id = %job.id(), "Job errored: {}", e);
            }
        }

        outcome
    }
}

/// Fire-and-log state reporting for one run
struct StatusReporter<'a> {
    statuser: &'a dyn Statuser,
    scope: &'a Scope,
    job: &'a JobRecord,
    count: u32,
}

impl<'a> StatusReporter<'a> {
    fn new(statuser: &'a dyn Statuser, scope: &'a Scope, job: &'a JobRecord) -> Self {
        Self {
            statuser,
            scope,
            job,
            count: job.state_update_count(),
        }
    }

    async fn report(&mut self, cur: State, new: State) {
        self.count += 1;
        let update = StateUpdate::new(self.job.id(), cur, new).with_meta(STATE_UPDATE_COUNT, self.count);

        let grace;
        let scope = if self.scope.is_done() {
            debug!(job_id = %self.job.id(), %new, "Reporting state after the run was interrupted");
            grace = Scope::new().with_timeout(REPORT_GRACE);
            &grace
        } else {
            self.scope
        };

        if let Err(e) = self.statuser.status(scope, self.job, &update).await {
            warn!(
                job_id = %self.job.id(),
                %cur,
                %new,
                "Failed to set job status: {}",
                e
            );
        }
    }
}

async fn write_script(path: &Path, script: &str) -> Result<(), RunError> {
    let write = async {
        tokio::fs::write(path, script).await?;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
    };

    write.await.map_err(|source| RunError::ScriptWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Removes the script file when the run ends
struct ScriptFile(PathBuf);

impl Drop for ScriptFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            debug!(path = %self.0.display(), "Failed to remove job script: {}", e);
        }
    }
}
