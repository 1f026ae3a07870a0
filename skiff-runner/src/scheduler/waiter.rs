//! Job waiter
//!
//! Polls a job source until a job shows up or the wait deadline passes, then
//! runs that job. A waiter handles exactly one job per call.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::repository::JobSource;
use crate::scope::{Cancelled, Scope};
use crate::service::{RunError, Runner};

#[async_trait]
pub trait Waiter: Send + Sync {
    /// Waits for one job and runs it
    async fn wait(&self, scope: &Scope) -> Result<(), WaitError>;
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("gave up waiting for a job: {0}")]
    Cancelled(Cancelled),

    #[error(transparent)]
    Run(#[from] RunError),
}

/// Waiter that retries the source at a fixed interval
pub struct FetchRetryWaiter {
    source: Arc<dyn JobSource>,
    runner: Arc<dyn Runner>,
    interval: Duration,
    max_wait: Duration,
}

impl FetchRetryWaiter {
    /// Creates a new waiter
    ///
    /// # Arguments
    /// * `source` - Where jobs come from
    /// * `runner` - Runs the acquired job
    /// * `interval` - Pause between fetch attempts
    /// * `max_wait` - Overall time budget for acquiring a job
    pub fn new(
        source: Arc<dyn JobSource>,
        runner: Arc<dyn Runner>,
        interval: Duration,
        max_wait: Duration,
    ) -> Self {
        Self {
            source,
            runner,
            interval,
            max_wait,
        }
    }
}

#[async_trait]
impl Waiter for FetchRetryWaiter {
    async fn wait(&self, scope: &Scope) -> Result<(), WaitError> {
        let wait_scope = scope.with_timeout(self.max_wait);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.source.fetch(&wait_scope).await {
                Ok(job) => {
                    info!(job_id = %job.id(), attempt, "Acquired job");
                    // The job runs under the caller's scope, free of the wait deadline
                    self.runner.run(scope, job).await?;
                    return Ok(());
                }
                Err(e) if e.is_no_job_available() => {
                    debug!(attempt, "No job available");
                }
                Err(e) => {
                    debug!(attempt, "Failed to fetch job: {}", e);
                }
            }

            if let Some(reason) = wait_scope.reason() {
                return Err(WaitError::Cancelled(reason));
            }

            debug!(attempt, interval = ?self.interval, "Sleeping before next fetch");
            wait_scope
                .sleep(self.interval)
                .await
                .map_err(WaitError::Cancelled)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SourceError;
    use serde_json::json;
    use skiff_core::JobRecord;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Source that replays scripted results, then reports no job forever
    #[derive(Default)]
    struct ScriptedSource {
        results: Mutex<VecDeque<Result<JobRecord, SourceError>>>,
        fetches: Mutex<Vec<Duration>>,
        started: Mutex<Option<Instant>>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<JobRecord, SourceError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                ..Self::default()
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl JobSource for ScriptedSource {
        async fn fetch(&self, _scope: &Scope) -> Result<JobRecord, SourceError> {
            let started = *self.started.lock().unwrap().get_or_insert_with(Instant::now);
            self.fetches.lock().unwrap().push(started.elapsed());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(SourceError::NoJobAvailable))
        }
    }

    #[derive(Default)]
    struct RecordingRunner {
        ran: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Runner for RecordingRunner {
        async fn run(&self, _scope: &Scope, job: JobRecord) -> Result<(), RunError> {
            self.ran.lock().unwrap().push(job.id().to_string());
            if self.fail {
                return Err(RunError::NonZeroExit(2));
            }
            Ok(())
        }
    }

    fn job(id: u64) -> JobRecord {
        JobRecord::from_value(json!({"version": 1, "data": {"job": {"id": id}}})).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_source_times_out() {
        let source = Arc::new(ScriptedSource::default());
        let runner = Arc::new(RecordingRunner::default());
        let waiter = FetchRetryWaiter::new(
            source.clone(),
            runner.clone(),
            Duration::from_secs(3),
            Duration::from_secs(10),
        );

        let err = waiter.wait(&Scope::new()).await.unwrap_err();

        assert!(matches!(err, WaitError::Cancelled(Cancelled::DeadlineExceeded)), "{err}");
        // Fetches at 0s, 3s, 6s and 9s; the sleep after the last one hits the deadline
        assert_eq!(source.fetch_count(), 4);
        assert!(runner.ran.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_first_job_after_retries() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(SourceError::NoJobAvailable),
            Err(SourceError::InvalidUrl {
                url: "x".into(),
                reason: "transient".into(),
            }),
            Ok(job(17)),
            Ok(job(18)),
        ]));
        let runner = Arc::new(RecordingRunner::default());
        let waiter = FetchRetryWaiter::new(
            source.clone(),
            runner.clone(),
            Duration::from_secs(3),
            Duration::from_secs(60),
        );

        waiter.wait(&Scope::new()).await.unwrap();

        assert_eq!(*runner.ran.lock().unwrap(), vec!["17".to_string()]);
        let fetches = source.fetches.lock().unwrap();
        assert_eq!(fetches.len(), 3);
        assert!(fetches[2] >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_stops_waiting() {
        let source = Arc::new(ScriptedSource::default());
        let runner = Arc::new(RecordingRunner::default());
        let waiter = FetchRetryWaiter::new(
            source,
            runner.clone(),
            Duration::from_secs(3),
            Duration::from_secs(600),
        );

        let scope = Scope::new();
        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let err = waiter.wait(&scope).await.unwrap_err();

        assert!(matches!(err, WaitError::Cancelled(Cancelled::Canceled)), "{err}");
        assert!(runner.ran.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_error_is_returned() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(job(1))]));
        let runner = Arc::new(RecordingRunner {
            fail: true,
            ..RecordingRunner::default()
        });
        let waiter = FetchRetryWaiter::new(
            source,
            runner,
            Duration::from_secs(1),
            Duration::from_secs(10),
        );

        let err = waiter.wait(&Scope::new()).await.unwrap_err();

        assert!(matches!(err, WaitError::Run(RunError::NonZeroExit(2))), "{err}");
    }
}
