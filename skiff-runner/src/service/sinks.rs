//! Stream sinks
//!
//! Destinations for a job's output stream. The runner asks a
//! [`SinkProvider`] for the sink of each declared stream right before the
//! script is launched:
//! - `-` (or no destination): the agent's own stdout
//! - `file://<path>` or a plain path: appended to that file
//! - the `stdouterr` stream of a job with an http(s) `log_parts_url`: posted
//!   to that URL as numbered log parts

use async_trait::async_trait;
use skiff_client::CallbackClient;
use skiff_core::dto::log::LogPart;
use skiff_core::{JobRecord, STDOUTERR, StreamSpec};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, Stdout};
use tracing::{debug, warn};

/// Receiving end of a bound stream
#[async_trait]
pub trait StreamSink: Send {
    /// Delivers one chunk of output
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Flushes and closes the sink; called once after the last chunk
    async fn finish(&mut self) -> io::Result<()>;
}

/// Opens the sink for a stream of a job
#[async_trait]
pub trait SinkProvider: Send + Sync {
    async fn open(&self, job: &JobRecord, spec: &StreamSpec) -> io::Result<Box<dyn StreamSink>>;
}

/// Writes to the agent's stdout
pub struct StdoutSink {
    out: Stdout,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: tokio::io::stdout(),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamSink for StdoutSink {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.out.write_all(chunk).await?;
        self.out.flush().await
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.out.flush().await
    }
}

/// Appends to a file, creating it when missing
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path, file })
    }
}

#[async_trait]
impl StreamSink for FileSink {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await
    }

    async fn finish(&mut self) -> io::Result<()> {
        debug!(path = %self.path.display(), "Closing file sink");
        self.file.flush().await?;
        self.file.sync_all().await
    }
}

/// Posts output to the job's log-parts endpoint
///
/// Every chunk becomes one numbered part. Delivery failures are logged and
/// skipped so a flaky log endpoint never stalls the job.
pub struct LogPartsSink {
    callbacks: CallbackClient,
    url: String,
    jwt: String,
    job_id: String,
    next_number: u64,
}

impl LogPartsSink {
    pub fn new(callbacks: CallbackClient, job: &JobRecord) -> Self {
        Self {
            callbacks,
            url: job.log_parts_url().to_string(),
            jwt: job.jwt().to_string(),
            job_id: job.id().to_string(),
            next_number: 0,
        }
    }

    async fn send(&mut self, log: String, is_final: bool) {
        let part = LogPart {
            id: self.job_id.clone(),
            log,
            number: self.next_number,
            is_final,
        };
        self.next_number += 1;

        if let Err(e) = self.callbacks.post_log_part(&self.url, &self.jwt, &part).await {
            warn!(
                job_id = %self.job_id,
                number = part.number,
                "Failed to send log part: {}",
                e
            );
        }
    }
}

#[async_trait]
impl StreamSink for LogPartsSink {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let log = String::from_utf8_lossy(chunk).into_owned();
        self.send(log, false).await;
        Ok(())
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.send(String::new(), true).await;
        Ok(())
    }
}

/// Picks a sink from the stream's destination
#[derive(Debug, Clone, Default)]
pub struct DestinationSinks {
    callbacks: CallbackClient,
}

impl DestinationSinks {
    pub fn new(callbacks: CallbackClient) -> Self {
        Self { callbacks }
    }
}

#[async_trait]
impl SinkProvider for DestinationSinks {
    async fn open(&self, job: &JobRecord, spec: &StreamSpec) -> io::Result<Box<dyn StreamSink>> {
        let log_parts_url = job.log_parts_url();
        if spec.name == STDOUTERR
            && (log_parts_url.starts_with("http://") || log_parts_url.starts_with("https://"))
        {
            debug!(job_id = %job.id(), stream = %spec.name, "Streaming to log parts endpoint");
            return Ok(Box::new(LogPartsSink::new(self.callbacks.clone(), job)));
        }

        if spec.is_stdout() {
            return Ok(Box::new(StdoutSink::new()));
        }

        let path = spec
            .destination
            .strip_prefix("file://")
            .unwrap_or(&spec.destination);
        debug!(job_id = %job.id(), stream = %spec.name, path, "Streaming to file");
        Ok(Box::new(FileSink::open(path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn job(log_parts_url: &str) -> JobRecord {
        JobRecord::from_value(json!({
            "version": 1,
            "data": {"job": {"id": 5}},
            "log_parts_url": log_parts_url,
            "jwt": "jwt-5",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        std::fs::write(&path, "before\n").unwrap();

        let mut sink = FileSink::open(&path).await.unwrap();
        sink.write_chunk(b"one\n").await.unwrap();
        sink.write_chunk(b"two\n").await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "before\none\ntwo\n");
    }

    #[tokio::test]
    async fn test_provider_opens_file_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.log");
        let spec = StreamSpec::new("extra", format!("file://{}", path.display()));

        let mut sink = DestinationSinks::default()
            .open(&job(""), &spec)
            .await
            .unwrap();
        sink.write_chunk(b"hello").await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_log_parts_sink_numbers_parts_and_sends_final() {
        type Parts = Arc<Mutex<Vec<serde_json::Value>>>;
        let parts: Parts = Arc::default();
        let app = Router::new()
            .route(
                "/parts",
                post(
                    |State(parts): State<Parts>, Json(body): Json<serde_json::Value>| async move {
                        parts.lock().unwrap().push(body);
                        StatusCode::NO_CONTENT
                    },
                ),
            )
            .with_state(parts.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let job = job(&format!("http://{}/parts", addr));
        let mut sink = DestinationSinks::default()
            .open(&job, &StreamSpec::stdouterr())
            .await
            .unwrap();
        sink.write_chunk(b"line 1\n").await.unwrap();
        sink.write_chunk(b"line 2\n").await.unwrap();
        sink.finish().await.unwrap();

        let parts = parts.lock().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[0],
            json!({"id": "5", "log": "line 1\n", "number": 0, "final": false})
        );
        assert_eq!(parts[1]["number"], 1);
        assert_eq!(parts[2], json!({"id": "5", "log": "", "number": 2, "final": true}));
    }

    #[tokio::test]
    async fn test_log_parts_failures_do_not_stop_streaming() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut sink = LogPartsSink::new(
            CallbackClient::new(),
            &job(&format!("http://{}/parts", addr)),
        );

        assert!(sink.write_chunk(b"lost").await.is_ok());
        assert!(sink.finish().await.is_ok());
    }
}
