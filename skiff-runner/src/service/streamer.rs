//! Output streaming
//!
//! Relays a running job's output from its source (the read end of the
//! script's stdout/stderr pipe) to a sink. Streaming is driven by the scope,
//! not by the source: reaching end of file only pauses the copy loop, and the
//! stream ends once the scope is done.

use async_trait::async_trait;
use skiff_core::{JobRecord, StreamSpec};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tracing::debug;

use crate::scope::{Cancelled, Scope};
use crate::service::StreamSink;

/// Pause between reads once the source is at end of file
const IDLE_PAUSE: Duration = Duration::from_millis(10);

/// How long buffered output is still copied after the scope is done
const DRAIN_GRACE: Duration = Duration::from_millis(250);

const CHUNK_SIZE: usize = 8 * 1024;

pub type StreamSource = Box<dyn AsyncRead + Send + Unpin>;

/// A stream descriptor wired to its live ends
///
/// Built once by the runner right before launch and consumed by the streamer.
pub struct BoundStream {
    pub name: String,
    source: Option<StreamSource>,
    sink: Option<Box<dyn StreamSink>>,
}

impl BoundStream {
    pub fn bind(
        spec: &StreamSpec,
        source: Option<StreamSource>,
        sink: Option<Box<dyn StreamSink>>,
    ) -> Self {
        Self {
            name: spec.name.clone(),
            source,
            sink,
        }
    }

    pub fn into_parts(self) -> (String, Option<StreamSource>, Option<Box<dyn StreamSink>>) {
        (self.name, self.source, self.sink)
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream {0:?} is not wired")]
    Wiring(String),

    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream ended: {0}")]
    Cancelled(Cancelled),
}

/// Service trait for relaying one bound stream
#[async_trait]
pub trait Streamer: Send + Sync {
    /// Copies until the scope is done
    ///
    /// A stream that ran to completion returns [`StreamError::Cancelled`]
    /// with the scope's reason.
    async fn stream(
        &self,
        scope: &Scope,
        job: &JobRecord,
        stream: BoundStream,
    ) -> Result<(), StreamError>;
}

/// Streamer that copies chunks from source to sink
#[derive(Debug, Clone, Default)]
pub struct CopyStreamer;

impl CopyStreamer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Streamer for CopyStreamer {
    async fn stream(
        &self,
        scope: &Scope,
        job: &JobRecord,
        stream: BoundStream,
    ) -> Result<(), StreamError> {
        let (name, source, sink) = stream.into_parts();
        let (Some(mut source), Some(mut sink)) = (source, sink) else {
            return Err(StreamError::Wiring(name));
        };

        debug!(job_id = %job.id(), stream = %name, "Streaming output");

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut copied: u64 = 0;
        let mut at_eof = false;

        let reason = loop {
            if at_eof {
                if let Err(reason) = scope.sleep(IDLE_PAUSE).await {
                    break reason;
                }
            }

            let read = tokio::select! {
                biased;
                reason = scope.done() => break reason,
                read = source.read(&mut buf) => read?,
            };

            at_eof = read == 0;
            if read > 0 {
                sink.write_chunk(&buf[..read]).await?;
                copied += read as u64;
            }
        };

        // Pick up output that was already written when the scope ended
        let grace = Instant::now() + DRAIN_GRACE;
        while let Ok(Ok(read)) = tokio::time::timeout_at(grace, source.read(&mut buf)).await {
            if read == 0 {
                break;
            }
            sink.write_chunk(&buf[..read]).await?;
            copied += read as u64;
        }

        sink.finish().await?;
        debug!(job_id = %job.id(), stream = %name, copied, %reason, "Stream closed");

        Err(StreamError::Cancelled(reason))
    }
}
