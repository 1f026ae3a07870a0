//! Job source capability and scheme dispatch

use async_trait::async_trait;
use reqwest::Url;
use skiff_client::ClientError;
use skiff_core::{DecodeError, JobRecord};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::repository::{LocalSource, RemoteSource};
use crate::scope::{Cancelled, Scope};

/// Something that can produce the next job
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Acquires the next job
    ///
    /// [`SourceError::NoJobAvailable`] is a normal outcome meaning "try again later".
    async fn fetch(&self, scope: &Scope) -> Result<JobRecord, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no jobs available")]
    NoJobAvailable,

    #[error("invalid job URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to read job payload from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode job payload: {0}")]
    Decode(#[from] DecodeError),

    #[error("job board unreachable: {0}")]
    Transport(#[source] ClientError),

    #[error("unexpected job board response: {0}")]
    Protocol(#[source] ClientError),

    #[error("job fetch interrupted: {0}")]
    Cancelled(#[from] Cancelled),
}

impl SourceError {
    pub fn is_no_job_available(&self) -> bool {
        matches!(self, Self::NoJobAvailable)
    }
}

impl From<ClientError> for SourceError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NoJobAvailable => Self::NoJobAvailable,
            ClientError::Decode(e) => Self::Decode(e),
            ClientError::RequestFailed(_) => Self::Transport(err),
            ClientError::ApiError { .. } | ClientError::ParseError(_) => Self::Protocol(err),
        }
    }
}

/// Source for URL schemes the agent does not know
///
/// It never has a job. Unknown schemes are treated as "nothing to do" rather
/// than as a configuration error.
#[derive(Debug, Clone, Default)]
pub struct NullSource {
    scheme: String,
}

#[async_trait]
impl JobSource for NullSource {
    async fn fetch(&self, _scope: &Scope) -> Result<JobRecord, SourceError> {
        debug!(scheme = %self.scheme, "No job source for scheme");
        Err(SourceError::NoJobAvailable)
    }
}

/// Builds the source for a job URL
///
/// - `-` reads one payload from stdin
/// - `file://<path>` reads a local payload (`file://-` is stdin as well)
/// - `http://` and `https://` claim jobs from the job board at that base URL
/// - anything else yields a [`NullSource`]
pub fn source_for_url(url: &str, processor_id: &str) -> Result<Arc<dyn JobSource>, SourceError> {
    if url == "-" {
        return Ok(Arc::new(LocalSource::stdin()));
    }

    if let Some(path) = url.strip_prefix("file://") {
        if path.is_empty() {
            return Err(SourceError::InvalidUrl {
                url: url.to_string(),
                reason: "missing path".to_string(),
            });
        }
        return Ok(Arc::new(LocalSource::new(PathBuf::from(path))));
    }

    let parsed = Url::parse(url).map_err(|e| SourceError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(Arc::new(RemoteSource::new(url, processor_id))),
        other => Ok(Arc::new(NullSource {
            scheme: other.to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_url_uses_local_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        tokio::fs::write(&path, br#"{"version": 1, "data": {"job": {"id": 8}}}"#)
            .await
            .unwrap();

        let source = source_for_url(&format!("file://{}", path.display()), "me").unwrap();
        let job = source.fetch(&Scope::new()).await.unwrap();

        assert_eq!(job.id(), "8");
    }

    #[tokio::test]
    async fn test_unknown_scheme_has_no_job() {
        let source = source_for_url("gopher://jobs.example", "me").unwrap();
        let err = source.fetch(&Scope::new()).await.unwrap_err();

        assert!(err.is_no_job_available());
    }

    #[test]
    fn test_invalid_urls() {
        assert!(matches!(
            source_for_url("not a url", "me").err(),
            Some(SourceError::InvalidUrl { .. })
        ));
        assert!(matches!(
            source_for_url("file://", "me").err(),
            Some(SourceError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_client_error_mapping() {
        assert!(SourceError::from(ClientError::NoJobAvailable).is_no_job_available());
        assert!(matches!(
            SourceError::from(ClientError::api_error(500, "down")),
            SourceError::Protocol(_)
        ));
        assert!(matches!(
            SourceError::from(ClientError::ParseError("bad".into())),
            SourceError::Protocol(_)
        ));
    }
}
