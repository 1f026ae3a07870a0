//! Local payload source

use async_trait::async_trait;
use skiff_core::JobRecord;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::repository::{JobSource, SourceError};
use crate::scope::Scope;

/// Reads a job payload from a file, or from stdin when the path is `-`
#[derive(Debug, Clone)]
pub struct LocalSource {
    path: PathBuf,
}

impl LocalSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn stdin() -> Self {
        Self::new("-")
    }

    fn is_stdin(&self) -> bool {
        self.path.as_os_str() == "-"
    }

    async fn read(&self) -> Result<Vec<u8>, SourceError> {
        if self.is_stdin() {
            let mut bytes = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut bytes)
                .await
                .map_err(|source| SourceError::Io {
                    path: "<stdin>".to_string(),
                    source,
                })?;
            return Ok(bytes);
        }

        let path = std::path::absolute(&self.path).map_err(|source| SourceError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        tokio::fs::read(&path).await.map_err(|source| SourceError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[async_trait]
impl JobSource for LocalSource {
    async fn fetch(&self, scope: &Scope) -> Result<JobRecord, SourceError> {
        debug!(path = %self.path.display(), "Reading job payload");
        let bytes = scope.run(self.read()).await??;
        Ok(JobRecord::from_slice(&bytes)?)
    }
}
