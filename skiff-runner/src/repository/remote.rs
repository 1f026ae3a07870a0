//! Job board source

use async_trait::async_trait;
use skiff_client::JobBoardClient;
use skiff_core::JobRecord;
use tracing::debug;

use crate::repository::{JobSource, SourceError};
use crate::scope::Scope;

/// Claims jobs from the remote job board
///
/// Each fetch pops a job id and then downloads its payload, retrying the
/// download with backoff while the board is not ready to serve it.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    client: JobBoardClient,
}

impl RemoteSource {
    pub fn new(base_url: &str, processor_id: &str) -> Self {
        Self::with_client(JobBoardClient::new(base_url, processor_id))
    }

    pub fn with_client(client: JobBoardClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobSource for RemoteSource {
    async fn fetch(&self, scope: &Scope) -> Result<JobRecord, SourceError> {
        debug!(base_url = %self.client.base_url(), "Popping job from job board");
        let job = scope.run(self.client.claim_next()).await??;
        Ok(job)
    }
}
