//! Job board endpoints

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, FROM};
use skiff_core::JobRecord;
use skiff_core::dto::job::PopResponse;
use tracing::debug;

use crate::JobBoardClient;
use crate::error::{ClientError, Result};

impl JobBoardClient {
    // =============================================================================
    // Job Claiming
    // =============================================================================

    /// Claim the next available job
    ///
    /// Returns [`ClientError::NoJobAvailable`] when the board answers `204 No
    /// Content`. That is a normal polling outcome and callers should retry later.
    pub async fn pop_job(&self) -> Result<u64> {
        let url = format!("{}/jobs/pop", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(FROM, &self.processor_id)
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Err(ClientError::NoJobAvailable);
        }

        let popped: PopResponse = self.handle_response(response).await?;

        popped.parse_job_id().map_err(|e| {
            ClientError::ParseError(format!("invalid job id {:?}: {}", popped.job_id, e))
        })
    }

    /// Fetch the raw payload of a claimed job
    ///
    /// Anything but `200 OK` is retried with the client's backoff policy; the
    /// last error is returned once the policy gives up.
    pub async fn fetch_job(&self, job_id: u64) -> Result<Vec<u8>> {
        let url = format!("{}/jobs/{}", self.base_url, job_id);

        self.fetch_backoff
            .retry(|| self.fetch_job_once(&url, job_id))
            .await
    }

    async fn fetch_job_once(&self, url: &str, job_id: u64) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(FROM, &self.processor_id)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            debug!(
                job_id,
                expected_status = StatusCode::OK.as_u16(),
                actual_status = status.as_u16(),
                "Job fetch failed"
            );
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api_error(status.as_u16(), body));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Claim a job and fetch its decoded record
    pub async fn claim_next(&self) -> Result<JobRecord> {
        let job_id = self.pop_job().await?;
        debug!(job_id, "Claimed job");

        let payload = self.fetch_job(job_id).await?;
        Ok(JobRecord::from_slice(&payload)?)
    }
}
