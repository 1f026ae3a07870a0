//! Skiff HTTP Client
//!
//! HTTP plumbing for the Skiff job agent:
//! - [`JobBoardClient`]: claims jobs from the job board (`POST /jobs/pop`) and
//!   fetches their payloads (`GET /jobs/{id}`) with exponential backoff
//! - [`CallbackClient`]: talks to the per-job callback URLs carried in the
//!   payload (state updates and log parts), authenticated with the job's JWT
//!
//! # Example
//!
//! ```no_run
//! use skiff_client::JobBoardClient;
//!
//! #[tokio::main]
//! async fn main() -> skiff_client::Result<()> {
//!     let board = JobBoardClient::new("http://localhost:9090", "agent-1@42.localhost");
//!
//!     let job = board.claim_next().await?;
//!     println!("Claimed job {}", job.id());
//!     Ok(())
//! }
//! ```

pub mod backoff;
mod callbacks;
pub mod error;
mod jobs;

// Re-export commonly used types
pub use backoff::ExponentialBackoff;
pub use callbacks::CallbackClient;
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the job board
#[derive(Debug, Clone)]
pub struct JobBoardClient {
    /// Base URL of the job board (e.g., "http://localhost:9090")
    base_url: String,
    /// Value of the `From` header identifying this agent
    processor_id: String,
    /// Retry policy for fetching a claimed job
    fetch_backoff: ExponentialBackoff,
    /// HTTP client instance
    client: Client,
}

impl JobBoardClient {
    /// Create a new job board client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the job board
    /// * `processor_id` - Identifier sent in the `From` header of every request
    pub fn new(base_url: impl Into<String>, processor_id: impl Into<String>) -> Self {
        Self::with_client(base_url, processor_id, Client::new())
    }

    /// Create a new job board client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(
        base_url: impl Into<String>,
        processor_id: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            processor_id: processor_id.into(),
            fetch_backoff: ExponentialBackoff::job_fetch(),
            client,
        }
    }

    /// Replace the retry policy used by [`fetch_job`](Self::fetch_job)
    pub fn with_fetch_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.fetch_backoff = backoff;
        self
    }

    /// Get the base URL of the job board
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn processor_id(&self) -> &str {
        &self.processor_id
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = error_for_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Turn any non-success status into an [`ClientError::ApiError`]
pub(crate) async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(response)
}
