//! Per-job callback endpoints
//!
//! A job payload carries its own callback URLs and a JWT. These calls are
//! authenticated with that token rather than with the agent's identity.

use reqwest::{Client, StatusCode};
use skiff_core::dto::log::LogPart;
use skiff_core::dto::state::StateUpdateBody;

use crate::error::{ClientError, Result};

/// HTTP client for job state and log-part callbacks
#[derive(Debug, Clone, Default)]
pub struct CallbackClient {
    client: Client,
}

impl CallbackClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Report a state transition
    ///
    /// Only `200 OK` counts as success.
    pub async fn patch_state(&self, url: &str, jwt: &str, body: &StateUpdateBody) -> Result<()> {
        let response = self
            .client
            .patch(url)
            .bearer_auth(jwt)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::api_error(status.as_u16(), message));
        }

        Ok(())
    }

    /// Send one chunk of job output
    pub async fn post_log_part(&self, url: &str, jwt: &str, part: &LogPart) -> Result<()> {
        let response = self
            .client
            .post(url)
            .bearer_auth(jwt)
            .json(part)
            .send()
            .await?;

        crate::error_for_status(response).await?;
        Ok(())
    }
}
