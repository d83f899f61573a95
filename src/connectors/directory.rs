//! Google admin directory connector, used for both Workspace and GCP.
//!
//! The directory API invalidates a user's sign-in cookies as a side effect
//! of requiring a password change, so termination toggles
//! `changePasswordAtNextLogin` on and immediately back off. Each PATCH
//! response must echo the value it set; anything else is a failure.

use async_trait::async_trait;
use reqwest::Client;

use crate::config::DirectoryConfig;
use crate::error::ConnectorError;
use crate::job::{RelyingParty, TargetResult};

use super::{RelyingPartyConnector, fill, http_client};

pub struct DirectoryConnector {
    target: RelyingParty,
    config: DirectoryConfig,
    client: Client,
}

impl DirectoryConnector {
    /// `target` is `Gsuite` or `Gcp`; GCP sessions are governed by the same
    /// directory account, so both go through this connector.
    pub fn new(target: RelyingParty, config: DirectoryConfig) -> Self {
        Self {
            target,
            config,
            client: http_client(),
        }
    }
}

#[async_trait]
impl RelyingPartyConnector for DirectoryConnector {
    fn target(&self) -> RelyingParty {
        self.target
    }

    async fn terminate(&self, username: &str) -> Result<TargetResult, ConnectorError> {
        let err_msg = format!(
            "Failed to terminate {} session for {username}",
            self.target,
        );
        let url = fill(&self.config.users_endpoint, username);

        for flag in [true, false] {
            let response = self
                .client
                .patch(&url)
                .bearer_auth(&self.config.token)
                .json(&serde_json::json!({ "changePasswordAtNextLogin": flag }))
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(_) => return Ok(TargetResult::error(err_msg)),
            };

            let status = response.status();
            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                return Err(ConnectorError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let body: serde_json::Value = match response.json().await {
                Ok(body) => body,
                Err(_) => return Ok(TargetResult::error(err_msg)),
            };
            if body
                .get("changePasswordAtNextLogin")
                .and_then(serde_json::Value::as_bool)
                != Some(flag)
            {
                return Ok(TargetResult::error(err_msg));
            }
        }

        Ok(TargetResult::terminated())
    }
}
