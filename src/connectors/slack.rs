//! Slack connector.
//!
//! Slack has no direct "kill sessions" call; the SCIM API signs a user out
//! of every client by deactivating the account and immediately reactivating
//! it. The user id is resolved first through `users.lookupByEmail`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::SlackConfig;
use crate::error::ConnectorError;
use crate::job::{RelyingParty, TargetResult};

use super::{RelyingPartyConnector, http_client};

const SCIM_SCHEMA: &str = "urn:scim:schemas:core:1.0";

#[derive(Debug, Deserialize)]
struct LookupResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<LookupUser>,
}

#[derive(Debug, Deserialize)]
struct LookupUser {
    id: String,
}

pub struct SlackConnector {
    config: SlackConfig,
    client: Client,
}

impl SlackConnector {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            config,
            client: http_client(),
        }
    }

    async fn set_active(&self, update_url: &str, active: bool) -> Result<u16, reqwest::Error> {
        let response = self
            .client
            .patch(update_url)
            .bearer_auth(&self.config.token)
            .json(&serde_json::json!({
                "schemas": [SCIM_SCHEMA],
                "active": active,
            }))
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl RelyingPartyConnector for SlackConnector {
    fn target(&self) -> RelyingParty {
        RelyingParty::Slack
    }

    async fn terminate(&self, username: &str) -> Result<TargetResult, ConnectorError> {
        let err_msg = format!("Failed to terminate Slack session for {username}");

        let lookup = self
            .client
            .post(&self.config.lookup_endpoint)
            .bearer_auth(&self.config.token)
            .form(&[("email", username)])
            .send()
            .await;

        let lookup: LookupResponse = match lookup {
            Ok(response) => match response.json().await {
                Ok(body) => body,
                Err(_) => {
                    return Ok(TargetResult::error(format!(
                        "{err_msg}: Could not find user in Slack",
                    )));
                }
            },
            Err(_) => {
                return Ok(TargetResult::error(format!(
                    "{err_msg}: Could not find user in Slack",
                )));
            }
        };

        if !lookup.ok {
            let reason = lookup.error.unwrap_or_else(|| "unknown".to_string());
            return Ok(TargetResult::error(format!(
                "{err_msg}: Error from Slack: {reason}",
            )));
        }

        let Some(user) = lookup.user else {
            return Ok(TargetResult::error(format!(
                "{err_msg}: Could not find user in Slack",
            )));
        };

        let update_url = format!("{}/{}", self.config.scim_endpoint, user.id);

        let status = match self.set_active(&update_url, false).await {
            Ok(status) => status,
            Err(_) => return Ok(TargetResult::error(err_msg)),
        };
        if status >= 300 {
            return Ok(TargetResult::error(format!(
                "{err_msg}: Could not deactivate: Status {status}",
            )));
        }

        let status = match self.set_active(&update_url, true).await {
            Ok(status) => status,
            Err(_) => return Ok(TargetResult::error(err_msg)),
        };
        if status >= 300 {
            // The account is now signed out but also locked out.
            return Ok(TargetResult::error(format!(
                "{err_msg}: Could not reactivate: Status {status}. The Slack account owned \
                 by {username} has been deactivated; have a Slack admin reactivate it within \
                 five (5) days.",
            )));
        }

        Ok(TargetResult::terminated())
    }
}
