//! Configuration loaded from `sesterm.toml`.
//!
//! Every field carries a default, so a missing file yields a working stub
//! deployment with no connectors registered. Relying-party sections are
//! optional: only the sections present produce configured connectors.
//! Secret values can be overridden through environment variables, which
//! take precedence over the file.

use serde::Deserialize;
use std::path::Path;

use crate::error::SestermError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SestermConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Auth0 SSO credentials. Absent means `sso` is not implemented here.
    pub sso: Option<SsoConfig>,

    /// Slack SCIM credentials.
    pub slack: Option<SlackConfig>,

    /// Google Workspace admin directory credentials.
    pub gsuite: Option<DirectoryConfig>,

    /// GCP credentials. GCP termination goes through the same directory API
    /// as Workspace, so the section has the same shape.
    pub gcp: Option<DirectoryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Whole-request timeout applied by the server.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Upper bound on a single connector invocation.
    #[serde(default = "default_connector_timeout_secs")]
    pub connector_timeout_secs: u64,

    /// Converged jobs older than this many seconds are evicted by the
    /// server's sweeper. `None` keeps jobs for the process lifetime.
    #[serde(default)]
    pub retention_secs: Option<u64>,
}

/// Credentials and endpoints for the Auth0 client-credentials flow plus the
/// session invalidation call.
#[derive(Debug, Clone, Deserialize)]
pub struct SsoConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// OAuth token endpoint, e.g. `https://tenant.auth0.com/oauth/token`.
    pub auth_url: String,
    pub audience: String,
    #[serde(default = "default_grant_type")]
    pub grant_type: String,
    /// Format string producing the Auth0 user id from the local part of the
    /// email, e.g. `ad|Example-LDAP|{}`.
    pub id_format: String,
    /// Format string producing the invalidate-remember-browser URL from the
    /// encoded user id.
    pub user_endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    /// OAuth token with the admin scope required by the SCIM API.
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_slack_lookup_endpoint")]
    pub lookup_endpoint: String,

    /// SCIM users endpoint, without a trailing slash.
    #[serde(default = "default_slack_scim_endpoint")]
    pub scim_endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Bearer token authorized against the admin directory API.
    #[serde(default)]
    pub token: String,

    /// Format string producing the user resource URL from the email.
    #[serde(default = "default_directory_users_endpoint")]
    pub users_endpoint: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connector_timeout_secs() -> u64 {
    30
}

fn default_grant_type() -> String {
    "client_credentials".to_string()
}

fn default_slack_lookup_endpoint() -> String {
    "https://slack.com/api/users.lookupByEmail".to_string()
}

fn default_slack_scim_endpoint() -> String {
    "https://api.slack.com/scim/v1/Users".to_string()
}

fn default_directory_users_endpoint() -> String {
    "https://www.googleapis.com/admin/directory/v1/users/{}".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            connector_timeout_secs: default_connector_timeout_secs(),
            retention_secs: None,
        }
    }
}

impl SestermConfig {
    /// Load configuration from the given path, falling back to defaults when
    /// the file does not exist, then apply environment overrides. Fails fast
    /// on malformed format strings rather than at the first termination.
    pub fn load(path: &Path) -> Result<Self, SestermError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<SestermConfig>(&contents)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), SestermError> {
        let mut format_strings = Vec::new();
        if let Some(sso) = &self.sso {
            format_strings.push(("sso.id_format", sso.id_format.as_str()));
            format_strings.push(("sso.user_endpoint", sso.user_endpoint.as_str()));
        }
        if let Some(gsuite) = &self.gsuite {
            format_strings.push(("gsuite.users_endpoint", gsuite.users_endpoint.as_str()));
        }
        if let Some(gcp) = &self.gcp {
            format_strings.push(("gcp.users_endpoint", gcp.users_endpoint.as_str()));
        }

        for (key, value) in format_strings {
            if !value.contains("{}") {
                return Err(SestermError::Config(format!(
                    "{key} must contain a {{}} placeholder",
                )));
            }
        }

        Ok(())
    }

    // Secrets are deployed through the environment in preference to the
    // config file.
    fn apply_env_overrides(&mut self) {
        if let Some(sso) = &mut self.sso
            && let Ok(secret) = std::env::var("SESTERM_SSO_CLIENT_SECRET")
            && !secret.is_empty()
        {
            sso.client_secret = secret;
        }

        if let Some(slack) = &mut self.slack
            && let Ok(token) = std::env::var("SESTERM_SLACK_TOKEN")
            && !token.is_empty()
        {
            slack.token = token;
        }

        if let Some(gsuite) = &mut self.gsuite
            && let Ok(token) = std::env::var("SESTERM_GSUITE_TOKEN")
            && !token.is_empty()
        {
            gsuite.token = token;
        }

        if let Some(gcp) = &mut self.gcp
            && let Ok(token) = std::env::var("SESTERM_GCP_TOKEN")
            && !token.is_empty()
        {
            gcp.token = token;
        }
    }
}
