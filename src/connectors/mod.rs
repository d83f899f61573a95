pub mod directory;
pub mod slack;
pub mod sso;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::SestermConfig;
use crate::error::ConnectorError;
use crate::job::{RelyingParty, TargetResult};

pub use directory::DirectoryConnector;
pub use slack::SlackConnector;
pub use sso::SsoConnector;

/// One integration against an external relying party.
///
/// Implementations must be safe to invoke concurrently for different
/// usernames and must not hold the caller past the dispatcher's timeout
/// bound; the bundled connectors additionally carry their own HTTP client
/// timeouts.
#[async_trait]
pub trait RelyingPartyConnector: Send + Sync {
    /// The relying party this connector terminates sessions for.
    fn target(&self) -> RelyingParty;

    /// Terminate every session `username` holds with this relying party.
    ///
    /// Recoverable integration failures are reported through the returned
    /// [`TargetResult`]; an `Err` is converted by the dispatcher into an
    /// `error` result for the affected pair.
    async fn terminate(&self, username: &str) -> Result<TargetResult, ConnectorError>;
}

/// Capability map from relying party to the connector serving it.
///
/// Built once at startup from configuration. Parties without a registered
/// connector resolve to `not_implemented` at submit time, without any
/// connector call.
pub struct ConnectorRegistry {
    connectors: HashMap<RelyingParty, Arc<dyn RelyingPartyConnector>>,
}

impl ConnectorRegistry {
    pub fn empty() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Register connectors for every relying-party section present in the
    /// configuration.
    pub fn from_config(config: &SestermConfig) -> Self {
        let mut registry = Self::empty();

        if let Some(sso) = &config.sso {
            registry.register(Arc::new(SsoConnector::new(sso.clone())));
        }
        if let Some(slack) = &config.slack {
            registry.register(Arc::new(SlackConnector::new(slack.clone())));
        }
        if let Some(gsuite) = &config.gsuite {
            registry.register(Arc::new(DirectoryConnector::new(
                RelyingParty::Gsuite,
                gsuite.clone(),
            )));
        }
        if let Some(gcp) = &config.gcp {
            registry.register(Arc::new(DirectoryConnector::new(
                RelyingParty::Gcp,
                gcp.clone(),
            )));
        }

        registry
    }

    pub fn register(&mut self, connector: Arc<dyn RelyingPartyConnector>) {
        self.connectors.insert(connector.target(), connector);
    }

    pub fn get(&self, target: RelyingParty) -> Option<Arc<dyn RelyingPartyConnector>> {
        self.connectors.get(&target).cloned()
    }

    pub fn is_implemented(&self, target: RelyingParty) -> bool {
        self.connectors.contains_key(&target)
    }
}

/// Shared reqwest client settings for all connectors.
pub(crate) fn http_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client")
}

/// Substitute `value` into the first `{}` placeholder of a configured
/// format string.
pub(crate) fn fill(format: &str, value: &str) -> String {
    format.replacen("{}", value, 1)
}
