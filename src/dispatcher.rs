use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::connectors::{ConnectorRegistry, RelyingPartyConnector};
use crate::error::{ConnectorError, SestermError};
use crate::job::{JobStore, RelyingParty, TargetResult};

/// Accepts termination requests, fans work out to the configured
/// connectors, and records results into the [`JobStore`] as they arrive.
pub struct Dispatcher {
    store: Arc<JobStore>,
    connectors: Arc<ConnectorRegistry>,
    connector_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<JobStore>,
        connectors: Arc<ConnectorRegistry>,
        connector_timeout: Duration,
    ) -> Self {
        Self {
            store,
            connectors,
            connector_timeout,
        }
    }

    /// Create a job covering every (username, target) pair and start one
    /// termination task per pair that has a registered connector.
    ///
    /// Pairs whose target is not implemented in this deployment resolve to
    /// `not_implemented` before this returns, with no connector call.
    /// Everything else is filled in asynchronously; the caller observes
    /// progress by polling. Tasks are independent: a failing or slow pair
    /// never affects its siblings.
    pub async fn submit(
        &self,
        usernames: Vec<String>,
        targets: Vec<RelyingParty>,
    ) -> Result<String, SestermError> {
        let usernames: Vec<String> = usernames
            .into_iter()
            .map(|username| username.trim().to_string())
            .filter(|username| !username.is_empty())
            .collect();

        if usernames.is_empty() {
            return Err(SestermError::Validation(
                "at least one username is required".to_string(),
            ));
        }
        if targets.is_empty() {
            return Err(SestermError::Validation(
                "at least one relying party must be selected".to_string(),
            ));
        }

        let job_id = self.store.create(usernames, targets).await;
        // The store deduplicated; fan out over the canonical sets.
        let job = self.store.snapshot(&job_id).await?;

        tracing::info!(
            job_id = %job_id,
            users = job.usernames.len(),
            targets = job.targets.len(),
            "termination job created",
        );

        for username in &job.usernames {
            for &target in &job.targets {
                match self.connectors.get(target) {
                    Some(connector) => {
                        self.spawn_termination(job_id.clone(), username.clone(), connector);
                    }
                    None => {
                        self.store
                            .apply_result(
                                &job_id,
                                username,
                                target,
                                TargetResult::not_implemented(),
                            )
                            .await?;
                    }
                }
            }
        }

        Ok(job_id)
    }

    // One task per pair; its single terminal write goes through apply_result.
    fn spawn_termination(
        &self,
        job_id: String,
        username: String,
        connector: Arc<dyn RelyingPartyConnector>,
    ) {
        let store = Arc::clone(&self.store);
        let limit = self.connector_timeout;

        tokio::spawn(async move {
            let target = connector.target();
            let result = match timeout(limit, connector.terminate(&username)).await {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => TargetResult::error(format!(
                    "Failed to terminate {target} session for {username}: {err}",
                )),
                Err(_) => TargetResult::error(format!(
                    "Failed to terminate {target} session for {username}: {} after {}s",
                    ConnectorError::Timeout,
                    limit.as_secs(),
                )),
            };

            if let Err(err) = store.apply_result(&job_id, &username, target, result).await {
                tracing::error!(
                    job_id = %job_id,
                    user = %username,
                    rp = %target,
                    error = %err,
                    "failed to record termination result",
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use crate::job::{Job, TerminationState, convergence};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted connector: optional delay, then a fixed outcome.
    struct StubConnector {
        target: RelyingParty,
        delay: Duration,
        outcome: Result<TargetResult, ConnectorError>,
        calls: AtomicUsize,
    }

    impl StubConnector {
        fn ok(target: RelyingParty) -> Self {
            Self::with_delay(target, Duration::ZERO)
        }

        fn with_delay(target: RelyingParty, delay: Duration) -> Self {
            Self {
                target,
                delay,
                outcome: Ok(TargetResult::terminated()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(target: RelyingParty) -> Self {
            Self {
                target,
                delay: Duration::ZERO,
                outcome: Err(ConnectorError::Api {
                    status: 500,
                    message: "backend down".to_string(),
                }),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RelyingPartyConnector for StubConnector {
        fn target(&self) -> RelyingParty {
            self.target
        }

        async fn terminate(&self, _username: &str) -> Result<TargetResult, ConnectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.outcome {
                Ok(result) => Ok(result.clone()),
                Err(ConnectorError::Api { status, message }) => Err(ConnectorError::Api {
                    status: *status,
                    message: message.clone(),
                }),
                Err(_) => unreachable!("stubs only script Api errors"),
            }
        }
    }

    fn dispatcher(
        connectors: Vec<Arc<dyn RelyingPartyConnector>>,
        connector_timeout: Duration,
    ) -> (Dispatcher, Arc<JobStore>) {
        let store = Arc::new(JobStore::new());
        let mut registry = ConnectorRegistry::empty();
        for connector in connectors {
            registry.register(connector);
        }
        let dispatcher = Dispatcher::new(Arc::clone(&store), Arc::new(registry), connector_timeout);
        (dispatcher, store)
    }

    async fn wait_for_convergence(store: &JobStore, job_id: &str) -> Job {
        let deadline = Duration::from_secs(5);
        timeout(deadline, async {
            loop {
                let job = store.snapshot(job_id).await.unwrap();
                if convergence::is_converged(&job) {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not converge in time")
    }

    #[tokio::test]
    async fn submit_rejects_empty_usernames() {
        let (dispatcher, _store) = dispatcher(vec![], Duration::from_secs(1));
        let err = dispatcher
            .submit(vec![], vec![RelyingParty::Sso])
            .await
            .unwrap_err();
        assert!(matches!(err, SestermError::Validation(_)));

        // Whitespace-only usernames are equivalent to none at all.
        let err = dispatcher
            .submit(vec!["  ".into()], vec![RelyingParty::Sso])
            .await
            .unwrap_err();
        assert!(matches!(err, SestermError::Validation(_)));
    }

    #[tokio::test]
    async fn submit_rejects_empty_targets() {
        let (dispatcher, _store) = dispatcher(vec![], Duration::from_secs(1));
        let err = dispatcher
            .submit(vec!["a@x.com".into()], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, SestermError::Validation(_)));
    }

    #[tokio::test]
    async fn snapshot_is_available_before_any_connector_finishes() {
        let slow: Arc<dyn RelyingPartyConnector> = Arc::new(StubConnector::with_delay(
            RelyingParty::Sso,
            Duration::from_millis(200),
        ));
        let (dispatcher, store) = dispatcher(vec![slow], Duration::from_secs(1));

        let job_id = dispatcher
            .submit(
                vec!["a@x.com".into(), "b@x.com".into()],
                vec![RelyingParty::Sso],
            )
            .await
            .unwrap();

        let job = store.snapshot(&job_id).await.unwrap();
        let entries: usize = job.entries.values().map(|e| e.len()).sum();
        assert_eq!(entries, 2);
        assert!(!convergence::is_converged(&job));
    }

    #[tokio::test]
    async fn unimplemented_target_resolves_before_submit_returns() {
        let sso = Arc::new(StubConnector::ok(RelyingParty::Sso));
        let connector: Arc<dyn RelyingPartyConnector> = sso.clone();
        let (dispatcher, store) = dispatcher(vec![connector], Duration::from_secs(1));

        let job_id = dispatcher
            .submit(vec!["a@x.com".into()], vec![RelyingParty::Aws])
            .await
            .unwrap();

        // No polling needed: the aws pair was terminal at submit time.
        let job = store.snapshot(&job_id).await.unwrap();
        assert_eq!(
            job.result("a@x.com", RelyingParty::Aws).unwrap().state,
            TerminationState::NotImplemented,
        );
        assert!(convergence::is_converged(&job));
        assert_eq!(sso.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn connector_failure_does_not_disturb_sibling_pairs() {
        let sso: Arc<dyn RelyingPartyConnector> = Arc::new(StubConnector::ok(RelyingParty::Sso));
        let gsuite: Arc<dyn RelyingPartyConnector> =
            Arc::new(StubConnector::failing(RelyingParty::Gsuite));
        let (dispatcher, store) = dispatcher(vec![sso, gsuite], Duration::from_secs(1));

        let job_id = dispatcher
            .submit(
                vec!["a@x.com".into(), "b@x.com".into()],
                vec![RelyingParty::Sso, RelyingParty::Gsuite],
            )
            .await
            .unwrap();

        let job = wait_for_convergence(&store, &job_id).await;

        for username in ["a@x.com", "b@x.com"] {
            assert_eq!(
                job.result(username, RelyingParty::Sso).unwrap().state,
                TerminationState::Terminated,
            );
            let gsuite_result = job.result(username, RelyingParty::Gsuite).unwrap();
            assert_eq!(gsuite_result.state, TerminationState::Error);
            assert!(gsuite_result.error.as_deref().unwrap().contains("backend down"));
        }
    }

    #[tokio::test]
    async fn timed_out_connector_yields_error_not_a_stuck_pair() {
        let hung: Arc<dyn RelyingPartyConnector> = Arc::new(StubConnector::with_delay(
            RelyingParty::Slack,
            Duration::from_secs(30),
        ));
        let (dispatcher, store) = dispatcher(vec![hung], Duration::from_millis(50));

        let job_id = dispatcher
            .submit(vec!["a@x.com".into()], vec![RelyingParty::Slack])
            .await
            .unwrap();

        let job = wait_for_convergence(&store, &job_id).await;
        let result = job.result("a@x.com", RelyingParty::Slack).unwrap();
        assert_eq!(result.state, TerminationState::Error);
        assert!(result.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn fifteen_pairs_with_mixed_delays_converge_under_concurrent_polling() {
        let connectors: Vec<Arc<dyn RelyingPartyConnector>> = vec![
            Arc::new(StubConnector::with_delay(
                RelyingParty::Sso,
                Duration::from_millis(10),
            )),
            Arc::new(StubConnector::with_delay(
                RelyingParty::Gsuite,
                Duration::from_millis(40),
            )),
            Arc::new(StubConnector::with_delay(
                RelyingParty::Slack,
                Duration::from_millis(25),
            )),
        ];
        let (dispatcher, store) = dispatcher(connectors, Duration::from_secs(1));

        let usernames: Vec<String> = (0..5).map(|i| format!("user{i}@x.com")).collect();
        let job_id = dispatcher
            .submit(
                usernames,
                vec![RelyingParty::Sso, RelyingParty::Gsuite, RelyingParty::Slack],
            )
            .await
            .unwrap();

        // Poll from several readers while the job is still converging.
        let pollers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let job_id = job_id.clone();
                tokio::spawn(async move {
                    for _ in 0..20 {
                        let job = store.snapshot(&job_id).await.unwrap();
                        let entries: usize = job.entries.values().map(|e| e.len()).sum();
                        assert_eq!(entries, 15);
                        tokio::time::sleep(Duration::from_millis(3)).await;
                    }
                })
            })
            .collect();

        let job = wait_for_convergence(&store, &job_id).await;
        for poller in pollers {
            poller.await.unwrap();
        }

        let terminal = job
            .entries
            .values()
            .flat_map(|e| e.values())
            .filter(|r| r.state == TerminationState::Terminated)
            .count();
        assert_eq!(terminal, 15);
    }

    #[tokio::test]
    async fn duplicate_submissions_collapse_to_one_pair() {
        let sso = Arc::new(StubConnector::ok(RelyingParty::Sso));
        let connector: Arc<dyn RelyingPartyConnector> = sso.clone();
        let (dispatcher, store) = dispatcher(vec![connector], Duration::from_secs(1));

        let job_id = dispatcher
            .submit(
                vec!["a@x.com".into(), " a@x.com ".into()],
                vec![RelyingParty::Sso, RelyingParty::Sso],
            )
            .await
            .unwrap();

        let job = wait_for_convergence(&store, &job_id).await;
        let entries: usize = job.entries.values().map(|e| e.len()).sum();
        assert_eq!(entries, 1);
        assert_eq!(sso.calls.load(Ordering::SeqCst), 1);
    }
}
