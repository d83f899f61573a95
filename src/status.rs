use std::sync::Arc;

use serde::Serialize;

use crate::error::SestermError;
use crate::job::{Job, JobStore, RelyingParty, TerminationState, convergence};

/// One (username, relying party) row in a status report, shaped exactly as
/// the polling client consumes it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub affected_user: String,
    #[serde(rename = "affectedRP")]
    pub affected_rp: RelyingParty,
    pub current_state: TerminationState,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// A full point-in-time view of a job. `converged` is the cancellation
/// hint: once true the caller can stop polling.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub results: Vec<StatusEntry>,
    pub converged: bool,
}

impl StatusReport {
    /// Flatten a job snapshot into wire rows: usernames in submission
    /// order, then targets in submission order, so consecutive polls list
    /// entries identically.
    pub fn from_job(job: &Job) -> Self {
        let mut results = Vec::with_capacity(job.usernames.len() * job.targets.len());
        for username in &job.usernames {
            for &target in &job.targets {
                if let Some(result) = job.result(username, target) {
                    results.push(StatusEntry {
                        affected_user: username.clone(),
                        affected_rp: target,
                        current_state: result.state,
                        output: result.output.clone(),
                        error: result.error.clone(),
                    });
                }
            }
        }

        Self {
            results,
            converged: convergence::is_converged(job),
        }
    }
}

/// Read side of the engine. Polling is stateless: every call returns the
/// full current snapshot, so clients need no cursor and a dropped poll
/// costs nothing.
pub struct StatusService {
    store: Arc<JobStore>,
}

impl StatusService {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    pub async fn poll(&self, job_id: &str) -> Result<StatusReport, SestermError> {
        let job = self.store.snapshot(job_id).await?;
        Ok(StatusReport::from_job(&job))
    }
}
