use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::error::SestermError;

use super::convergence;
use super::model::{Job, JobStatus, RelyingParty, TargetResult, TerminationState};

/// Process-wide owner of every in-flight and completed termination job.
///
/// Jobs are only reachable through this store. Each job sits behind its own
/// mutex so result writes for one job serialize, while snapshots of other
/// jobs and lookups proceed concurrently. Readers only ever see a job
/// between whole-result writes, never a half-written entry.
pub struct JobStore {
    jobs: RwLock<HashMap<String, Arc<Mutex<Job>>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Create a job with every (username, target) entry initialized to
    /// `not_modified` and return its id.
    pub async fn create(&self, usernames: Vec<String>, targets: Vec<RelyingParty>) -> String {
        let job = Job::new(usernames, targets);
        let id = job.id.clone();
        self.jobs
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(job)));
        id
    }

    async fn job(&self, job_id: &str) -> Result<Arc<Mutex<Job>>, SestermError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| SestermError::JobNotFound(job_id.to_string()))
    }

    /// Record the result of one termination attempt.
    ///
    /// State transitions are monotonic: once a pair is terminal, a later
    /// `not_modified` write keeps the terminal state. Output and error text
    /// are last-write-wins. The (username, target) pair must belong to the
    /// job's fixed entry set.
    pub async fn apply_result(
        &self,
        job_id: &str,
        username: &str,
        target: RelyingParty,
        result: TargetResult,
    ) -> Result<(), SestermError> {
        let job = self.job(job_id).await?;
        let mut job = job.lock().await;

        {
            let slot = job
                .entries
                .get_mut(username)
                .and_then(|entry| entry.get_mut(&target))
                .ok_or_else(|| SestermError::EntryNotFound {
                    job_id: job_id.to_string(),
                    username: username.to_string(),
                    target: target.to_string(),
                })?;

            let state = if result.state == TerminationState::NotModified && slot.state.is_terminal()
            {
                slot.state
            } else {
                result.state
            };

            *slot = TargetResult {
                state,
                output: result.output,
                error: result.error,
            };
        }

        job.status = if convergence::is_converged(&job) {
            JobStatus::Converged
        } else {
            JobStatus::InProgress
        };

        Ok(())
    }

    /// A full copy of the job's current state.
    pub async fn snapshot(&self, job_id: &str) -> Result<Job, SestermError> {
        let job = self.job(job_id).await?;
        let job = job.lock().await;
        Ok(job.clone())
    }

    /// Drop converged jobs created more than `retention_secs` ago. Returns
    /// the number of jobs evicted. Jobs still being written to are skipped
    /// and picked up by a later sweep.
    pub async fn evict_converged(&self, retention_secs: u64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(retention_secs as i64);
        let mut jobs = self.jobs.write().await;

        let expired: Vec<String> = jobs
            .iter()
            .filter_map(|(id, job)| {
                let job = job.try_lock().ok()?;
                (job.status == JobStatus::Converged && job.created_at < cutoff)
                    .then(|| id.clone())
            })
            .collect();

        for id in &expired {
            jobs.remove(id);
        }
        expired.len()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
