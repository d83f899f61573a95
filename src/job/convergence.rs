//! Convergence detection over job snapshots.
//!
//! These predicates are the single completion check in the system: the
//! store consults them to maintain a job's overall status, the status
//! service reports them to polling clients, and the CLI poll loop uses
//! them to decide when to stop.

use super::model::Job;

/// True iff every (username, relying party) pair in the job has reached a
/// terminal state. A job that converged stays converged: terminal states
/// never regress.
pub fn is_converged(job: &Job) -> bool {
    job.entries
        .values()
        .all(|entry| entry.values().all(|result| result.state.is_terminal()))
}

/// The same check scoped to one user's entry. False for usernames that are
/// not part of the job.
pub fn is_user_converged(job: &Job, username: &str) -> bool {
    job.entries
        .get(username)
        .is_some_and(|entry| entry.values().all(|result| result.state.is_terminal()))
}
