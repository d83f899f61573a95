//! Terminal rendering for the one-shot CLI mode.
//!
//! Uses `indicatif` for a spinner while the job converges and `console`
//! for color-coded per-state output once it has.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::job::{Job, TerminationState, convergence};

/// Human-readable label for a termination state, matching what the web
/// client displays.
fn state_label(state: TerminationState) -> &'static str {
    match state {
        TerminationState::NotModified => "Not modified",
        TerminationState::Terminated => "Terminated",
        TerminationState::Error => "Error",
        TerminationState::NotImplemented => "Not implemented",
    }
}

/// Spinner shown while polling a termination job.
pub struct PollProgress {
    pb: ProgressBar,
}

impl PollProgress {
    pub fn start(job_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("Waiting for termination job {job_id} to converge"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self { pb }
    }

    /// Update the spinner with how many users have fully converged.
    pub fn update(&self, job: &Job) {
        let done = job
            .usernames
            .iter()
            .filter(|username| convergence::is_user_converged(job, username))
            .count();
        self.pb
            .set_message(format!("{done}/{} users converged", job.usernames.len()));
    }

    pub fn finish(self) {
        self.pb.finish_and_clear();
    }
}

/// Print the per-user, per-relying-party result table followed by the
/// aggregated outputs and errors.
pub fn render_results(job: &Job) {
    let green = Style::new().green();
    let red = Style::new().red();
    let yellow = Style::new().yellow();
    let dim = Style::new().dim();

    for username in &job.usernames {
        println!("{username}");
        for &target in &job.targets {
            let Some(result) = job.result(username, target) else {
                continue;
            };
            let label = state_label(result.state);
            let styled = match result.state {
                TerminationState::Terminated => green.apply_to(label),
                TerminationState::Error => red.apply_to(label),
                TerminationState::NotImplemented => yellow.apply_to(label),
                TerminationState::NotModified => dim.apply_to(label),
            };
            println!("  {:<8} {styled}", target.as_str());
        }
    }

    let mut outputs = Vec::new();
    let mut errors = Vec::new();
    for username in &job.usernames {
        for &target in &job.targets {
            if let Some(result) = job.result(username, target) {
                outputs.extend(result.output.as_deref());
                errors.extend(result.error.as_deref());
            }
        }
    }

    if !outputs.is_empty() {
        println!("\nOutputs:");
        for output in outputs {
            println!("  {output}");
        }
    }
    if !errors.is_empty() {
        println!("\nErrors:");
        for error in errors {
            println!("  {}", red.apply_to(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_labels_match_client_representations() {
        assert_eq!(state_label(TerminationState::NotModified), "Not modified");
        assert_eq!(state_label(TerminationState::Terminated), "Terminated");
        assert_eq!(state_label(TerminationState::Error), "Error");
        assert_eq!(
            state_label(TerminationState::NotImplemented),
            "Not implemented",
        );
    }
}
