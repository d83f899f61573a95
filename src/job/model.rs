use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifiers of the relying parties (RPs) shared between the engine and
/// its clients. A closed set: extending it means writing a connector for
/// the new member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelyingParty {
    Sso,
    Gsuite,
    Slack,
    Aws,
    Gcp,
}

impl RelyingParty {
    pub const ALL: [RelyingParty; 5] = [
        RelyingParty::Sso,
        RelyingParty::Gsuite,
        RelyingParty::Slack,
        RelyingParty::Aws,
        RelyingParty::Gcp,
    ];

    /// The identifier used on the wire and in client selections.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelyingParty::Sso => "sso",
            RelyingParty::Gsuite => "gsuite",
            RelyingParty::Slack => "slack",
            RelyingParty::Aws => "aws",
            RelyingParty::Gcp => "gcp",
        }
    }

    /// Parse a client-supplied identifier. Returns `None` for anything
    /// outside the closed set.
    pub fn from_wire(ident: &str) -> Option<Self> {
        match ident {
            "sso" => Some(RelyingParty::Sso),
            "gsuite" => Some(RelyingParty::Gsuite),
            "slack" => Some(RelyingParty::Slack),
            "aws" => Some(RelyingParty::Aws),
            "gcp" => Some(RelyingParty::Gcp),
            _ => None,
        }
    }
}

impl fmt::Display for RelyingParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The states a (username, relying party) pair can be in. `NotModified`
/// is the initial state; the other three are terminal and no further
/// transition occurs once one of them is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationState {
    NotModified,
    Terminated,
    Error,
    NotImplemented,
}

impl TerminationState {
    /// Terminal states end polling for a pair. `NotModified` never does,
    /// even for single-target jobs.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TerminationState::NotModified)
    }
}

impl fmt::Display for TerminationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationState::NotModified => "not_modified",
            TerminationState::Terminated => "terminated",
            TerminationState::Error => "error",
            TerminationState::NotImplemented => "not_implemented",
        };
        f.write_str(s)
    }
}

/// The result of attempting to terminate one user's session with one
/// relying party. At most one of `output` and `error` is set per update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResult {
    pub state: TerminationState,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl TargetResult {
    pub fn not_modified() -> Self {
        Self {
            state: TerminationState::NotModified,
            output: None,
            error: None,
        }
    }

    pub fn terminated() -> Self {
        Self {
            state: TerminationState::Terminated,
            output: None,
            error: None,
        }
    }

    pub fn terminated_with_output(output: impl Into<String>) -> Self {
        Self {
            state: TerminationState::Terminated,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            state: TerminationState::Error,
            output: None,
            error: Some(message.into()),
        }
    }

    pub fn not_implemented() -> Self {
        Self {
            state: TerminationState::NotImplemented,
            output: None,
            error: None,
        }
    }
}

/// Overall status of a job, derived from its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Converged,
}

/// One submitted termination request spanning a set of users and targets.
///
/// The entry set is fixed at creation: usernames and targets are never
/// added afterwards, only the per-pair [`TargetResult`] values mutate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Requested usernames, deduplicated, in submission order.
    pub usernames: Vec<String>,
    /// Requested relying parties, deduplicated, in submission order.
    pub targets: Vec<RelyingParty>,
    pub entries: HashMap<String, HashMap<RelyingParty, TargetResult>>,
    pub status: JobStatus,
}

impl Job {
    pub fn new(usernames: Vec<String>, targets: Vec<RelyingParty>) -> Self {
        let usernames = dedup_preserving_order(usernames);
        let mut seen = Vec::new();
        for target in targets {
            if !seen.contains(&target) {
                seen.push(target);
            }
        }
        let targets = seen;

        let entries = usernames
            .iter()
            .map(|username| {
                let entry = targets
                    .iter()
                    .map(|target| (*target, TargetResult::not_modified()))
                    .collect();
                (username.clone(), entry)
            })
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            usernames,
            targets,
            entries,
            status: JobStatus::InProgress,
        }
    }

    pub fn result(&self, username: &str, target: RelyingParty) -> Option<&TargetResult> {
        self.entries
            .get(username)
            .and_then(|entry| entry.get(&target))
    }
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}
