// Error taxonomy for the orchestration boundary
//
// Extraction failures and individual agent failures are absorbed inside
// the loop and never appear here. Only terminal conditions and lifecycle
// misuse cross the boundary as typed errors.

use thiserror::Error;

use crate::state::DecisionPackage;

#[derive(Debug, Error)]
pub enum DebateError {
    /// Every agent invocation across an entire round failed. Carries the
    /// best-known partial decision so callers never lose accumulated
    /// evidence or objections.
    #[error("every agent invocation in round {round} failed")]
    RoundFailed {
        round: u32,
        partial: Box<DecisionPackage>,
    },

    /// The turn selector was asked for a round past the hard ceiling
    /// without the termination policy having fired. Programmer error
    /// class; must never occur.
    #[error("turn selector asked for round {round} past the ceiling of {max_rounds}")]
    InvariantViolation { round: u32, max_rounds: u32 },

    #[error("case {0} not found")]
    CaseNotFound(String),

    /// `start` called with a case id that is already being debated.
    #[error("case {0} is already active")]
    CaseAlreadyActive(String),

    /// The spawned debate task panicked or was aborted out from under us.
    #[error("debate task for case {0} died")]
    TaskDied(String),

    /// `resume` called on a case that is not suspended.
    #[error("case {0} is not paused")]
    CaseNotPaused(String),

    /// Operation attempted on a closed case that requires an open one.
    #[error("case {0} is closed")]
    CaseClosed(String),

    /// `reopen` called on a case that is not closed.
    #[error("case {0} is not closed")]
    CaseNotClosed(String),

    #[error("state storage failed")]
    Storage(#[source] anyhow::Error),
}

impl DebateError {
    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}
