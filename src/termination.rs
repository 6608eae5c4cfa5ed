// Termination policy: consensus, suspension, or forced stop
//
// Evaluated once per round, right after the reviewer's turn is appended.
// Rule order matters. An explicit close always wins. A human-evidence
// request outranks every form of automatic progression: a user decision
// must never be silently overridden by round pressure. The round ceiling
// comes last so a forced stop stays distinguishable from genuine
// consensus downstream.

use serde_json::Value;

use crate::conversation::Turn;
use crate::extraction::ExtractionStatus;
use crate::state::DebateState;

/// What the orchestrator should do after a reviewer turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Case was explicitly closed by an external action.
    Closed,
    /// Reviewer needs additional evidence from a human: suspend, do not
    /// increment the round.
    AwaitUser,
    /// Zero blocking objections remain: terminate with consensus.
    Consensus,
    /// Round ceiling reached with objections outstanding: terminate by
    /// force.
    Forced,
    /// Proceed to the next round.
    Continue,
}

impl Verdict {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Continue)
    }
}

/// Decides whether the debate should stop.
#[derive(Debug, Clone)]
pub struct TerminationPolicy {
    max_rounds: u32,
}

impl TerminationPolicy {
    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds }
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Evaluate the stop rules against the accumulated state and the
    /// reviewer turn that just landed.
    ///
    /// A reviewer turn whose extraction failed carries an empty objection
    /// list by construction; that absence of data is degraded information,
    /// not consensus, so rule 3 only fires on a turn that actually parsed.
    pub fn evaluate(&self, state: &DebateState, reviewer_turn: &Turn) -> Verdict {
        if state.closed {
            return Verdict::Closed;
        }

        if reviewer_turn
            .structured
            .get("needs_user_input")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            tracing::info!(
                case_id = %state.case_id,
                round = state.round,
                "Reviewer requested human evidence, suspending debate"
            );
            return Verdict::AwaitUser;
        }

        let blocking = state.decision.blocking_count();
        if blocking == 0 && reviewer_turn.extraction_status != ExtractionStatus::Failed {
            tracing::info!(
                case_id = %state.case_id,
                round = state.round,
                "No blocking objections remain, consensus reached"
            );
            return Verdict::Consensus;
        }

        if state.round >= self.max_rounds {
            tracing::warn!(
                case_id = %state.case_id,
                round = state.round,
                blocking,
                "Round ceiling reached with unresolved objections, forcing termination"
            );
            return Verdict::Forced;
        }

        Verdict::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::AgentRole;
    use crate::state::CaseInput;
    use serde_json::{json, Map};

    fn state_with_blocking(round: u32, blocking: usize) -> DebateState {
        let mut state = DebateState::new(CaseInput::default());
        state.round = round;
        for i in 0..blocking {
            state.decision.merge_reviewer(
                json!({
                    "objections": [{"kind": format!("Issue {i}"), "status": "Blocking", "message": "m"}]
                })
                .as_object()
                .unwrap(),
            );
        }
        state
    }

    fn reviewer_turn(round: u32, payload: serde_json::Value, status: ExtractionStatus) -> Turn {
        Turn::new(
            AgentRole::Reviewer,
            "",
            payload.as_object().cloned().unwrap_or_else(Map::new),
            round,
            status,
        )
    }

    #[test]
    fn test_explicit_close_beats_everything() {
        let policy = TerminationPolicy::new(3);
        let mut state = state_with_blocking(1, 2);
        state.closed = true;
        let turn = reviewer_turn(1, json!({"needs_user_input": true}), ExtractionStatus::Ok);
        assert_eq!(policy.evaluate(&state, &turn), Verdict::Closed);
    }

    #[test]
    fn test_user_pause_beats_consensus_and_force() {
        let policy = TerminationPolicy::new(3);
        // Even at the round ceiling with nothing blocking, an explicit
        // human-evidence request suspends rather than terminates
        let state = state_with_blocking(3, 0);
        let turn = reviewer_turn(3, json!({"needs_user_input": true}), ExtractionStatus::Ok);
        assert_eq!(policy.evaluate(&state, &turn), Verdict::AwaitUser);
    }

    #[test]
    fn test_zero_blocking_is_consensus() {
        let policy = TerminationPolicy::new(3);
        let state = state_with_blocking(1, 0);
        let turn = reviewer_turn(1, json!({"approval": true}), ExtractionStatus::Ok);
        assert_eq!(policy.evaluate(&state, &turn), Verdict::Consensus);
    }

    #[test]
    fn test_resolved_objections_do_not_block_consensus() {
        let policy = TerminationPolicy::new(3);
        let mut state = state_with_blocking(2, 1);
        state.decision.merge_reviewer(
            json!({
                "objections": [{"kind": "Issue 0", "status": "Resolved", "message": "fixed"}]
            })
            .as_object()
            .unwrap(),
        );
        let turn = reviewer_turn(2, json!({}), ExtractionStatus::Partial);
        assert_eq!(policy.evaluate(&state, &turn), Verdict::Consensus);
    }

    #[test]
    fn test_failed_reviewer_turn_is_not_consensus() {
        let policy = TerminationPolicy::new(3);
        // No blocking objections recorded, but the reviewer turn never
        // parsed: absence of data must not close the case
        let state = state_with_blocking(1, 0);
        let turn = reviewer_turn(1, json!({}), ExtractionStatus::Failed);
        assert_eq!(policy.evaluate(&state, &turn), Verdict::Continue);
    }

    #[test]
    fn test_failed_reviewer_turn_at_ceiling_still_forces() {
        let policy = TerminationPolicy::new(3);
        let state = state_with_blocking(3, 0);
        let turn = reviewer_turn(3, json!({}), ExtractionStatus::Failed);
        assert_eq!(policy.evaluate(&state, &turn), Verdict::Forced);
    }

    #[test]
    fn test_ceiling_with_blocking_forces() {
        let policy = TerminationPolicy::new(3);
        let state = state_with_blocking(3, 1);
        let turn = reviewer_turn(3, json!({}), ExtractionStatus::Ok);
        assert_eq!(policy.evaluate(&state, &turn), Verdict::Forced);
    }

    #[test]
    fn test_blocking_below_ceiling_continues() {
        let policy = TerminationPolicy::new(3);
        let state = state_with_blocking(1, 1);
        let turn = reviewer_turn(1, json!({}), ExtractionStatus::Ok);
        assert_eq!(policy.evaluate(&state, &turn), Verdict::Continue);
    }

    #[test]
    fn test_consensus_beats_force_at_ceiling() {
        // Both rule 3 and rule 4 could fire; consensus wins so the result
        // is not annotated as forced
        let policy = TerminationPolicy::new(3);
        let state = state_with_blocking(3, 0);
        let turn = reviewer_turn(3, json!({"approval": true}), ExtractionStatus::Ok);
        assert_eq!(policy.evaluate(&state, &turn), Verdict::Consensus);
    }
}
