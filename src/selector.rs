// Turn selection: who speaks next, as a pure function of (round, position)
//
// Every round runs curator → interpreter → reviewer. Round 1 opens on the
// claim itself; each later round opens on the standing reviewer objections
// from the previous round: the curator supplies the missing evidence, the
// interpreter re-issues its position, the reviewer re-evaluates. The
// selector holds no state of its own: the next speaker is always
// recomputable from the persisted conversation log, which is what makes
// suspended debates trivially resumable.

use crate::conversation::ConversationLog;
use crate::roles::AgentRole;

/// Scheduled speakers per round.
pub const TURNS_PER_ROUND: u32 = 3;

/// The role that speaks at `(round, position)`.
///
/// `position` counts turns within the round and may exceed
/// `TURNS_PER_ROUND` when a paused round was resumed with an injected
/// curator turn; the schedule simply cycles (curator, interpreter,
/// reviewer) so a resumed round re-runs the clarify → revise → re-review
/// sequence without leaving the round.
pub fn speaker_for(round: u32, position: u32) -> AgentRole {
    debug_assert!(round >= 1);
    match position % TURNS_PER_ROUND {
        0 => AgentRole::Curator,
        1 => AgentRole::Interpreter,
        _ => AgentRole::Reviewer,
    }
}

/// Reconstruct `(round, position)` from a persisted log.
///
/// `paused_for_user` distinguishes the two states a log can be in when its
/// latest round holds a whole number of scheduled turns: a paused round
/// resumes in place (the next speaker is the curator carrying new
/// evidence), while a completed round that the policy let continue opens
/// the next round.
pub fn resume_point(log: &ConversationLog, paused_for_user: bool) -> (u32, u32) {
    if log.is_empty() {
        return (1, 0);
    }

    let round = log.round_count();
    let in_round = log.turns_in_round(round) as u32;

    if in_round > 0 && in_round % TURNS_PER_ROUND == 0 && !paused_for_user {
        (round + 1, 0)
    } else {
        (round, in_round)
    }
}
