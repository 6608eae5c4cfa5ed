// Conversation log: append-only record of all debate turns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extraction::ExtractionStatus;
use crate::roles::AgentRole;

/// One utterance in the debate.
///
/// Turns are never mutated after insertion. `structured` is the best-effort
/// parsed payload; when parsing failed it holds the schema's canonical
/// defaults and `extraction_status` is `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: AgentRole,
    pub raw_content: String,
    pub structured: Map<String, Value>,
    /// Debate round this turn belongs to (1-based).
    pub round: u32,
    pub timestamp: DateTime<Utc>,
    pub extraction_status: ExtractionStatus,
}

impl Turn {
    pub fn new(
        role: AgentRole,
        raw_content: impl Into<String>,
        structured: Map<String, Value>,
        round: u32,
        extraction_status: ExtractionStatus,
    ) -> Self {
        Self {
            role,
            raw_content: raw_content.into(),
            structured,
            round,
            timestamp: Utc::now(),
            extraction_status,
        }
    }
}

/// Append-only, queryable record of all turns in a debate.
///
/// Roles are canonicalized before a turn ever reaches `append` (they are
/// typed `AgentRole` values), so role queries need no normalization at
/// lookup time; the string-accepting variant exists for callers holding
/// a display or kebab-case spelling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        tracing::debug!(
            role = %turn.role,
            round = turn.round,
            status = ?turn.extraction_status,
            turn_number = self.turns.len() + 1,
            "Appended turn"
        );
        self.turns.push(turn);
    }

    /// All turns, in insertion order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Turns from one role, in insertion order.
    pub fn turns_by_role(&self, role: AgentRole) -> Vec<&Turn> {
        self.turns.iter().filter(|t| t.role == role).collect()
    }

    /// Like [`turns_by_role`](Self::turns_by_role), but resolves either
    /// textual spelling of the role first. Unknown names yield no turns.
    pub fn turns_by_role_name(&self, name: &str) -> Vec<&Turn> {
        match AgentRole::parse(name) {
            Some(role) => self.turns_by_role(role),
            None => Vec::new(),
        }
    }

    /// The most recent turn, optionally filtered by role.
    pub fn latest_turn(&self, role: Option<AgentRole>) -> Option<&Turn> {
        match role {
            Some(role) => self.turns.iter().rev().find(|t| t.role == role),
            None => self.turns.last(),
        }
    }

    /// Highest round number recorded, 0 when the log is empty.
    pub fn round_count(&self) -> u32 {
        self.turns.iter().map(|t| t.round).max().unwrap_or(0)
    }

    /// Number of turns recorded in the given round.
    pub fn turns_in_round(&self, round: u32) -> usize {
        self.turns.iter().filter(|t| t.round == round).count()
    }
}
