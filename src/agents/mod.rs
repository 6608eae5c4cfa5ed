// Agent collaborator seam
//
// The agents' internal reasoning lives outside this crate (a language
// model behind a network call). The orchestrator only depends on this
// trait: give a role its accumulated context, get free-form text back.
// Failures surface as error values and are absorbed by the orchestrator's
// retry/degradation path, never as panics.

pub mod retry;
pub mod scripted;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::roles::AgentRole;
use crate::state::Objection;

pub use retry::with_retry;
pub use scripted::ScriptedAgent;

/// A prior turn, flattened for collaborator consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextTurn {
    pub role: AgentRole,
    pub round: u32,
    pub content: String,
}

/// Everything a collaborator gets to see when asked to speak: the claim,
/// the debate so far, the current evidence snapshot, and whatever the
/// reviewer still objects to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    pub case_id: String,
    pub claim_summary: String,
    pub round: u32,
    pub prior_turns: Vec<ContextTurn>,
    pub evidence: Vec<Value>,
    pub expense: Map<String, Value>,
    pub unresolved_objections: Vec<Objection>,
}

/// An external reasoning collaborator. Implementations wrap whatever
/// transport reaches the model; they are expected to be slow and
/// occasionally unreliable.
#[async_trait]
pub trait AgentCollaborator: Send + Sync {
    /// Produce one turn of free-form text for the given role.
    async fn invoke(&self, role: AgentRole, context: &AgentContext) -> Result<String>;
}
