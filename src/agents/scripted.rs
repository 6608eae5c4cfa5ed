// Deterministic scripted collaborator
//
// Plays back canned responses per role, in order. Backs every
// orchestration test: scripts can also simulate transport failures and
// stalls so the retry/timeout/degradation paths are exercisable without a
// live model.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::extraction::format_delimited;
use crate::roles::AgentRole;

use super::{AgentCollaborator, AgentContext};

/// One scripted reaction to being invoked.
#[derive(Debug, Clone)]
enum ScriptStep {
    /// Return this text.
    Say(String),
    /// Fail with this message (a transport-level error, retried upstream).
    Fail(String),
    /// Never answer; the caller's timeout has to fire.
    Stall,
}

/// A collaborator that replays a fixed script.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    steps: Mutex<HashMap<AgentRole, VecDeque<ScriptStep>>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw text response for `role`.
    pub fn say(self, role: AgentRole, text: impl Into<String>) -> Self {
        self.push(role, ScriptStep::Say(text.into()));
        self
    }

    /// Queue a JSON payload for `role`, wrapped in the extraction
    /// delimiters the way a well-behaved agent answers.
    pub fn say_json(self, role: AgentRole, payload: Value) -> Self {
        self.push(role, ScriptStep::Say(format_delimited(&payload)));
        self
    }

    /// Queue a transport failure for `role`.
    pub fn fail(self, role: AgentRole, message: impl Into<String>) -> Self {
        self.push(role, ScriptStep::Fail(message.into()));
        self
    }

    /// Queue a stall (the call never completes) for `role`.
    pub fn stall(self, role: AgentRole) -> Self {
        self.push(role, ScriptStep::Stall);
        self
    }

    fn push(&self, role: AgentRole, step: ScriptStep) {
        self.steps
            .lock()
            .expect("script mutex poisoned")
            .entry(role)
            .or_default()
            .push_back(step);
    }

    fn next_step(&self, role: AgentRole) -> Option<ScriptStep> {
        self.steps
            .lock()
            .expect("script mutex poisoned")
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl AgentCollaborator for ScriptedAgent {
    async fn invoke(&self, role: AgentRole, context: &AgentContext) -> Result<String> {
        match self.next_step(role) {
            Some(ScriptStep::Say(text)) => Ok(text),
            Some(ScriptStep::Fail(message)) => bail!("{message}"),
            Some(ScriptStep::Stall) => {
                // Out-wait any reasonable per-call timeout
                tokio::time::sleep(Duration::from_secs(86_400)).await;
                bail!("stalled call unexpectedly resumed")
            }
            None => bail!(
                "script exhausted for role {} (case {}, round {})",
                role,
                context.case_id,
                context.round
            ),
        }
    }
}
