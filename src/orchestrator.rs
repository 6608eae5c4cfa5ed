// Debate orchestrator: drives one case through rounds of agent turns
//
// The loop is deliberately dumb: ask the selector who speaks, invoke the
// collaborator with timeout and retry, extract, append, merge, and after
// every reviewer turn ask the termination policy what to do. All state
// lives in the owned DebateState, which is persisted at every suspension
// point so a debate can be resumed days later by a different process.

use std::sync::Arc;

use anyhow::anyhow;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::agents::{with_retry, AgentCollaborator, AgentContext, ContextTurn};
use crate::config::DebateConfig;
use crate::conversation::Turn;
use crate::error::DebateError;
use crate::extraction::{extract, format_delimited, ExpectedSchema, ExtractionStatus};
use crate::roles::AgentRole;
use crate::selector;
use crate::state::{CaseInput, DebateState, DecisionPackage, StatusSnapshot};
use crate::store::StateStore;
use crate::termination::{TerminationPolicy, Verdict};

/// Runs the debate for a single case.
///
/// Owns the case's `DebateState` exclusively for the duration of a run;
/// concurrent cases each get their own orchestrator.
pub struct DebateOrchestrator {
    state: DebateState,
    agent: Arc<dyn AgentCollaborator>,
    store: Arc<dyn StateStore>,
    config: DebateConfig,
    policy: TerminationPolicy,
    cancel: CancellationToken,
    status_tx: Option<watch::Sender<StatusSnapshot>>,
    invocations_this_round: u32,
    failures_this_round: u32,
}

impl DebateOrchestrator {
    pub fn new(
        input: CaseInput,
        agent: Arc<dyn AgentCollaborator>,
        store: Arc<dyn StateStore>,
        config: DebateConfig,
    ) -> Self {
        Self::from_state(DebateState::new(input), agent, store, config)
    }

    /// Rehydrate an orchestrator from persisted state. The cursor is
    /// recomputed from the log rather than trusted from the snapshot, so a
    /// state file hand-edited or written by an older version still resumes
    /// at the right speaker.
    pub fn from_state(
        mut state: DebateState,
        agent: Arc<dyn AgentCollaborator>,
        store: Arc<dyn StateStore>,
        config: DebateConfig,
    ) -> Self {
        let (round, position) = selector::resume_point(&state.log, state.paused_for_user);
        state.round = round;
        state.position = position;

        let policy = TerminationPolicy::new(config.max_rounds);
        Self {
            state,
            agent,
            store,
            config,
            policy,
            cancel: CancellationToken::new(),
            status_tx: None,
            invocations_this_round: 0,
            failures_this_round: 0,
        }
    }

    /// Use an externally owned cancellation token (the case manager holds
    /// one per case so `close` can interrupt a running debate).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Publish a status snapshot on this channel after every turn.
    pub fn with_status_sender(mut self, tx: watch::Sender<StatusSnapshot>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &DebateState {
        &self.state
    }

    pub fn case_id(&self) -> &str {
        &self.state.case_id
    }

    /// Drive the debate until it terminates or suspends.
    ///
    /// Closed cases return their compiled decision without taking further
    /// turns. A suspended case progresses only through [`resume`]; calling
    /// `run` on it returns the best-known package unchanged.
    ///
    /// [`resume`]: DebateOrchestrator::resume
    pub async fn run(&mut self) -> Result<DecisionPackage, DebateError> {
        if self.state.closed || self.state.paused_for_user {
            return Ok(self.state.compile_decision());
        }
        self.drive().await
    }

    /// Resume a suspended debate, optionally injecting new human-supplied
    /// evidence as a synthetic curator turn.
    ///
    /// The injected turn occupies the curator slot of the paused round, so
    /// the round continues interpreter → reviewer: the interpreter revises
    /// its position against the new evidence and the reviewer re-evaluates
    /// its objections. Without new evidence the live curator is invoked for
    /// a clarification pass instead.
    pub async fn resume(
        &mut self,
        new_evidence: Vec<Value>,
    ) -> Result<DecisionPackage, DebateError> {
        if self.state.closed {
            return Err(DebateError::CaseClosed(self.state.case_id.clone()));
        }
        if !self.state.paused_for_user {
            return Err(DebateError::CaseNotPaused(self.state.case_id.clone()));
        }

        self.state.paused_for_user = false;

        if !new_evidence.is_empty() {
            info!(
                case_id = %self.state.case_id,
                round = self.state.round,
                items = new_evidence.len(),
                "Resuming with injected evidence"
            );
            let mut payload = Map::new();
            payload.insert("evidence".to_string(), Value::Array(new_evidence));

            let turn = Turn::new(
                AgentRole::Curator,
                format_delimited(&Value::Object(payload.clone())),
                payload,
                self.state.round,
                ExtractionStatus::Ok,
            );
            self.state.decision.merge_curator(&turn.structured);
            self.state.log.append(turn);
            self.state.position += 1;
            self.state.touch();
            self.publish();
        } else {
            info!(
                case_id = %self.state.case_id,
                round = self.state.round,
                "Resuming without new evidence, curator will clarify"
            );
        }

        self.drive().await
    }

    async fn drive(&mut self) -> Result<DecisionPackage, DebateError> {
        loop {
            if self.cancel.is_cancelled() {
                info!(case_id = %self.state.case_id, "Debate cancelled, closing case");
                self.state.closed = true;
                self.state.touch();
                self.persist().await?;
                break;
            }

            let round = self.state.round;
            if round > self.policy.max_rounds() {
                return Err(DebateError::InvariantViolation {
                    round,
                    max_rounds: self.policy.max_rounds(),
                });
            }

            let role = selector::speaker_for(round, self.state.position);
            let context = self.build_context();
            let turn = self.take_turn(role, &context).await;

            if turn.extraction_status != ExtractionStatus::Failed {
                match role {
                    AgentRole::Curator => self.state.decision.merge_curator(&turn.structured),
                    AgentRole::Interpreter => {
                        self.state.decision.merge_interpreter(&turn.structured)
                    }
                    AgentRole::Reviewer => self.state.decision.merge_reviewer(&turn.structured),
                    AgentRole::Supervisor => {}
                }
            }
            self.state.log.append(turn.clone());
            self.state.position += 1;
            self.state.touch();
            self.publish();

            if role != AgentRole::Reviewer {
                continue;
            }

            // A round where no invocation got through is not a debate;
            // surface the failure with whatever was accumulated before it.
            // Turns that reached us but did not parse are degraded, not
            // failed, and do not count here.
            if self.invocations_this_round > 0
                && self.failures_this_round == self.invocations_this_round
            {
                error!(
                    case_id = %self.state.case_id,
                    round,
                    "Every agent invocation this round failed"
                );
                self.state.errored = true;
                self.state.touch();
                self.persist().await?;
                self.publish();
                return Err(DebateError::RoundFailed {
                    round,
                    partial: Box::new(self.state.compile_decision()),
                });
            }

            match self.policy.evaluate(&self.state, &turn) {
                Verdict::Continue => {
                    self.state.round += 1;
                    self.state.position = 0;
                    self.invocations_this_round = 0;
                    self.failures_this_round = 0;
                    self.persist().await?;
                }
                Verdict::AwaitUser => {
                    self.state.paused_for_user = true;
                    self.state.touch();
                    self.persist().await?;
                    break;
                }
                Verdict::Consensus | Verdict::Closed => {
                    self.state.closed = true;
                    self.state.touch();
                    self.persist().await?;
                    break;
                }
                Verdict::Forced => {
                    self.state.closed = true;
                    self.state.forced = true;
                    self.state.touch();
                    self.persist().await?;
                    break;
                }
            }
        }

        self.publish();
        Ok(self.state.compile_decision())
    }

    /// Invoke the collaborator for one turn. Never fails: an invocation
    /// that exhausts its retry budget is recorded as a turn with default
    /// content and a `Failed` extraction status, and the debate moves on.
    async fn take_turn(&mut self, role: AgentRole, context: &AgentContext) -> Turn {
        self.invocations_this_round += 1;

        let schema = match role {
            AgentRole::Curator => ExpectedSchema::curator(),
            AgentRole::Interpreter => ExpectedSchema::interpreter(),
            _ => ExpectedSchema::reviewer(),
        };

        let agent = Arc::clone(&self.agent);
        let timeout = self.config.agent_timeout();
        let cancel = self.cancel.clone();
        let invoke = with_retry(self.config.max_attempts, self.config.retry_base_delay(), || {
            let agent = Arc::clone(&agent);
            async move {
                match tokio::time::timeout(timeout, agent.invoke(role, context)).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!(
                        "agent invocation timed out after {}s",
                        timeout.as_secs()
                    )),
                }
            }
        });
        // An external close must not wait out a slow collaborator call; the
        // loop notices the cancellation on its next pass and closes cleanly.
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(anyhow!("debate cancelled mid-invocation")),
            result = invoke => result,
        };

        match result {
            Ok(raw) => {
                // Unparseable output is recoverable degradation, not an
                // invocation failure; it never counts toward escalating the
                // round.
                let extraction = extract(&raw, &schema);
                Turn::new(role, raw, extraction.structured, self.state.round, extraction.status)
            }
            Err(e) => {
                error!(
                    case_id = %self.state.case_id,
                    role = %role,
                    round = self.state.round,
                    error = %e,
                    "Agent invocation exhausted its retry budget, recording degraded turn"
                );
                self.failures_this_round += 1;
                Turn::new(
                    role,
                    "",
                    schema.empty_payload(),
                    self.state.round,
                    ExtractionStatus::Failed,
                )
            }
        }
    }

    fn build_context(&self) -> AgentContext {
        AgentContext {
            case_id: self.state.case_id.clone(),
            claim_summary: self.state.claim_summary.clone(),
            round: self.state.round,
            prior_turns: self
                .state
                .log
                .turns()
                .iter()
                .map(|t| ContextTurn {
                    role: t.role,
                    round: t.round,
                    content: t.raw_content.clone(),
                })
                .collect(),
            evidence: self.state.decision.evidence.clone(),
            expense: self.state.decision.expense.clone(),
            unresolved_objections: self
                .state
                .decision
                .blocking_objections()
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    async fn persist(&self) -> Result<(), DebateError> {
        self.store
            .save(&self.state)
            .await
            .map_err(DebateError::storage)
    }

    fn publish(&self) {
        if let Some(tx) = &self.status_tx {
            let _ = tx.send(self.state.snapshot());
        }
    }
}
