// Debate working memory: accumulated decision fields and the final package

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::conversation::ConversationLog;

/// Whether an objection still blocks consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectionStatus {
    Blocking,
    Resolved,
}

impl ObjectionStatus {
    /// Lenient parse. Anything that is not recognizably "resolved" stays
    /// blocking: an objection with a mangled status must not silently
    /// unblock consensus.
    pub fn parse(text: &str) -> Self {
        if text.trim().eq_ignore_ascii_case("resolved") {
            Self::Resolved
        } else {
            Self::Blocking
        }
    }
}

/// A concern raised by the Compliance Reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objection {
    /// Free-text category, e.g. "Invoice Scope Mismatch".
    #[serde(alias = "type")]
    pub kind: String,
    pub status: ObjectionStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_reference: Option<String>,
}

impl Objection {
    /// Build an objection from a loosely-shaped JSON value. Non-objects are
    /// rejected; missing fields get the reviewer's historical defaults.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let kind = obj
            .get("kind")
            .or_else(|| obj.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        let status = obj
            .get("status")
            .and_then(Value::as_str)
            .map(ObjectionStatus::parse)
            .unwrap_or(ObjectionStatus::Blocking);
        let message = obj
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("No message provided")
            .to_string();
        let evidence_reference = obj
            .get("evidence_reference")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            kind,
            status,
            message,
            evidence_reference,
        })
    }

    pub fn is_blocking(&self) -> bool {
        self.status == ObjectionStatus::Blocking
    }
}

/// A policy citation supplied inside interpreter turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(alias = "policy")]
    pub policy_id: String,
    pub section: String,
    #[serde(default)]
    pub page: u32,
    #[serde(alias = "text_excerpt", default)]
    pub excerpt: String,
}

impl Citation {
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Input to start a new case. Evidence arrives pre-extracted from the
/// external document-processing tools; this crate never parses documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseInput {
    /// Caller-supplied case id; generated when absent.
    #[serde(default)]
    pub case_id: Option<String>,
    /// First Notice of Loss narrative.
    pub claim_summary: String,
    #[serde(default)]
    pub date_of_loss: Option<DateTime<Utc>>,
    #[serde(default)]
    pub initial_evidence: Vec<Value>,
}

/// Decision fields merged across turns. List-valued fields accumulate,
/// scalar fields keep the most recent value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionAccumulator {
    /// Interpreter's latest coverage position (Pay / Partial / Deny).
    pub outcome: Option<String>,
    pub rationale: Option<String>,
    pub sensitivity: Option<String>,
    /// Reviewer's latest approval verdict.
    pub approval: bool,
    pub review_summary: Option<String>,
    pub fnol_summary: Option<String>,
    pub evidence: Vec<Value>,
    pub expense: Map<String, Value>,
    pub citations: Vec<Citation>,
    pub objections: Vec<Objection>,
    pub recommendations: Vec<String>,
}

impl DecisionAccumulator {
    /// Merge a curator turn: evidence entries accumulate (entries for an
    /// already-seen image extend its observations instead of duplicating
    /// the entry), expense data reconciles, the FNOL summary overwrites.
    pub fn merge_curator(&mut self, payload: &Map<String, Value>) {
        if let Some(entries) = payload.get("evidence").and_then(Value::as_array) {
            for entry in entries {
                self.merge_evidence_entry(entry);
            }
        }
        if let Some(expense) = payload.get("expense").and_then(Value::as_object) {
            self.merge_expense(expense);
        }
        if let Some(summary) = payload.get("fnol_summary").and_then(Value::as_str) {
            if !summary.is_empty() {
                self.fnol_summary = Some(summary.to_string());
            }
        }
    }

    /// Merge an interpreter turn: position/rationale/sensitivity overwrite,
    /// citations accumulate (exact duplicates dropped).
    pub fn merge_interpreter(&mut self, payload: &Map<String, Value>) {
        for (key, slot) in [
            ("coverage_position", &mut self.outcome),
            ("rationale", &mut self.rationale),
            ("sensitivity", &mut self.sensitivity),
        ] {
            if let Some(text) = payload.get(key).and_then(Value::as_str) {
                if !text.is_empty() {
                    *slot = Some(text.to_string());
                }
            }
        }
        if let Some(citations) = payload.get("citations").and_then(Value::as_array) {
            for value in citations {
                if let Some(citation) = Citation::from_value(value) {
                    if !self.citations.contains(&citation) {
                        self.citations.push(citation);
                    }
                }
            }
        }
    }

    /// Merge a reviewer turn. The reviewer re-emits its full objection set
    /// each round, so an incoming objection replaces the recorded one of
    /// the same kind; that is how a blocking objection becomes resolved.
    pub fn merge_reviewer(&mut self, payload: &Map<String, Value>) {
        if let Some(approval) = payload.get("approval").and_then(Value::as_bool) {
            self.approval = approval;
        }
        if let Some(summary) = payload.get("summary").and_then(Value::as_str) {
            if !summary.is_empty() {
                self.review_summary = Some(summary.to_string());
            }
        }
        if let Some(objections) = payload.get("objections").and_then(Value::as_array) {
            for value in objections {
                if let Some(incoming) = Objection::from_value(value) {
                    match self.objections.iter_mut().find(|o| o.kind == incoming.kind) {
                        Some(existing) => *existing = incoming,
                        None => self.objections.push(incoming),
                    }
                }
            }
        }
        if let Some(recs) = payload.get("recommendations").and_then(Value::as_array) {
            for rec in recs.iter().filter_map(Value::as_str) {
                if !self.recommendations.iter().any(|r| r == rec) {
                    self.recommendations.push(rec.to_string());
                }
            }
        }

        // Keep the verdict consistent with the objection set: approval
        // cannot coexist with blocking objections, and zero blocking means
        // the reviewer has nothing left to withhold approval over.
        let blocking = self.blocking_count();
        if blocking > 0 && self.approval {
            tracing::warn!("Reviewer approved with blocking objections outstanding, revoking");
            self.approval = false;
        } else if blocking == 0 && !self.approval {
            self.approval = true;
        }
    }

    pub fn blocking_objections(&self) -> Vec<&Objection> {
        self.objections.iter().filter(|o| o.is_blocking()).collect()
    }

    pub fn blocking_count(&self) -> usize {
        self.objections.iter().filter(|o| o.is_blocking()).count()
    }

    fn merge_evidence_entry(&mut self, entry: &Value) {
        let incoming_name = entry.get("image_name").and_then(Value::as_str);

        if let Some(name) = incoming_name {
            if let Some(existing) = self
                .evidence
                .iter_mut()
                .find(|e| e.get("image_name").and_then(Value::as_str) == Some(name))
            {
                if let (Some(existing_obj), Some(incoming_obj)) =
                    (existing.as_object_mut(), entry.as_object())
                {
                    let observations = existing_obj
                        .entry("observations")
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let (Some(target), Some(source)) = (
                        observations.as_array_mut(),
                        incoming_obj.get("observations").and_then(Value::as_array),
                    ) {
                        target.extend(source.iter().cloned());
                    }
                    for field in ["global_assessment", "chronology"] {
                        if let Some(value) = incoming_obj.get(field) {
                            if !value.is_null() {
                                existing_obj.insert(field.to_string(), value.clone());
                            }
                        }
                    }
                }
                return;
            }
        }
        self.evidence.push(entry.clone());
    }

    fn merge_expense(&mut self, incoming: &Map<String, Value>) {
        if incoming.is_empty() {
            return;
        }
        // Totals reconcile to the larger figure; line items accumulate;
        // remaining scalar fields fill in only when absent.
        if let Some(total) = incoming.get("total").and_then(Value::as_f64) {
            let current = self.expense.get("total").and_then(Value::as_f64).unwrap_or(0.0);
            if total > current {
                self.expense
                    .insert("total".to_string(), incoming["total"].clone());
            }
        }
        if let Some(items) = incoming.get("line_items").and_then(Value::as_array) {
            let target = self
                .expense
                .entry("line_items")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(target) = target.as_array_mut() {
                target.extend(items.iter().cloned());
            }
        }
        for key in ["vendor", "invoice_number", "invoice_date", "currency", "subtotal", "tax"] {
            if !self.expense.contains_key(key) {
                if let Some(value) = incoming.get(key) {
                    self.expense.insert(key.to_string(), value.clone());
                }
            }
        }
    }
}

/// The orchestrator's working memory for one claim case.
///
/// Owned exclusively by one orchestrator at a time; serialized verbatim at
/// every suspension point and reloaded without replaying any turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateState {
    pub case_id: String,
    pub claim_summary: String,
    #[serde(default)]
    pub date_of_loss: Option<DateTime<Utc>>,
    pub log: ConversationLog,
    /// Current round (1-based).
    pub round: u32,
    /// Turns taken so far within the current round.
    pub position: u32,
    /// True while suspended awaiting new uploads from a human.
    pub paused_for_user: bool,
    /// True once termination fired or the case was explicitly closed.
    pub closed: bool,
    /// True when termination was forced by the round ceiling.
    pub forced: bool,
    /// True when an entire round of agent invocations failed.
    pub errored: bool,
    pub decision: DecisionAccumulator,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Observable lifecycle state, derived from the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    Running,
    Paused,
    Closed,
    Errored,
}

impl DebateState {
    pub fn new(input: CaseInput) -> Self {
        let now = Utc::now();
        let mut state = Self {
            case_id: input
                .case_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            claim_summary: input.claim_summary,
            date_of_loss: input.date_of_loss,
            log: ConversationLog::new(),
            round: 1,
            position: 0,
            paused_for_user: false,
            closed: false,
            forced: false,
            errored: false,
            decision: DecisionAccumulator::default(),
            created_at: now,
            updated_at: now,
        };
        state.decision.evidence = input.initial_evidence;
        state
    }

    pub fn run_state(&self) -> RunState {
        if self.errored {
            RunState::Errored
        } else if self.closed {
            RunState::Closed
        } else if self.paused_for_user {
            RunState::Paused
        } else if self.log.is_empty() {
            RunState::Created
        } else {
            RunState::Running
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            case_id: self.case_id.clone(),
            state: self.run_state(),
            round_count: self.log.round_count(),
            paused_for_user: self.paused_for_user,
            decision_so_far: self.compile_decision(),
        }
    }

    /// Compile the best-known decision from the accumulated state.
    ///
    /// Outcome resolution: the interpreter's position stands only when the
    /// reviewer approved and nothing blocks; blocking objections demote the
    /// case to "Pending Investigation" (naming up to three reasons), and a
    /// missing approval demotes it to "Pending Review".
    pub fn compile_decision(&self) -> DecisionPackage {
        let interpreter_outcome = self
            .decision
            .outcome
            .clone()
            .unwrap_or_else(|| "Deny".to_string());
        let blocking = self.decision.blocking_objections();

        let (outcome, rationale) = if self.decision.approval && blocking.is_empty() {
            (
                interpreter_outcome,
                self.decision
                    .rationale
                    .clone()
                    .unwrap_or_else(|| "Unable to determine coverage".to_string()),
            )
        } else if !blocking.is_empty() {
            let reasons: Vec<&str> = blocking
                .iter()
                .take(3)
                .map(|o| o.message.as_str())
                .collect();
            (
                "Pending Investigation".to_string(),
                format!(
                    "The claim requires further investigation due to {} blocking objection(s): {}. \
                     Original interpreter recommendation was '{}', but compliance review identified \
                     issues that must be resolved before final determination.",
                    blocking.len(),
                    reasons.join("; "),
                    interpreter_outcome,
                ),
            )
        } else {
            (
                "Pending Review".to_string(),
                format!(
                    "The claim requires additional review. Original interpreter recommendation \
                     was '{}', but the compliance reviewer has not provided final approval.",
                    interpreter_outcome,
                ),
            )
        };

        DecisionPackage {
            case_id: self.case_id.clone(),
            outcome,
            rationale,
            sensitivity: self.decision.sensitivity.clone().unwrap_or_default(),
            citations: self.decision.citations.clone(),
            objections: self.decision.objections.clone(),
            evidence: self.decision.evidence.clone(),
            expense: self.decision.expense.clone(),
            approval: self.decision.approval,
            round_count: self.log.round_count(),
            forced: self.forced,
        }
    }
}

/// Point-in-time view of a case for status queries and watch channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub case_id: String,
    pub state: RunState,
    pub round_count: u32,
    pub paused_for_user: bool,
    pub decision_so_far: DecisionPackage,
}

/// The final (or best-known partial) output of a debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionPackage {
    pub case_id: String,
    pub outcome: String,
    pub rationale: String,
    pub sensitivity: String,
    pub citations: Vec<Citation>,
    pub objections: Vec<Objection>,
    pub evidence: Vec<Value>,
    pub expense: Map<String, Value>,
    pub approval: bool,
    pub round_count: u32,
    /// Termination was forced by the round ceiling; unresolved objections
    /// remain. Distinguishable downstream from genuine consensus.
    pub forced: bool,
}
