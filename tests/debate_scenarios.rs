// End-to-end debate scenarios: full runs through the orchestrator and the
// case manager with scripted collaborators.

use std::sync::Arc;

use serde_json::json;

use aegis::agents::ScriptedAgent;
use aegis::orchestrator::DebateOrchestrator;
use aegis::selector;
use aegis::{
    AgentRole, CaseInput, CaseManager, DebateConfig, DebateError, MemoryStore, RunState,
    StateStore,
};

fn test_config() -> DebateConfig {
    DebateConfig {
        max_rounds: 3,
        agent_timeout_secs: 5,
        max_attempts: 1,
        retry_base_delay_ms: 10,
    }
}

fn input(case_id: &str) -> CaseInput {
    CaseInput {
        case_id: Some(case_id.to_string()),
        claim_summary: "burst pipe flooded the kitchen, invoice for repairs attached".to_string(),
        ..Default::default()
    }
}

fn orchestrator(agent: ScriptedAgent, store: Arc<MemoryStore>) -> DebateOrchestrator {
    DebateOrchestrator::new(input("case-1"), Arc::new(agent), store, test_config())
}

fn curator_payload() -> serde_json::Value {
    json!({
        "evidence": [{"image_name": "kitchen.jpg",
                      "observations": [{"label": "water damage", "confidence": 0.9}]}],
        "expense": {"total": 1200.0, "vendor": "AquaFix", "line_items": [{"amount": 1200.0}]},
        "fnol_summary": "Sudden pipe burst under the kitchen sink"
    })
}

fn interpreter_payload(position: &str) -> serde_json::Value {
    json!({
        "coverage_position": position,
        "rationale": "Sudden and accidental water discharge is a covered peril",
        "citations": [{"policy_id": "HO-3", "section": "Perils Insured Against",
                       "page": 7, "excerpt": "sudden and accidental discharge of water"}]
    })
}

#[tokio::test(start_paused = true)]
async fn clean_claim_reaches_consensus_in_one_round() {
    let agent = ScriptedAgent::new()
        .say_json(AgentRole::Curator, curator_payload())
        .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
        .say_json(
            AgentRole::Reviewer,
            json!({"approval": true, "objections": [], "summary": "No concerns"}),
        );
    let store = Arc::new(MemoryStore::new());
    let mut orch = orchestrator(agent, store.clone());

    let package = orch.run().await.unwrap();

    assert_eq!(package.outcome, "Pay");
    assert!(package.approval);
    assert!(!package.forced);
    assert_eq!(package.round_count, 1);
    assert_eq!(package.citations.len(), 1);
    assert_eq!(orch.state().log.len(), 3);

    // Turn order within the round
    let roles: Vec<_> = orch.state().log.turns().iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        [AgentRole::Curator, AgentRole::Interpreter, AgentRole::Reviewer]
    );

    // Terminal state was persisted
    let saved = store.load("case-1").await.unwrap().unwrap();
    assert!(saved.closed);
}

#[tokio::test(start_paused = true)]
async fn blocking_objection_resolved_in_second_round() {
    let agent = ScriptedAgent::new()
        // Round 1: the reviewer objects to an invoice total mismatch
        .say_json(AgentRole::Curator, curator_payload())
        .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
        .say_json(
            AgentRole::Reviewer,
            json!({"approval": false,
                   "objections": [{"kind": "Invoice Scope Mismatch", "status": "Blocking",
                                   "message": "line items exceed the claimed damage"}]}),
        )
        // Round 2: updated evidence satisfies the reviewer
        .say_json(
            AgentRole::Curator,
            json!({"evidence": [{"image_name": "invoice.pdf",
                                 "observations": [{"label": "itemized repair invoice"}]}]}),
        )
        .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
        .say_json(
            AgentRole::Reviewer,
            json!({"approval": true,
                   "objections": [{"kind": "Invoice Scope Mismatch", "status": "Resolved",
                                   "message": "itemization matches the damage"}]}),
        );
    let mut orch = orchestrator(agent, Arc::new(MemoryStore::new()));

    let package = orch.run().await.unwrap();

    assert_eq!(orch.state().log.len(), 6);
    assert_eq!(package.round_count, 2);
    assert_eq!(package.outcome, "Pay");
    assert!(!package.forced);
    // The objection survives in the record, resolved
    assert_eq!(package.objections.len(), 1);
    assert!(!package.objections[0].is_blocking());
}

#[tokio::test(start_paused = true)]
async fn unresolved_objections_force_termination_at_the_ceiling() {
    let mut agent = ScriptedAgent::new();
    for _ in 0..3 {
        agent = agent
            .say_json(AgentRole::Curator, curator_payload())
            .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
            .say_json(
                AgentRole::Reviewer,
                json!({"approval": false,
                       "objections": [{"kind": "Staged Loss Indicators", "status": "Blocking",
                                       "message": "photo metadata predates the reported loss"}]}),
            );
    }
    let mut orch = orchestrator(agent, Arc::new(MemoryStore::new()));

    let package = orch.run().await.unwrap();

    assert_eq!(orch.state().log.len(), 9);
    assert_eq!(
        orch.state().log.turns_by_role(AgentRole::Reviewer).len(),
        3
    );
    assert_eq!(package.round_count, 3);
    assert!(package.forced);
    assert_eq!(package.outcome, "Pending Investigation");
    assert!(package.rationale.contains("photo metadata"));
    assert!(package.rationale.contains("'Pay'"));
}

#[tokio::test(start_paused = true)]
async fn pause_resumes_in_the_same_round_at_the_curator_step() {
    let agent = ScriptedAgent::new()
        .say_json(AgentRole::Curator, curator_payload())
        .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
        .say_json(
            AgentRole::Reviewer,
            json!({"approval": false, "needs_user_input": true,
                   "objections": [{"kind": "Missing Invoice", "status": "Blocking",
                                   "message": "no repair invoice on file"}]}),
        )
        // Post-resume: the injected evidence occupies the curator slot, so
        // the script only needs the interpreter and reviewer
        .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
        .say_json(
            AgentRole::Reviewer,
            json!({"approval": true,
                   "objections": [{"kind": "Missing Invoice", "status": "Resolved",
                                   "message": "invoice received"}]}),
        );
    let store = Arc::new(MemoryStore::new());
    let mut orch = orchestrator(agent, store.clone());

    let package = orch.run().await.unwrap();
    assert!(orch.state().paused_for_user);
    assert_eq!(package.outcome, "Pending Investigation");

    // The suspended state round-trips through the store and still knows
    // the curator speaks next, in the same round
    let saved = store.load("case-1").await.unwrap().unwrap();
    let (round, position) = selector::resume_point(&saved.log, saved.paused_for_user);
    assert_eq!(round, 1);
    assert_eq!(selector::speaker_for(round, position), AgentRole::Curator);

    let package = orch
        .resume(vec![json!({"image_name": "invoice.pdf",
                            "observations": [{"label": "repair invoice, $1200"}]})])
        .await
        .unwrap();

    assert_eq!(package.outcome, "Pay");
    assert_eq!(package.round_count, 1);
    assert!(!package.forced);
    // 3 original + 1 injected + interpreter + reviewer
    assert_eq!(orch.state().log.len(), 6);
    let injected = &orch.state().log.turns()[3];
    assert_eq!(injected.role, AgentRole::Curator);
    assert_eq!(injected.round, 1);
}

#[tokio::test(start_paused = true)]
async fn suspended_case_survives_a_process_restart() {
    let store = Arc::new(MemoryStore::new());
    let agent = ScriptedAgent::new()
        .say_json(AgentRole::Curator, curator_payload())
        .say_json(AgentRole::Interpreter, interpreter_payload("Partial"))
        .say_json(
            AgentRole::Reviewer,
            json!({"approval": false, "needs_user_input": true,
                   "objections": [{"kind": "Coverage Question", "status": "Blocking",
                                   "message": "need the policy declarations page"}]}),
        );
    let mut orch = orchestrator(agent, store.clone());
    orch.run().await.unwrap();
    drop(orch);

    // A different process picks the case up from storage
    let saved = store.load("case-1").await.unwrap().unwrap();
    assert_eq!(saved.run_state(), RunState::Paused);

    let agent = ScriptedAgent::new()
        .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
        .say_json(
            AgentRole::Reviewer,
            json!({"approval": true,
                   "objections": [{"kind": "Coverage Question", "status": "Resolved",
                                   "message": "declarations page confirms coverage"}]}),
        );
    let mut orch =
        DebateOrchestrator::from_state(saved, Arc::new(agent), store.clone(), test_config());

    let package = orch
        .resume(vec![json!({"image_name": "declarations.pdf", "observations": []})])
        .await
        .unwrap();

    assert_eq!(package.outcome, "Pay");
    assert_eq!(package.round_count, 1);
    // Earlier accumulations survived the restart
    assert_eq!(package.expense["vendor"], json!("AquaFix"));
}

#[tokio::test(start_paused = true)]
async fn garbled_reviewer_output_never_reads_as_consensus() {
    let agent = ScriptedAgent::new()
        .say_json(AgentRole::Curator, curator_payload())
        .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
        // No JSON anywhere in the reviewer's reply
        .say(
            AgentRole::Reviewer,
            "Everything looks broadly reasonable to me, no notes.",
        )
        .say_json(AgentRole::Curator, json!({}))
        .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
        .say_json(
            AgentRole::Reviewer,
            json!({"approval": true, "objections": []}),
        );
    let mut orch = orchestrator(agent, Arc::new(MemoryStore::new()));

    let package = orch.run().await.unwrap();

    // The garbled round did not terminate the debate; round 2 did
    assert_eq!(package.round_count, 2);
    assert_eq!(package.outcome, "Pay");
    assert!(!package.forced);
    assert_eq!(
        orch.state().log.turns()[2].extraction_status,
        aegis::extraction::ExtractionStatus::Failed
    );
}

#[tokio::test(start_paused = true)]
async fn all_prose_round_degrades_but_the_debate_continues() {
    // Every agent answers, none with parseable JSON: that is degraded
    // information, not a failed round, and the debate proceeds
    let agent = ScriptedAgent::new()
        .say(AgentRole::Curator, "The photos show water damage near the sink.")
        .say(AgentRole::Interpreter, "This looks like a covered peril to me.")
        .say(AgentRole::Reviewer, "I have no structured objections to offer.")
        .say_json(AgentRole::Curator, curator_payload())
        .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
        .say_json(
            AgentRole::Reviewer,
            json!({"approval": true, "objections": []}),
        );
    let mut orch = orchestrator(agent, Arc::new(MemoryStore::new()));

    let package = orch.run().await.unwrap();

    assert_eq!(package.outcome, "Pay");
    assert_eq!(package.round_count, 2);
    assert!(!package.forced);
    assert_ne!(orch.state().run_state(), RunState::Errored);
    for turn in &orch.state().log.turns()[..3] {
        assert_eq!(
            turn.extraction_status,
            aegis::extraction::ExtractionStatus::Failed
        );
    }
}

#[tokio::test(start_paused = true)]
async fn total_round_failure_surfaces_partial_decision() {
    let agent = ScriptedAgent::new()
        // Round 1 succeeds but leaves a blocking objection
        .say_json(AgentRole::Curator, curator_payload())
        .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
        .say_json(
            AgentRole::Reviewer,
            json!({"approval": false,
                   "objections": [{"kind": "Scope", "status": "Blocking", "message": "mismatch"}]}),
        );
    // Round 2: the script is exhausted, every invocation fails
    let mut orch = orchestrator(agent, Arc::new(MemoryStore::new()));

    match orch.run().await {
        Err(DebateError::RoundFailed { round, partial }) => {
            assert_eq!(round, 2);
            // Round 1's work is preserved in the partial package
            assert_eq!(partial.objections.len(), 1);
            assert_eq!(partial.outcome, "Pending Investigation");
            assert_eq!(partial.expense["total"], json!(1200.0));
        }
        other => panic!("expected RoundFailed, got {other:?}"),
    }
    assert_eq!(orch.state().run_state(), RunState::Errored);
}

#[tokio::test(start_paused = true)]
async fn manager_runs_concurrent_cases_independently() {
    let agent = ScriptedAgent::new()
        // Two interleaved clean cases share one scripted collaborator; per
        // role the replies are order-insensitive here
        .say_json(AgentRole::Curator, curator_payload())
        .say_json(AgentRole::Curator, curator_payload())
        .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
        .say_json(AgentRole::Interpreter, interpreter_payload("Pay"))
        .say_json(AgentRole::Reviewer, json!({"approval": true, "objections": []}))
        .say_json(AgentRole::Reviewer, json!({"approval": true, "objections": []}));
    let manager = CaseManager::new(
        Arc::new(agent),
        Arc::new(MemoryStore::new()),
        test_config(),
    );

    let a = manager.start(input("case-a")).await.unwrap();
    let b = manager.start(input("case-b")).await.unwrap();

    let package_a = manager.wait(&a).await.unwrap();
    let package_b = manager.wait(&b).await.unwrap();

    assert_eq!(package_a.case_id, "case-a");
    assert_eq!(package_b.case_id, "case-b");
    assert_eq!(package_a.outcome, "Pay");
    assert_eq!(package_b.outcome, "Pay");
}
