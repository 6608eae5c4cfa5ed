// Case lifecycle management across concurrent debates
//
// One manager serves many cases; each case gets its own spawned debate
// task, cancellation token, and status watch channel. The manager is the
// single writer for any case that is not actively running: suspended and
// closed cases are manipulated through their persisted state, never by
// reaching into a live orchestrator.

use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agents::AgentCollaborator;
use crate::config::DebateConfig;
use crate::error::DebateError;
use crate::orchestrator::DebateOrchestrator;
use crate::state::{CaseInput, DebateState, DecisionPackage, StatusSnapshot};
use crate::store::StateStore;

type DebateTask = JoinHandle<Result<DecisionPackage, DebateError>>;

struct CaseHandle {
    cancel: CancellationToken,
    /// Replaced with a fresh channel on every resume.
    status_rx: RwLock<watch::Receiver<StatusSnapshot>>,
    task: Mutex<Option<DebateTask>>,
}

/// Entry point for running debates. Cheap to clone via `Arc`; all methods
/// take `&self`.
pub struct CaseManager {
    agent: Arc<dyn AgentCollaborator>,
    store: Arc<dyn StateStore>,
    config: DebateConfig,
    cases: DashMap<String, Arc<CaseHandle>>,
}

impl CaseManager {
    pub fn new(
        agent: Arc<dyn AgentCollaborator>,
        store: Arc<dyn StateStore>,
        config: DebateConfig,
    ) -> Self {
        Self {
            agent,
            store,
            config,
            cases: DashMap::new(),
        }
    }

    /// Start a debate for a new case. Returns the case id immediately; the
    /// debate runs in a background task. Follow with [`wait`] for the
    /// decision or [`status`] for progress.
    ///
    /// [`wait`]: CaseManager::wait
    /// [`status`]: CaseManager::status
    pub async fn start(&self, input: CaseInput) -> Result<String, DebateError> {
        let orch = DebateOrchestrator::new(
            input,
            Arc::clone(&self.agent),
            Arc::clone(&self.store),
            self.config.clone(),
        );
        let case_id = orch.case_id().to_string();

        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(orch.state().snapshot());
        let handle = Arc::new(CaseHandle {
            cancel: cancel.clone(),
            status_rx: RwLock::new(rx),
            task: Mutex::new(None),
        });

        // Reserve the id before the first await so a concurrent start with
        // the same id cannot slip in and spawn a second orchestrator. The
        // task slot stays locked until the task exists, so waiters block
        // instead of observing a reserved-but-empty handle.
        let mut task = handle.task.lock().await;
        match self.cases.entry(case_id.clone()) {
            Entry::Occupied(_) => return Err(DebateError::CaseAlreadyActive(case_id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&handle));
            }
        }

        if let Err(e) = self.store.save(orch.state()).await {
            self.cases.remove(&case_id);
            return Err(DebateError::storage(e));
        }

        let mut orch = orch
            .with_cancellation(cancel)
            .with_status_sender(tx);

        info!(case_id = %case_id, "Starting debate");
        *task = Some(tokio::spawn(async move { orch.run().await }));
        Ok(case_id)
    }

    /// Start a debate and wait for it to suspend or terminate.
    pub async fn run_case(&self, input: CaseInput) -> Result<DecisionPackage, DebateError> {
        let case_id = self.start(input).await?;
        self.wait(&case_id).await
    }

    /// Wait for the case's current run to finish (terminate or suspend)
    /// and return the best-known decision package.
    pub async fn wait(&self, case_id: &str) -> Result<DecisionPackage, DebateError> {
        let handle = self.handle(case_id)?;
        let mut task = handle.task.lock().await;
        match task.take() {
            Some(join) => join
                .await
                .map_err(|_| DebateError::TaskDied(case_id.to_string()))?,
            // Already collected by an earlier wait; recompile from the
            // persisted state.
            None => Ok(self.load_state(case_id).await?.compile_decision()),
        }
    }

    /// Point-in-time status. Served from the live watch channel while a
    /// debate task is running (the store lags behind it), otherwise from
    /// the persisted state.
    pub async fn status(&self, case_id: &str) -> Result<StatusSnapshot, DebateError> {
        if let Some(entry) = self.cases.get(case_id) {
            let handle = Arc::clone(&entry);
            drop(entry);
            // A held task lock means someone is waiting on or restarting
            // the debate; treat that as running too.
            let running = match handle.task.try_lock() {
                Ok(task) => task.as_ref().is_some_and(|join| !join.is_finished()),
                Err(_) => true,
            };
            if running {
                let rx = handle
                    .status_rx
                    .read()
                    .map_err(|_| DebateError::storage(anyhow!("status channel lock poisoned")))?;
                return Ok(rx.borrow().clone());
            }
        }
        Ok(self.load_state(case_id).await?.snapshot())
    }

    /// Subscribe to live status updates for a running case.
    pub fn watch(&self, case_id: &str) -> Result<watch::Receiver<StatusSnapshot>, DebateError> {
        let handle = self.handle(case_id)?;
        let rx = handle
            .status_rx
            .read()
            .map_err(|_| DebateError::storage(anyhow!("status channel lock poisoned")))?;
        Ok(rx.clone())
    }

    /// Resume a suspended case, optionally injecting new human-supplied
    /// evidence. The debate continues in a background task; `wait` for the
    /// outcome as with `start`.
    pub async fn resume(
        &self,
        case_id: &str,
        new_evidence: Vec<Value>,
    ) -> Result<(), DebateError> {
        let handle = match self.cases.get(case_id) {
            Some(entry) => Arc::clone(&entry),
            // Known to the store but not this process (e.g. after a
            // restart): adopt it. Entry keeps two concurrent adoptions of
            // the same id from racing past each other; the loser reuses the
            // winner's handle and serializes on its task lock below.
            None => {
                self.load_state(case_id).await?;
                match self.cases.entry(case_id.to_string()) {
                    Entry::Occupied(entry) => Arc::clone(entry.get()),
                    Entry::Vacant(slot) => {
                        let handle = Arc::new(CaseHandle {
                            cancel: CancellationToken::new(),
                            status_rx: RwLock::new(watch::channel(empty_snapshot(case_id)).1),
                            task: Mutex::new(None),
                        });
                        slot.insert(Arc::clone(&handle));
                        handle
                    }
                }
            }
        };

        let mut task = handle.task.lock().await;
        if let Some(join) = task.take() {
            if !join.is_finished() {
                *task = Some(join);
                return Err(DebateError::CaseNotPaused(case_id.to_string()));
            }
            let _ = join.await;
        }

        let state = self.load_state(case_id).await?;
        let (tx, rx) = watch::channel(state.snapshot());
        let mut orch = DebateOrchestrator::from_state(
            state,
            Arc::clone(&self.agent),
            Arc::clone(&self.store),
            self.config.clone(),
        )
        .with_cancellation(handle.cancel.clone())
        .with_status_sender(tx);

        // Fail fast on lifecycle misuse before spawning anything.
        if orch.state().closed {
            return Err(DebateError::CaseClosed(case_id.to_string()));
        }
        if !orch.state().paused_for_user {
            return Err(DebateError::CaseNotPaused(case_id.to_string()));
        }

        *handle
            .status_rx
            .write()
            .map_err(|_| DebateError::storage(anyhow!("status channel lock poisoned")))? = rx;

        info!(case_id = %case_id, items = new_evidence.len(), "Resuming debate");
        *task = Some(tokio::spawn(async move { orch.resume(new_evidence).await }));
        Ok(())
    }

    /// Close a case. A running debate is cancelled and allowed to wind
    /// down; a suspended one is closed directly in the store.
    pub async fn close(&self, case_id: &str) -> Result<(), DebateError> {
        if let Some(entry) = self.cases.get(case_id) {
            let handle = Arc::clone(&entry);
            drop(entry);
            handle.cancel.cancel();
            let mut task = handle.task.lock().await;
            if let Some(join) = task.take() {
                // The orchestrator persists the closed state on its way out
                let _ = join.await;
                return Ok(());
            }
        }

        let mut state = self.load_state(case_id).await?;
        if !state.closed {
            state.closed = true;
            state.touch();
            self.store
                .save(&state)
                .await
                .map_err(DebateError::storage)?;
        }
        Ok(())
    }

    /// Reopen a closed case. It comes back suspended, awaiting new
    /// evidence through [`resume`].
    ///
    /// [`resume`]: CaseManager::resume
    pub async fn reopen(&self, case_id: &str) -> Result<(), DebateError> {
        if let Some(entry) = self.cases.get(case_id) {
            let handle = Arc::clone(&entry);
            drop(entry);
            let task = handle.task.lock().await;
            if task.as_ref().is_some_and(|t| !t.is_finished()) {
                return Err(DebateError::CaseNotClosed(case_id.to_string()));
            }
        }

        let mut state = self.load_state(case_id).await?;
        if !state.closed {
            return Err(DebateError::CaseNotClosed(case_id.to_string()));
        }
        info!(case_id = %case_id, "Reopening closed case");
        state.closed = false;
        state.errored = false;
        state.forced = false;
        state.paused_for_user = true;
        state.touch();
        self.store
            .save(&state)
            .await
            .map_err(DebateError::storage)
    }

    /// Move a closed case into the archive. Archived cases no longer load.
    pub async fn archive(&self, case_id: &str) -> Result<(), DebateError> {
        let state = self.load_state(case_id).await?;
        if !state.closed {
            return Err(DebateError::CaseNotClosed(case_id.to_string()));
        }
        self.store
            .archive(case_id)
            .await
            .map_err(DebateError::storage)?;
        self.cases.remove(case_id);
        Ok(())
    }

    fn handle(&self, case_id: &str) -> Result<Arc<CaseHandle>, DebateError> {
        self.cases
            .get(case_id)
            .map(|entry| Arc::clone(&entry))
            .ok_or_else(|| DebateError::CaseNotFound(case_id.to_string()))
    }

    async fn load_state(&self, case_id: &str) -> Result<DebateState, DebateError> {
        self.store
            .load(case_id)
            .await
            .map_err(DebateError::storage)?
            .ok_or_else(|| DebateError::CaseNotFound(case_id.to_string()))
    }
}

fn empty_snapshot(case_id: &str) -> StatusSnapshot {
    DebateState::new(CaseInput {
        case_id: Some(case_id.to_string()),
        ..Default::default()
    })
    .snapshot()
}
