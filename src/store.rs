// Durable state storage
//
// One serialized DebateState per case, written at every suspension point
// and reloaded verbatim on resumption. The trait keeps real persistence
// swappable; the file store writes atomically (temp file + rename) so a
// crash mid-save never leaves a torn state behind.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;

use crate::state::DebateState;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, state: &DebateState) -> Result<()>;
    async fn load(&self, case_id: &str) -> Result<Option<DebateState>>;
    /// Move a closed case out of the active set. Archived cases no longer
    /// `load`.
    async fn archive(&self, case_id: &str) -> Result<()>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    active: DashMap<String, DebateState>,
    archived: DashMap<String, DebateState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn archived_contains(&self, case_id: &str) -> bool {
        self.archived.contains_key(case_id)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn save(&self, state: &DebateState) -> Result<()> {
        self.active.insert(state.case_id.clone(), state.clone());
        Ok(())
    }

    async fn load(&self, case_id: &str) -> Result<Option<DebateState>> {
        Ok(self.active.get(case_id).map(|entry| entry.clone()))
    }

    async fn archive(&self, case_id: &str) -> Result<()> {
        if let Some((id, state)) = self.active.remove(case_id) {
            self.archived.insert(id, state);
        }
        Ok(())
    }
}

/// File-backed store: `<root>/<case_id>.json`, archived cases under
/// `<root>/archive/`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default location under the platform data directory.
    pub fn default_location() -> Result<Self> {
        let base = dirs::data_dir().context("Could not determine platform data directory")?;
        Ok(Self::new(base.join("aegis/cases")))
    }

    fn case_path(&self, case_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_id(case_id)))
    }

    fn archive_path(&self, case_id: &str) -> PathBuf {
        self.root
            .join("archive")
            .join(format!("{}.json", sanitize_id(case_id)))
    }
}

/// Case ids become file names; strip anything that could escape the root.
fn sanitize_id(case_id: &str) -> String {
    case_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .context("State path has no parent directory")?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("Failed to create {}", parent.display()))?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move state into place at {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn save(&self, state: &DebateState) -> Result<()> {
        let bytes =
            serde_json::to_vec_pretty(state).context("Failed to serialize debate state")?;
        write_atomic(&self.case_path(&state.case_id), &bytes).await
    }

    async fn load(&self, case_id: &str) -> Result<Option<DebateState>> {
        let path = self.case_path(case_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let state = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt debate state at {}", path.display()))?;
        Ok(Some(state))
    }

    async fn archive(&self, case_id: &str) -> Result<()> {
        let from = self.case_path(case_id);
        if tokio::fs::try_exists(&from).await.unwrap_or(false) {
            let to = self.archive_path(case_id);
            if let Some(parent) = to.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::rename(&from, &to)
                .await
                .with_context(|| format!("Failed to archive {}", from.display()))?;
        }
        Ok(())
    }
}
