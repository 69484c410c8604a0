use chrono::{DateTime, Utc};
use hive_core::{HiveError, HiveResult};
use hive_coord::HubSnapshot;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// One abandoned agent in a checkpoint or final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbandonEntry {
    /// The abandoned agent.
    pub agent_id: String,
    /// Why it was abandoned.
    pub reason: String,
    /// Whether the orchestrator synthesized its deliverables.
    pub deliverables_synthesized: bool,
}

/// One failed agent in a checkpoint or final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEntry {
    /// The failing agent.
    pub agent_id: String,
    /// The most recent error.
    pub last_error: String,
    /// Every failure message across attempts, oldest first.
    pub retry_history: Vec<String>,
    /// The substitute that took over, if a handoff happened.
    pub substitute: Option<String>,
}

/// Resumable snapshot of a run: terminal agent sets plus hub state.
///
/// Resumption loads the file, places recorded agents in their terminal sets,
/// and continues from `recompute_ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The run this snapshot belongs to.
    pub run_id: Uuid,
    /// Completed agent ids.
    pub completed: Vec<String>,
    /// Failure records (reporting only; scheduling state is in `abandoned`).
    pub failed: Vec<FailureEntry>,
    /// Abandoned agents with reasons.
    pub abandoned: Vec<AbandonEntry>,
    /// Artifact map, file registry, decisions, and completed-task lines.
    pub hub: HubSnapshot,
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Writes the snapshot atomically (temp file, then rename).
    pub async fn save(&self, path: &Path) -> HiveResult<()> {
        let body = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Loads a snapshot from disk.
    pub async fn load(path: &Path) -> HiveResult<Self> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| HiveError::Config(format!("cannot read checkpoint {}: {e}", path.display())))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}
