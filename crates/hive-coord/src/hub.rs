use chrono::{DateTime, Utc};
use hive_core::{AgentResult, Artifact};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Maximum length of one completed-task line injected into prompts.
const COMPLETED_LINE_MAX: usize = 200;

/// A recorded design decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// The agent that made the decision.
    pub agent: String,
    /// What was decided.
    pub decision: String,
    /// Why it was decided.
    pub rationale: String,
    /// When it was recorded.
    pub at: DateTime<Utc>,
}

/// Attribution of one output file to the agents that touched it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttribution {
    /// The file path.
    pub path: PathBuf,
    /// The agent that first wrote the file.
    pub producer: String,
    /// Later agents that modified it, in acquisition order.
    pub modifiers: Vec<String>,
    /// Size of the most recent write in bytes.
    pub bytes: u64,
    /// When the file was first registered.
    pub registered_at: DateTime<Utc>,
}

/// One entry in the inter-agent message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubMessage {
    /// Sending agent.
    pub from: String,
    /// Target agent, or `None` for a broadcast.
    pub to: Option<String>,
    /// Message body.
    pub content: String,
    /// When the message was logged.
    pub at: DateTime<Utc>,
}

/// Serializable snapshot of hub state, used for checkpoints and the final
/// run context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubSnapshot {
    /// All artifacts shared so far, in order.
    pub artifacts: Vec<Artifact>,
    /// The file registry.
    pub files: Vec<FileAttribution>,
    /// Recorded decisions.
    pub decisions: Vec<Decision>,
    /// The flat completed-task lines.
    pub completed_tasks: Vec<String>,
}

#[derive(Default)]
struct HubState {
    results: HashMap<String, AgentResult>,
    history: HashMap<String, Vec<AgentResult>>,
    artifacts: Vec<Artifact>,
    files: Vec<FileAttribution>,
    decisions: Vec<Decision>,
    messages: Vec<HubMessage>,
    completed_lines: Vec<String>,
}

/// Shared context through which agents exchange structured artifacts and
/// observe prior work.
///
/// The artifact map is append-only and first-writer-wins per key; a repeat
/// write of the same key lands under a suffixed key (`<key>#2`, …) with a
/// warning. The only rendering of prior work visible inside prompts is the
/// flat list of short strings from [`CommunicationHub::summarize_completed`];
/// structured data never crosses that boundary.
#[derive(Default)]
pub struct CommunicationHub {
    state: RwLock<HubState>,
}

impl CommunicationHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the result of an agent invocation attempt. A retry overwrites
    /// the current result; the previous attempt is preserved in history.
    pub async fn record_result(&self, result: AgentResult) {
        let mut state = self.state.write().await;
        if let Some(previous) = state.results.remove(&result.agent_id) {
            state
                .history
                .entry(result.agent_id.clone())
                .or_default()
                .push(previous);
        }
        state.results.insert(result.agent_id.clone(), result);
    }

    /// Current result for an agent, if any attempt has finished.
    pub async fn result_for(&self, agent_id: &str) -> Option<AgentResult> {
        self.state.read().await.results.get(agent_id).cloned()
    }

    /// Prior attempts for an agent, oldest first.
    pub async fn history_for(&self, agent_id: &str) -> Vec<AgentResult> {
        self.state
            .read()
            .await
            .history
            .get(agent_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Shares an artifact. First write wins: a repeat write of the same key
    /// is stored under a suffixed key and a warning is emitted. Returns the
    /// key the artifact was stored under.
    pub async fn share_artifact(
        &self,
        key: &str,
        payload: serde_json::Value,
        producer: &str,
        content_type: &str,
    ) -> String {
        let mut state = self.state.write().await;
        let stored_key = if state.artifacts.iter().any(|a| a.key == key) {
            let mut n = 2;
            while state
                .artifacts
                .iter()
                .any(|a| a.key == format!("{key}#{n}"))
            {
                n += 1;
            }
            let suffixed = format!("{key}#{n}");
            warn!(
                key = %key,
                stored_as = %suffixed,
                producer = %producer,
                "Artifact key already taken; storing under suffixed key"
            );
            suffixed
        } else {
            key.to_string()
        };
        state.artifacts.push(Artifact::new(
            stored_key.clone(),
            producer,
            payload,
            content_type,
        ));
        debug!(key = %stored_key, producer = %producer, "Artifact shared");
        stored_key
    }

    /// Fetches the artifact stored under `key`, if any.
    pub async fn get_artifact(&self, key: &str) -> Option<Artifact> {
        self.state
            .read()
            .await
            .artifacts
            .iter()
            .find(|a| a.key == key)
            .cloned()
    }

    /// All artifacts shared so far, in share order.
    pub async fn artifacts(&self) -> Vec<Artifact> {
        self.state.read().await.artifacts.clone()
    }

    /// Artifacts matching an agent's declared interests: by key when `keys`
    /// is non-empty, otherwise everything produced by the given producers.
    pub async fn artifacts_matching(&self, keys: &[String], producers: &[String]) -> Vec<Artifact> {
        let state = self.state.read().await;
        state
            .artifacts
            .iter()
            .filter(|a| {
                if keys.is_empty() {
                    producers.iter().any(|p| p == &a.producer)
                } else {
                    let base = a.key.split('#').next().unwrap_or(&a.key);
                    keys.iter().any(|k| k == base)
                }
            })
            .cloned()
            .collect()
    }

    /// Registers a file write. Idempotent: a repeat registration by the same
    /// producer only refreshes the byte count; a different producer is
    /// recorded as a modifier rather than replacing the original.
    pub async fn register_file(&self, path: &Path, producer: &str, bytes: u64) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.files.iter_mut().find(|f| f.path == path) {
            entry.bytes = bytes;
            if entry.producer != producer && !entry.modifiers.iter().any(|m| m == producer) {
                entry.modifiers.push(producer.to_string());
            }
        } else {
            state.files.push(FileAttribution {
                path: path.to_path_buf(),
                producer: producer.to_string(),
                modifiers: Vec::new(),
                bytes,
                registered_at: Utc::now(),
            });
        }
    }

    /// Whether any agent has registered `path`.
    pub async fn has_file(&self, path: &Path) -> bool {
        self.state.read().await.files.iter().any(|f| f.path == path)
    }

    /// The full file registry, in registration order.
    pub async fn file_registry(&self) -> Vec<FileAttribution> {
        self.state.read().await.files.clone()
    }

    /// Records a design decision.
    pub async fn record_decision(&self, agent: &str, decision: &str, rationale: &str) {
        let mut state = self.state.write().await;
        state.decisions.push(Decision {
            agent: agent.to_string(),
            decision: decision.to_string(),
            rationale: rationale.to_string(),
            at: Utc::now(),
        });
    }

    /// Appends to the inter-agent message log.
    pub async fn record_message(&self, from: &str, to: Option<&str>, content: &str) {
        let mut state = self.state.write().await;
        state.messages.push(HubMessage {
            from: from.to_string(),
            to: to.map(str::to_string),
            content: content.to_string(),
            at: Utc::now(),
        });
    }

    /// The message log, in order.
    pub async fn messages(&self) -> Vec<HubMessage> {
        self.state.read().await.messages.clone()
    }

    /// Appends one completed-task line. Only flat short strings cross this
    /// boundary: newlines are folded and overlong lines truncated.
    pub async fn push_completed_line(&self, line: &str) {
        let mut flat = line.replace('\n', "; ");
        if flat.len() > COMPLETED_LINE_MAX {
            let mut cut = COMPLETED_LINE_MAX;
            while !flat.is_char_boundary(cut) {
                cut -= 1;
            }
            flat.truncate(cut);
            flat.push_str("...");
        }
        self.state.write().await.completed_lines.push(flat);
    }

    /// Renders prior work as one short human string per agent. This is the
    /// only view of completed tasks used to build downstream prompts.
    pub async fn summarize_completed(&self) -> Vec<String> {
        self.state.read().await.completed_lines.clone()
    }

    /// Snapshot for checkpointing and the final run context.
    pub async fn snapshot(&self) -> HubSnapshot {
        let state = self.state.read().await;
        HubSnapshot {
            artifacts: state.artifacts.clone(),
            files: state.files.clone(),
            decisions: state.decisions.clone(),
            completed_tasks: state.completed_lines.clone(),
        }
    }

    /// Restores hub state from a checkpoint snapshot.
    pub async fn restore(&self, snapshot: HubSnapshot) {
        let mut state = self.state.write().await;
        state.artifacts = snapshot.artifacts;
        state.files = snapshot.files;
        state.decisions = snapshot.decisions;
        state.completed_lines = snapshot.completed_tasks;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_share_artifact_first_writer_wins() {
        let hub = CommunicationHub::new();
        let first = hub
            .share_artifact("database_schema", json!({"tables": 3}), "db-designer", "general")
            .await;
        assert_eq!(first, "database_schema");

        let second = hub
            .share_artifact("database_schema", json!({"tables": 9}), "late-agent", "general")
            .await;
        assert_eq!(second, "database_schema#2");

        // The original payload is unchanged.
        let stored = hub.get_artifact("database_schema").await.unwrap();
        assert_eq!(stored.payload["tables"], 3);
        assert_eq!(stored.producer, "db-designer");
    }

    #[tokio::test]
    async fn test_artifact_immutability() {
        let hub = CommunicationHub::new();
        hub.share_artifact("api_contract", json!({"v": 1}), "a", "general").await;
        hub.share_artifact("api_contract", json!({"v": 2}), "b", "general").await;
        hub.share_artifact("api_contract", json!({"v": 3}), "c", "general").await;
        assert_eq!(hub.get_artifact("api_contract").await.unwrap().payload["v"], 1);
        assert_eq!(hub.get_artifact("api_contract#2").await.unwrap().payload["v"], 2);
        assert_eq!(hub.get_artifact("api_contract#3").await.unwrap().payload["v"], 3);
    }

    #[tokio::test]
    async fn test_register_file_records_modifiers() {
        let hub = CommunicationHub::new();
        let path = Path::new("/p/src/main.py");
        hub.register_file(path, "rapid-builder", 100).await;
        hub.register_file(path, "rapid-builder", 120).await;
        hub.register_file(path, "test-writer", 140).await;

        let registry = hub.file_registry().await;
        assert_eq!(registry.len(), 1);
        assert_eq!(registry[0].producer, "rapid-builder");
        assert_eq!(registry[0].modifiers, vec!["test-writer"]);
        assert_eq!(registry[0].bytes, 140);
    }

    #[tokio::test]
    async fn test_record_result_keeps_history() {
        let hub = CommunicationHub::new();
        hub.record_result(AgentResult::failed("builder", "timeout")).await;
        hub.record_result(AgentResult::succeeded("builder", "done")).await;

        let current = hub.result_for("builder").await.unwrap();
        assert!(current.success);
        let history = hub.history_for("builder").await;
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
    }

    #[tokio::test]
    async fn test_completed_lines_stay_flat() {
        let hub = CommunicationHub::new();
        hub.push_completed_line("builder: ok (3 files)").await;
        hub.push_completed_line("analyst: ok\nwith a stray newline").await;
        let lines = hub.summarize_completed().await;
        assert_eq!(lines.len(), 2);
        assert!(!lines[1].contains('\n'));
    }

    #[tokio::test]
    async fn test_overlong_completed_line_truncated() {
        let hub = CommunicationHub::new();
        hub.push_completed_line(&"x".repeat(500)).await;
        let lines = hub.summarize_completed().await;
        assert!(lines[0].len() <= COMPLETED_LINE_MAX + 3);
    }

    #[tokio::test]
    async fn test_artifacts_matching_by_key_and_producer() {
        let hub = CommunicationHub::new();
        hub.share_artifact("database_schema", json!({}), "db-designer", "general").await;
        hub.share_artifact("api_contract", json!({}), "api-designer", "general").await;

        let by_key = hub
            .artifacts_matching(&["api_contract".to_string()], &[])
            .await;
        assert_eq!(by_key.len(), 1);
        assert_eq!(by_key[0].key, "api_contract");

        let by_producer = hub
            .artifacts_matching(&[], &["db-designer".to_string()])
            .await;
        assert_eq!(by_producer.len(), 1);
        assert_eq!(by_producer[0].producer, "db-designer");
    }

    #[tokio::test]
    async fn test_snapshot_restore_round_trip() {
        let hub = CommunicationHub::new();
        hub.share_artifact("api_contract", json!({"v": 1}), "a", "general").await;
        hub.register_file(Path::new("/p/a.txt"), "a", 10).await;
        hub.push_completed_line("a: ok (1 files)").await;

        let snapshot = hub.snapshot().await;
        let restored = CommunicationHub::new();
        restored.restore(snapshot).await;
        assert!(restored.get_artifact("api_contract").await.is_some());
        assert!(restored.has_file(Path::new("/p/a.txt")).await);
        assert_eq!(restored.summarize_completed().await.len(), 1);
    }
}
