use hive_core::{AgentTask, HiveError, HiveResult, WorkflowSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

/// The scheduling state of one agent. Every agent is in exactly one state
/// at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Waiting on dependencies.
    Pending,
    /// Dependencies satisfied; eligible for the next wave.
    Ready,
    /// Admitted to a wave and executing.
    Running,
    /// Terminated successfully.
    Completed,
    /// Failed with retries exhausted; awaiting recovery.
    Failed,
    /// Terminal: no further attempts.
    Abandoned {
        /// Why the agent was abandoned.
        reason: String,
        /// When true, the orchestrator synthesized the agent's expected
        /// deliverables, so dependents may still proceed.
        deliverables_synthesized: bool,
    },
}

/// What to do with an agent after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Within the retry budget; the agent re-enters `ready`.
    Retry,
    /// Budget exhausted; escalate recovery.
    Exhausted,
}

#[derive(Debug, Clone)]
struct Node {
    task: AgentTask,
    state: AgentState,
    attempts: u32,
    depth: u32,
    last_error: Option<String>,
    retry_history: Vec<String>,
    substitute: Option<String>,
}

/// Dependency-aware agent state machine.
///
/// Agents move `pending → ready → running → {completed, failed}`, with
/// `failed → ready` while the retry budget lasts and `failed → abandoned`
/// when it is exhausted. An agent whose dependency is abandoned (without
/// synthesized deliverables) is itself abandoned with reason
/// "transitive failure". Wave selection is deterministic: ready agents are
/// ordered by (DAG depth, declared priority, id).
pub struct DependencyGraph {
    nodes: BTreeMap<String, Node>,
    max_retries: u32,
}

impl DependencyGraph {
    /// Builds the graph from a workflow spec. Rejects duplicate ids, unknown
    /// dependencies, and cycles before any scheduling starts.
    pub fn new(spec: &WorkflowSpec, max_retries: u32) -> HiveResult<Self> {
        spec.validate()?;
        detect_cycles(spec)?;
        let depths = compute_depths(spec);
        let nodes: BTreeMap<String, Node> = spec
            .tasks
            .iter()
            .map(|task| {
                (
                    task.id.clone(),
                    Node {
                        depth: depths.get(&task.id).copied().unwrap_or(0),
                        task: task.clone(),
                        state: AgentState::Pending,
                        attempts: 0,
                        last_error: None,
                        retry_history: Vec::new(),
                        substitute: None,
                    },
                )
            })
            .collect();
        let mut graph = Self { nodes, max_retries };
        graph.recompute_ready();
        Ok(graph)
    }

    /// Overrides the retry budget.
    pub fn set_max_retries(&mut self, max_retries: u32) {
        self.max_retries = max_retries;
    }

    /// Moves pending agents whose dependencies are satisfied into `ready`,
    /// and cascades abandonment to agents whose dependencies are abandoned
    /// without synthesized deliverables.
    pub fn recompute_ready(&mut self) {
        loop {
            let satisfied: HashSet<String> = self
                .nodes
                .iter()
                .filter(|(_, n)| {
                    matches!(
                        n.state,
                        AgentState::Completed
                            | AgentState::Abandoned {
                                deliverables_synthesized: true,
                                ..
                            }
                    )
                })
                .map(|(id, _)| id.clone())
                .collect();
            let poisoned: HashSet<String> = self
                .nodes
                .iter()
                .filter(|(_, n)| {
                    matches!(
                        n.state,
                        AgentState::Abandoned {
                            deliverables_synthesized: false,
                            ..
                        }
                    )
                })
                .map(|(id, _)| id.clone())
                .collect();

            let mut to_ready = Vec::new();
            let mut to_abandon = Vec::new();
            for (id, node) in &self.nodes {
                if node.state != AgentState::Pending {
                    continue;
                }
                if node.task.depends_on.iter().any(|d| poisoned.contains(d)) {
                    to_abandon.push(id.clone());
                } else if node.task.depends_on.iter().all(|d| satisfied.contains(d)) {
                    to_ready.push(id.clone());
                }
            }

            if to_ready.is_empty() && to_abandon.is_empty() {
                break;
            }
            for id in to_ready {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.state = AgentState::Ready;
                }
            }
            for id in to_abandon {
                warn!(agent = %id, "Abandoning agent: transitive failure");
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.state = AgentState::Abandoned {
                        reason: "transitive failure".to_string(),
                        deliverables_synthesized: false,
                    };
                }
            }
        }
    }

    /// Selects the next wave: ready agents in deterministic order, filtered
    /// to parallelizable ones up to `max_parallel`. A non-parallelizable
    /// agent at the head of the ready order forms a wave of one.
    pub fn next_wave(&self, max_parallel: usize) -> Vec<String> {
        let mut ready: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.state == AgentState::Ready)
            .collect();
        ready.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then(b.task.priority.cmp(&a.task.priority))
                .then(a.task.id.cmp(&b.task.id))
        });
        match ready.first() {
            None => Vec::new(),
            Some(head) if !head.task.parallelizable => vec![head.task.id.clone()],
            Some(_) => ready
                .iter()
                .filter(|n| n.task.parallelizable)
                .take(max_parallel.max(1))
                .map(|n| n.task.id.clone())
                .collect(),
        }
    }

    /// Transitions an agent to `running`.
    pub fn mark_running(&mut self, id: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            if node.state == AgentState::Ready {
                node.state = AgentState::Running;
            } else {
                warn!(agent = %id, state = ?node.state, "mark_running on non-ready agent");
            }
        }
    }

    /// Transitions an agent to `completed` and recomputes readiness.
    pub fn mark_completed(&mut self, id: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.state = AgentState::Completed;
        }
        self.recompute_ready();
    }

    /// Records a failed attempt. Within the retry budget the agent re-enters
    /// `ready`; past it the agent parks in `failed` for recovery.
    pub fn mark_failed(&mut self, id: &str, error: &str) -> FailureDisposition {
        let Some(node) = self.nodes.get_mut(id) else {
            return FailureDisposition::Exhausted;
        };
        node.attempts += 1;
        node.last_error = Some(error.to_string());
        node.retry_history.push(error.to_string());
        if node.attempts <= self.max_retries {
            info!(agent = %id, attempt = node.attempts, "Agent failed; re-entering ready");
            node.state = AgentState::Ready;
            FailureDisposition::Retry
        } else {
            warn!(agent = %id, attempts = node.attempts, "Agent failed; retries exhausted");
            node.state = AgentState::Failed;
            FailureDisposition::Exhausted
        }
    }

    /// Terminally abandons an agent. When `deliverables_synthesized` is
    /// true, dependents treat the dependency as satisfied.
    pub fn mark_abandoned(&mut self, id: &str, reason: &str, deliverables_synthesized: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.state = AgentState::Abandoned {
                reason: reason.to_string(),
                deliverables_synthesized,
            };
        }
        self.recompute_ready();
    }

    /// Replaces an abandoned agent with a substitute: the substitute inherits
    /// the original's dependencies and depth, and every dependent is rewired
    /// to depend on the substitute instead.
    pub fn substitute(&mut self, original: &str, substitute_task: AgentTask) -> HiveResult<()> {
        if self.nodes.contains_key(&substitute_task.id) {
            return Err(HiveError::Graph(format!(
                "substitute '{}' already in graph",
                substitute_task.id
            )));
        }
        let Some(node) = self.nodes.get(original) else {
            return Err(HiveError::Graph(format!("unknown agent '{original}'")));
        };
        let depth = node.depth;
        let substitute_id = substitute_task.id.clone();

        for other in self.nodes.values_mut() {
            for dep in &mut other.task.depends_on {
                if dep == original {
                    *dep = substitute_id.clone();
                }
            }
        }
        self.nodes.insert(
            substitute_id.clone(),
            Node {
                task: substitute_task,
                state: AgentState::Ready,
                attempts: 0,
                depth,
                last_error: None,
                retry_history: Vec::new(),
                substitute: None,
            },
        );
        if let Some(node) = self.nodes.get_mut(original) {
            node.substitute = Some(substitute_id.clone());
            node.state = AgentState::Abandoned {
                reason: format!("handed off to {substitute_id}"),
                deliverables_synthesized: false,
            };
        }
        info!(original = %original, substitute = %substitute_id, "Dependents rewired to substitute");
        self.recompute_ready();
        Ok(())
    }

    /// Applies a checkpoint: places recorded agents in their terminal sets.
    pub fn apply_checkpoint(
        &mut self,
        completed: &[String],
        abandoned: &[(String, String, bool)],
    ) {
        for id in completed {
            if let Some(node) = self.nodes.get_mut(id) {
                node.state = AgentState::Completed;
            }
        }
        for (id, reason, synthesized) in abandoned {
            if let Some(node) = self.nodes.get_mut(id) {
                node.state = AgentState::Abandoned {
                    reason: reason.clone(),
                    deliverables_synthesized: *synthesized,
                };
            }
        }
        self.recompute_ready();
    }

    /// Whether the run is over: no pending, ready, or running agents.
    pub fn is_done(&self) -> bool {
        !self.nodes.values().any(|n| {
            matches!(
                n.state,
                AgentState::Pending | AgentState::Ready | AgentState::Running
            )
        })
    }

    /// Deadlock: nothing ready or running, but agents still pending.
    pub fn is_deadlocked(&self) -> bool {
        let mut pending = false;
        for node in self.nodes.values() {
            match node.state {
                AgentState::Ready | AgentState::Running => return false,
                AgentState::Pending => pending = true,
                _ => {}
            }
        }
        pending
    }

    /// Whether an agent id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// The agent's current state.
    pub fn state(&self, id: &str) -> Option<&AgentState> {
        self.nodes.get(id).map(|n| &n.state)
    }

    /// The agent's task definition.
    pub fn task(&self, id: &str) -> Option<&AgentTask> {
        self.nodes.get(id).map(|n| &n.task)
    }

    /// The agent's attempt count.
    pub fn attempts(&self, id: &str) -> u32 {
        self.nodes.get(id).map(|n| n.attempts).unwrap_or(0)
    }

    /// The agent's most recent failure message.
    pub fn last_error(&self, id: &str) -> Option<String> {
        self.nodes.get(id).and_then(|n| n.last_error.clone())
    }

    /// All failure messages recorded for the agent, oldest first.
    pub fn retry_history(&self, id: &str) -> Vec<String> {
        self.nodes
            .get(id)
            .map(|n| n.retry_history.clone())
            .unwrap_or_default()
    }

    /// The substitute that replaced this agent, if a handoff happened.
    pub fn substitute_of(&self, id: &str) -> Option<String> {
        self.nodes.get(id).and_then(|n| n.substitute.clone())
    }

    fn ids_where(&self, pred: impl Fn(&AgentState) -> bool) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, n)| pred(&n.state))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Agents in `pending`.
    pub fn pending(&self) -> Vec<String> {
        self.ids_where(|s| *s == AgentState::Pending)
    }

    /// Agents in `ready`.
    pub fn ready(&self) -> Vec<String> {
        self.ids_where(|s| *s == AgentState::Ready)
    }

    /// Agents in `running`.
    pub fn running(&self) -> Vec<String> {
        self.ids_where(|s| *s == AgentState::Running)
    }

    /// Agents in `completed`.
    pub fn completed(&self) -> Vec<String> {
        self.ids_where(|s| *s == AgentState::Completed)
    }

    /// Agents in `failed`.
    pub fn failed(&self) -> Vec<String> {
        self.ids_where(|s| *s == AgentState::Failed)
    }

    /// Agents in `abandoned`, with reasons and the synthesized flag.
    pub fn abandoned(&self) -> Vec<(String, String, bool)> {
        self.nodes
            .iter()
            .filter_map(|(id, n)| match &n.state {
                AgentState::Abandoned {
                    reason,
                    deliverables_synthesized,
                } => Some((id.clone(), reason.clone(), *deliverables_synthesized)),
                _ => None,
            })
            .collect()
    }

    /// Abandoned agents that were declared critical and have neither a
    /// substitute nor synthesized deliverables. Covers agents abandoned
    /// directly and dependents abandoned by the transitive-failure cascade;
    /// any entry here makes the run fatal.
    pub fn critical_abandoned(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, n)| {
                n.task.critical
                    && n.substitute.is_none()
                    && matches!(
                        n.state,
                        AgentState::Abandoned {
                            deliverables_synthesized: false,
                            ..
                        }
                    )
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every agent that failed at least once: (id, last error, retry
    /// history, substitute). Feeds `final_context.json.failed[]`.
    pub fn failure_records(&self) -> Vec<(String, String, Vec<String>, Option<String>)> {
        self.nodes
            .iter()
            .filter(|(_, n)| !n.retry_history.is_empty())
            .map(|(id, n)| {
                (
                    id.clone(),
                    n.last_error.clone().unwrap_or_default(),
                    n.retry_history.clone(),
                    n.substitute.clone(),
                )
            })
            .collect()
    }

    /// One-line state dump for deadlock diagnostics.
    pub fn dump(&self) -> String {
        self.nodes
            .iter()
            .map(|(id, n)| format!("{id}={:?}", n.state))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Rejects dependency cycles with a DFS.
fn detect_cycles(spec: &WorkflowSpec) -> HiveResult<()> {
    let by_id: HashMap<&str, &AgentTask> =
        spec.tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    // 1 = in progress, 2 = done.
    let mut visited: HashMap<&str, u8> = HashMap::new();

    fn dfs<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a AgentTask>,
        visited: &mut HashMap<&'a str, u8>,
    ) -> bool {
        match visited.get(id) {
            Some(1) => return true,
            Some(2) => return false,
            _ => {}
        }
        visited.insert(id, 1);
        if let Some(task) = by_id.get(id) {
            for dep in &task.depends_on {
                if dfs(dep.as_str(), by_id, visited) {
                    return true;
                }
            }
        }
        visited.insert(id, 2);
        false
    }

    for task in &spec.tasks {
        if dfs(task.id.as_str(), &by_id, &mut visited) {
            return Err(HiveError::Graph(format!(
                "dependency cycle involving agent '{}'",
                task.id
            )));
        }
    }
    Ok(())
}

/// Longest-path depth from the roots, for wave ordering.
fn compute_depths(spec: &WorkflowSpec) -> HashMap<String, u32> {
    let mut depths: HashMap<String, u32> = HashMap::new();
    // Bounded relaxation; cycles are rejected separately.
    for _ in 0..=spec.tasks.len() {
        let mut changed = false;
        for task in &spec.tasks {
            let depth = task
                .depends_on
                .iter()
                .map(|d| depths.get(d).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            if depths.get(&task.id).copied().unwrap_or(0) != depth {
                depths.insert(task.id.clone(), depth);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    depths
}
