use crate::error::{HiveError, HiveResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

fn default_parallelizable() -> bool {
    true
}

/// One agent task in the declarative workflow spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    /// Unique agent id within the workflow (e.g. `requirements-analyst`).
    pub id: String,
    /// Opaque prompt template identifier for this agent's role.
    pub role_template_id: String,
    /// Agent ids that must complete before this agent becomes ready.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether this agent may run in a parallel wave.
    #[serde(default = "default_parallelizable")]
    pub parallelizable: bool,
    /// Scheduling priority among equally-deep ready agents (higher first).
    #[serde(default)]
    pub priority: i32,
    /// When true, abandoning this agent without a substitute fails the run.
    #[serde(default)]
    pub critical: bool,
    /// Relative paths this agent is expected to produce.
    #[serde(default)]
    pub expected_deliverables: Vec<String>,
    /// Artifact keys this agent wants injected into its prompt. Empty means
    /// "everything produced by my dependencies".
    #[serde(default)]
    pub interests: Vec<String>,
    /// Optional expected-duration hint in seconds.
    #[serde(default)]
    pub expected_duration_secs: Option<u64>,
}

impl AgentTask {
    /// Creates a task with the given id and role template, no dependencies.
    pub fn new(id: impl Into<String>, role_template_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role_template_id: role_template_id.into(),
            depends_on: Vec::new(),
            parallelizable: true,
            priority: 0,
            critical: false,
            expected_deliverables: Vec::new(),
            interests: Vec::new(),
            expected_duration_secs: None,
        }
    }

    /// Sets the dependency list.
    pub fn with_depends_on(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    /// Marks the task as non-parallelizable.
    pub fn serial(mut self) -> Self {
        self.parallelizable = false;
        self
    }

    /// Marks the task as critical.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Sets the expected deliverables.
    pub fn with_deliverables(mut self, paths: Vec<String>) -> Self {
        self.expected_deliverables = paths;
        self
    }
}

/// The declarative workflow spec: an ordered set of agent tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// The agent tasks, in declaration order.
    #[serde(default)]
    pub tasks: Vec<AgentTask>,
}

impl WorkflowSpec {
    /// Creates a spec from a list of tasks, validating it.
    pub fn new(tasks: Vec<AgentTask>) -> HiveResult<Self> {
        let spec = Self { tasks };
        spec.validate()?;
        Ok(spec)
    }

    /// Parses a TOML workflow document.
    pub fn from_toml_str(input: &str) -> HiveResult<Self> {
        let spec: Self = toml::from_str(input)
            .map_err(|e| HiveError::Config(format!("invalid workflow TOML: {e}")))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parses a JSON workflow document.
    pub fn from_json_str(input: &str) -> HiveResult<Self> {
        let spec: Self = serde_json::from_str(input)
            .map_err(|e| HiveError::Config(format!("invalid workflow JSON: {e}")))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Loads a workflow file, picking the parser by extension.
    pub fn load(path: &Path) -> HiveResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            _ => Self::from_toml_str(&raw),
        }
    }

    /// Looks up a task by agent id.
    pub fn get(&self, id: &str) -> Option<&AgentTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Rejects duplicate ids and dependency references to unknown agents.
    ///
    /// Cycle detection happens when the dependency graph is built, before
    /// any scheduling starts.
    pub fn validate(&self) -> HiveResult<()> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if task.id.is_empty() {
                return Err(HiveError::Config("agent task with empty id".into()));
            }
            if !seen.insert(task.id.as_str()) {
                return Err(HiveError::Config(format!("duplicate agent id: {}", task.id)));
            }
        }
        for task in &self.tasks {
            for dep in &task.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(HiveError::Config(format!(
                        "agent '{}' depends on unknown agent '{}'",
                        task.id, dep
                    )));
                }
            }
        }
        Ok(())
    }
}
