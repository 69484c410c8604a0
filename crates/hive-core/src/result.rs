use serde::{Deserialize, Serialize};

/// The outcome of one agent invocation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// The agent this result belongs to.
    pub agent_id: String,
    /// Whether the session terminated cleanly.
    pub success: bool,
    /// The agent's closing text (or `complete_task` summary).
    pub response_text: String,
    /// Paths of files written during this session.
    pub files_created: Vec<String>,
    /// Names of tools invoked during this session, in order.
    pub tool_calls: Vec<String>,
    /// Wall-clock duration of the session in milliseconds.
    pub duration_ms: u64,
    /// The failure reason, when `success` is false.
    pub error: Option<String>,
}

impl AgentResult {
    /// Creates a successful result.
    pub fn succeeded(agent_id: impl Into<String>, response_text: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            success: true,
            response_text: response_text.into(),
            files_created: Vec::new(),
            tool_calls: Vec::new(),
            duration_ms: 0,
            error: None,
        }
    }

    /// Creates a failed result with the given error message.
    pub fn failed(agent_id: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            agent_id: agent_id.into(),
            success: false,
            response_text: String::new(),
            files_created: Vec::new(),
            tool_calls: Vec::new(),
            duration_ms: 0,
            error: Some(error),
        }
    }
}
