use async_trait::async_trait;
use hive_core::{AgentTask, HiveResult, Message, ToolCall, ToolDescriptor};
use std::sync::Arc;

/// Response from the LLM: text, a tool-use request, or a terminal message.
#[derive(Debug)]
pub enum LlmResponse {
    /// Intermediate text; the session continues.
    Text(String),
    /// One or more tool invocations, optionally preceded by text.
    ToolUse {
        /// Reasoning text accompanying the calls, if any.
        content: Option<String>,
        /// The requested tool invocations, in order.
        tool_calls: Vec<ToolCall>,
    },
    /// Terminal message; the session is over.
    Done(String),
}

/// Transport seam for LLM chat-with-tools requests.
///
/// The production implementation is [`crate::HttpBackend`]; tests and
/// embedders inject their own via [`BackendFactory`].
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Sends one chat turn and returns the parsed response.
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> HiveResult<LlmResponse>;
}

/// Factory producing a backend for each agent task (for testing with mock
/// backends or per-role model selection).
pub type BackendFactory = Arc<dyn Fn(&AgentTask) -> Box<dyn LlmBackend> + Send + Sync>;
