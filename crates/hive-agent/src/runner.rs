use crate::backend::{LlmBackend, LlmResponse};
use crate::config::SessionLimits;
use crate::pacing::Pacer;
use crate::retry::{compute_backoff, is_rate_limited, is_retryable, RetryPolicy};
use hive_core::{AgentResult, HiveResult, Message, Role, ToolDescriptor};
use hive_coord::{LoopDetector, ReasoningVerdict};
use hive_tools::{InvokeOutcome, ToolInvoker};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

const WRAP_UP_MESSAGE: &str = "Your session budget is nearly exhausted. Wrap up now: \
    call complete_task with a summary of what you finished, or reply with a short final message.";

/// Upper bound on consecutive global pauses taken for 429s in one session.
/// Rate limits are not counted against the retry budget, but the session
/// must stay live.
const MAX_RATE_LIMIT_PAUSES: u32 = 20;

/// Drives one chat-with-tools session per agent invocation.
///
/// Tool calls within a session are strictly serialized. The runner enforces
/// the per-session tool budget and wall-clock timeout, terminates on a
/// signaled loop, and retries transport errors with backoff. Outbound LLM
/// calls go through the shared [`Pacer`].
pub struct AgentRunner {
    backend: Box<dyn LlmBackend>,
    invoker: Arc<ToolInvoker>,
    detector: Arc<LoopDetector>,
    pacer: Arc<Pacer>,
    retry: RetryPolicy,
    limits: SessionLimits,
    system_prompt: String,
}

impl AgentRunner {
    /// Creates a runner around the given backend and tool pipeline.
    pub fn new(
        backend: Box<dyn LlmBackend>,
        invoker: Arc<ToolInvoker>,
        detector: Arc<LoopDetector>,
        pacer: Arc<Pacer>,
    ) -> Self {
        Self {
            backend,
            invoker,
            detector,
            pacer,
            retry: RetryPolicy::default(),
            limits: SessionLimits::default(),
            system_prompt: String::new(),
        }
    }

    /// Sets the system prompt (the agent's role definition).
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Overrides the session limits.
    pub fn with_limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Overrides the transport retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs one full session and returns the agent's result. Session-level
    /// failures are reported in the result, never as `Err`.
    pub async fn run(&self, agent_id: &str, user_prompt: &str) -> AgentResult {
        let started = Instant::now();
        let session_id = Uuid::new_v4();
        let tools = self.invoker.registry().catalog();
        let mut messages = vec![Message::user(user_prompt, session_id)];
        let mut files: Vec<String> = Vec::new();
        let mut calls: Vec<String> = Vec::new();
        let mut remaining = self.limits.max_tool_calls;
        let mut wrap_up_sent = false;

        info!(agent = %agent_id, session = %session_id, "Starting agent session");

        loop {
            if !wrap_up_sent
                && (started.elapsed() >= self.limits.session_timeout || remaining == 0)
            {
                warn!(agent = %agent_id, "Session budget low; requesting wrap-up");
                messages.push(Message::user(WRAP_UP_MESSAGE, session_id));
                wrap_up_sent = true;
            }

            let response = match self.chat_with_retry(&messages, &tools).await {
                Ok(response) => response,
                Err(e) => {
                    return finish(agent_id, false, String::new(), Some(e.to_string()), files, calls, started);
                }
            };

            match response {
                LlmResponse::Done(text) => {
                    info!(agent = %agent_id, "Session completed with terminal message");
                    return finish(agent_id, true, text, None, files, calls, started);
                }

                LlmResponse::Text(text) => {
                    if wrap_up_sent {
                        return finish(agent_id, true, text, None, files, calls, started);
                    }
                    match self.detector.observe_reasoning(agent_id, text.trim()) {
                        ReasoningVerdict::Fresh => {
                            messages.push(Message::assistant(text, session_id));
                        }
                        ReasoningVerdict::Duplicate => {
                            // Deduplicated before it is shown again.
                        }
                        ReasoningVerdict::ShortCircuit => {
                            warn!(agent = %agent_id, "Short-circuiting session: repeated reasoning");
                            return finish(
                                agent_id,
                                false,
                                text,
                                Some("session short-circuited: repeating identical reasoning".into()),
                                files,
                                calls,
                                started,
                            );
                        }
                    }
                }

                LlmResponse::ToolUse { content, tool_calls } => {
                    if wrap_up_sent {
                        // Only a closing complete_task is honored past the
                        // wrap-up message.
                        for call in &tool_calls {
                            let canonical = self.invoker.registry().canonical_name(&call.name);
                            if canonical.as_deref() != Some("complete_task") {
                                continue;
                            }
                            calls.push(call.name.clone());
                            if let InvokeOutcome::Completed { result, .. } =
                                self.invoker.invoke(agent_id, call).await
                            {
                                if !result.is_error {
                                    return finish(
                                        agent_id, true, result.content, None, files, calls, started,
                                    );
                                }
                            }
                        }
                        return finish(
                            agent_id,
                            false,
                            String::new(),
                            Some("session budget exceeded".into()),
                            files,
                            calls,
                            started,
                        );
                    }

                    if let Some(text) = content {
                        match self.detector.observe_reasoning(agent_id, text.trim()) {
                            ReasoningVerdict::Fresh => {
                                messages.push(Message::assistant(text, session_id));
                            }
                            ReasoningVerdict::Duplicate => {}
                            ReasoningVerdict::ShortCircuit => {
                                warn!(agent = %agent_id, "Short-circuiting session: repeated reasoning");
                                return finish(
                                    agent_id,
                                    false,
                                    text,
                                    Some("session short-circuited: repeating identical reasoning".into()),
                                    files,
                                    calls,
                                    started,
                                );
                            }
                        }
                    }

                    for call in tool_calls {
                        if remaining == 0 {
                            let payload = serde_json::json!({
                                "type": "tool_result",
                                "tool_use_id": call.id,
                                "content": "tool budget exhausted; wrap up",
                                "is_error": true,
                            });
                            messages.push(Message::new(Role::User, payload.to_string(), session_id));
                            break;
                        }
                        remaining -= 1;
                        calls.push(call.name.clone());
                        let canonical = self.invoker.registry().canonical_name(&call.name);

                        info!(
                            agent = %agent_id,
                            tool = %call.name,
                            call_id = %call.id,
                            "Executing tool call"
                        );

                        match self.invoker.invoke(agent_id, &call).await {
                            InvokeOutcome::LoopDetected { path, .. } => {
                                let rel = self.relative(&path);
                                warn!(agent = %agent_id, path = %rel, "Loop detected; terminating session");
                                return finish(
                                    agent_id,
                                    false,
                                    String::new(),
                                    Some(format!("repeatedly failing to provide content for {rel}")),
                                    files,
                                    calls,
                                    started,
                                );
                            }
                            InvokeOutcome::Completed { result, files: written, .. } => {
                                for path in &written {
                                    let rel = self.relative(path);
                                    if !files.contains(&rel) {
                                        files.push(rel);
                                    }
                                }
                                let terminal =
                                    canonical.as_deref() == Some("complete_task") && !result.is_error;
                                let summary = result.content.clone();
                                let payload = serde_json::json!({
                                    "type": "tool_result",
                                    "tool_use_id": result.call_id,
                                    "content": result.content,
                                    "is_error": result.is_error,
                                });
                                messages.push(Message::new(Role::User, payload.to_string(), session_id));
                                if terminal {
                                    info!(agent = %agent_id, "Session completed via complete_task");
                                    return finish(agent_id, true, summary, None, files, calls, started);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Sends one chat turn, retrying transient transport errors with backoff.
    /// A 429 pauses the shared pacer instead of consuming a retry.
    async fn chat_with_retry(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> HiveResult<LlmResponse> {
        let system = if self.system_prompt.is_empty() {
            None
        } else {
            Some(self.system_prompt.as_str())
        };
        let mut attempt = 0u32;
        let mut pauses = 0u32;
        loop {
            self.pacer.acquire().await;
            match self.backend.chat(system, messages, tools).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if is_rate_limited(&e) && pauses < MAX_RATE_LIMIT_PAUSES {
                        pauses += 1;
                        self.pacer.pause().await;
                        continue;
                    }
                    if !is_retryable(&e) || attempt >= self.retry.max_retries {
                        return Err(e);
                    }
                    let delay = compute_backoff(&self.retry, attempt);
                    warn!(
                        attempt,
                        delay_ms = delay,
                        error = %e,
                        "Retryable transport error, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
            }
        }
    }

    fn relative(&self, path: &Path) -> String {
        let root = &self.invoker.ctx().run.project_root;
        path.strip_prefix(root).unwrap_or(path).display().to_string()
    }
}

#[allow(clippy::too_many_arguments)]
fn finish(
    agent_id: &str,
    success: bool,
    response_text: String,
    error: Option<String>,
    files_created: Vec<String>,
    tool_calls: Vec<String>,
    started: Instant,
) -> AgentResult {
    AgentResult {
        agent_id: agent_id.to_string(),
        success,
        response_text,
        files_created,
        tool_calls,
        duration_ms: started.elapsed().as_millis() as u64,
        error,
    }
}
