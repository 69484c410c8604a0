use crate::registry::{ToolCtx, ToolHandler, ToolMeta, ToolOutput};
use async_trait::async_trait;
use hive_core::{HiveResult, ToolResult};
use serde_json::{json, Map, Value};

/// Marks the calling agent's task as complete.
///
/// The result content is the summary itself, so the session loop can lift it
/// into the agent's closing response. When both a `complete_task` call and
/// terminal text are present, the call is authoritative.
pub struct CompleteTaskTool {
    meta: ToolMeta,
}

impl CompleteTaskTool {
    /// Creates the tool.
    pub fn new() -> Self {
        let mut defaults = Map::new();
        defaults.insert("summary".into(), Value::String("Task completed".into()));
        Self {
            meta: ToolMeta {
                name: "complete_task".to_string(),
                description: "Finish the task with a short summary of what was accomplished.".to_string(),
                parameters_schema: json!({
                    "type": "object",
                    "properties": {
                        "summary": {"type": "string", "description": "One-paragraph summary of the work"},
                        "artifacts": {"type": "object", "description": "Optional final artifacts to share, keyed by artifact type"}
                    },
                    "required": ["summary"]
                }),
                required: vec!["summary".into()],
                defaults,
                arg_aliases: vec![
                    ("task".into(), "summary".into()),
                    ("description".into(), "summary".into()),
                ],
                mutating: false,
                path_params: Vec::new(),
            },
        }
    }
}

impl Default for CompleteTaskTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for CompleteTaskTool {
    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    async fn execute(
        &self,
        ctx: &ToolCtx,
        agent_id: &str,
        call_id: &str,
        args: &Map<String, Value>,
    ) -> HiveResult<ToolOutput> {
        let summary = args
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or("Task completed");
        ctx.hub.record_message(agent_id, None, summary).await;
        if let Some(artifacts) = args.get("artifacts").and_then(Value::as_object) {
            for (key, payload) in artifacts {
                ctx.hub
                    .share_artifact(key, payload.clone(), agent_id, "application/json")
                    .await;
            }
        }
        Ok(ToolOutput::of(ToolResult::success(call_id, summary)))
    }
}
