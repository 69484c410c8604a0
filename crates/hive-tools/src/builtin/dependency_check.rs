use crate::registry::{ToolCtx, ToolHandler, ToolMeta, ToolOutput};
use async_trait::async_trait;
use hive_core::{HiveResult, ToolResult};
use serde_json::{json, Map, Value};

/// Reports whether a named agent has completed, failed, or not yet run.
pub struct DependencyCheckTool {
    meta: ToolMeta,
}

impl DependencyCheckTool {
    /// Creates the tool.
    pub fn new() -> Self {
        Self {
            meta: ToolMeta {
                name: "dependency_check".to_string(),
                description: "Check the status of another agent in the workflow.".to_string(),
                parameters_schema: json!({
                    "type": "object",
                    "properties": {
                        "agent_name": {"type": "string", "description": "Agent id to check"}
                    },
                    "required": ["agent_name"]
                }),
                required: vec!["agent_name".into()],
                defaults: Map::new(),
                arg_aliases: vec![
                    ("agent".into(), "agent_name".into()),
                    ("name".into(), "agent_name".into()),
                ],
                mutating: false,
                path_params: Vec::new(),
            },
        }
    }
}

impl Default for DependencyCheckTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for DependencyCheckTool {
    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    async fn execute(
        &self,
        ctx: &ToolCtx,
        _agent_id: &str,
        call_id: &str,
        args: &Map<String, Value>,
    ) -> HiveResult<ToolOutput> {
        let agent_name = args
            .get("agent_name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let body = match ctx.hub.result_for(agent_name).await {
            Some(result) if result.success => json!({
                "agent": agent_name,
                "status": "completed",
                "files": result.files_created,
            }),
            Some(result) => json!({
                "agent": agent_name,
                "status": "failed",
                "error": result.error,
            }),
            None => json!({
                "agent": agent_name,
                "status": "not_run",
            }),
        };
        Ok(ToolOutput::of(ToolResult::success(call_id, body.to_string())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::synth::ContentSynthesizer;
    use hive_core::{AgentResult, RunContext};
    use hive_coord::CommunicationHub;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_status_lifecycle() {
        let hub = Arc::new(CommunicationHub::new());
        let ctx = ToolCtx {
            run: Arc::new(RunContext::new("/tmp/p", "req")),
            hub: hub.clone(),
            synthesizer: Arc::new(ContentSynthesizer::new("test")),
        };
        let tool = DependencyCheckTool::new();
        let mut args = Map::new();
        args.insert("agent_name".into(), Value::String("analyst".into()));

        let output = tool.execute(&ctx, "b", "c1", &args).await.unwrap();
        assert!(output.result.content.contains("not_run"));

        hub.record_result(AgentResult::succeeded("analyst", "done")).await;
        let output = tool.execute(&ctx, "b", "c2", &args).await.unwrap();
        assert!(output.result.content.contains("completed"));
    }
}
