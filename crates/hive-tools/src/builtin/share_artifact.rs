use crate::registry::{ToolCtx, ToolHandler, ToolMeta, ToolOutput};
use async_trait::async_trait;
use hive_core::{HiveResult, ToolResult};
use serde_json::{json, Map, Value};

/// Publishes a structured artifact for consumption by later agents.
pub struct ShareArtifactTool {
    meta: ToolMeta,
}

impl ShareArtifactTool {
    /// Creates the tool.
    pub fn new() -> Self {
        let mut defaults = Map::new();
        defaults.insert("artifact_type".into(), Value::String("general".into()));
        defaults.insert("content".into(), json!({}));
        Self {
            meta: ToolMeta {
                name: "share_artifact".to_string(),
                description: "Share a structured artifact (schema, contract, plan) with other agents.".to_string(),
                parameters_schema: json!({
                    "type": "object",
                    "properties": {
                        "artifact_type": {"type": "string", "description": "Well-known artifact key, e.g. database_schema"},
                        "content": {"type": "object", "description": "Structured artifact payload"},
                        "description": {"type": "string", "description": "Short human description"}
                    },
                    "required": ["artifact_type", "content"]
                }),
                required: vec!["artifact_type".into(), "content".into()],
                defaults,
                arg_aliases: vec![
                    ("type".into(), "artifact_type".into()),
                    ("data".into(), "content".into()),
                    ("artifact".into(), "content".into()),
                    ("payload".into(), "content".into()),
                ],
                mutating: false,
                path_params: Vec::new(),
            },
        }
    }
}

impl Default for ShareArtifactTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for ShareArtifactTool {
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
        let key = args
            .get("artifact_type")
            .and_then(Value::as_str)
            .unwrap_or("general");
        let payload = args.get("content").cloned().unwrap_or(json!({}));
        let content_type = if payload.is_object() || payload.is_array() {
            "application/json"
        } else {
            "text/plain"
        };
        let stored_as = ctx
            .hub
            .share_artifact(key, payload, agent_id, content_type)
            .await;
        if let Some(description) = args.get("description").and_then(Value::as_str) {
            ctx.hub.record_message(agent_id, None, description).await;
        }
        Ok(ToolOutput::of(ToolResult::success(
            call_id,
            json!({"stored_as": stored_as}).to_string(),
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::synth::ContentSynthesizer;
    use hive_core::RunContext;
    use hive_coord::CommunicationHub;
    use std::sync::Arc;

    fn ctx() -> (Arc<CommunicationHub>, ToolCtx) {
        let hub = Arc::new(CommunicationHub::new());
        let ctx = ToolCtx {
            run: Arc::new(RunContext::new("/tmp/p", "req")),
            hub: hub.clone(),
            synthesizer: Arc::new(ContentSynthesizer::new("test")),
        };
        (hub, ctx)
    }

    #[tokio::test]
    async fn test_artifact_shared() {
        let (hub, ctx) = ctx();
        let tool = ShareArtifactTool::new();
        let mut args = Map::new();
        args.insert("artifact_type".into(), Value::String("database_schema".into()));
        args.insert("content".into(), json!({"tables": ["users"]}));

        let output = tool.execute(&ctx, "db-designer", "c1", &args).await.unwrap();
        assert!(!output.result.is_error);
        let stored = hub.get_artifact("database_schema").await.unwrap();
        assert_eq!(stored.producer, "db-designer");
        assert_eq!(stored.payload["tables"][0], "users");
    }

    #[tokio::test]
    async fn test_duplicate_key_reports_suffixed_storage() {
        let (hub, ctx) = ctx();
        let tool = ShareArtifactTool::new();
        let mut args = Map::new();
        args.insert("artifact_type".into(), Value::String("api_contract".into()));
        args.insert("content".into(), json!({"v": 1}));
        tool.execute(&ctx, "a", "c1", &args).await.unwrap();

        let mut args2 = Map::new();
        args2.insert("artifact_type".into(), Value::String("api_contract".into()));
        args2.insert("content".into(), json!({"v": 2}));
        let output = tool.execute(&ctx, "b", "c2", &args2).await.unwrap();
        assert!(output.result.content.contains("api_contract#2"));
        assert_eq!(hub.get_artifact("api_contract").await.unwrap().payload["v"], 1);
    }
}
