use crate::registry::{ToolCtx, ToolHandler, ToolMeta, ToolOutput};
use async_trait::async_trait;
use hive_core::{HiveResult, ToolResult};
use serde_json::{json, Map, Value};

/// Records a design decision into the hub's decision log.
pub struct RecordDecisionTool {
    meta: ToolMeta,
}

impl RecordDecisionTool {
    /// Creates the tool.
    pub fn new() -> Self {
        let mut defaults = Map::new();
        defaults.insert("rationale".into(), Value::String("no rationale given".into()));
        Self {
            meta: ToolMeta {
                name: "record_decision".to_string(),
                description: "Record a design decision and its rationale for later agents.".to_string(),
                parameters_schema: json!({
                    "type": "object",
                    "properties": {
                        "decision": {"type": "string", "description": "What was decided"},
                        "rationale": {"type": "string", "description": "Why it was decided"}
                    },
                    "required": ["decision", "rationale"]
                }),
                required: vec!["decision".into(), "rationale".into()],
                defaults,
                arg_aliases: vec![
                    ("reason".into(), "rationale".into()),
                    ("choice".into(), "decision".into()),
                ],
                mutating: false,
                path_params: Vec::new(),
            },
        }
    }
}

impl Default for RecordDecisionTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for RecordDecisionTool {
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
        let decision = args.get("decision").and_then(Value::as_str).unwrap_or_default();
        let rationale = args.get("rationale").and_then(Value::as_str).unwrap_or_default();
        if decision.is_empty() {
            return Ok(ToolOutput::of(ToolResult::error(call_id, "empty decision")));
        }
        ctx.hub.record_decision(agent_id, decision, rationale).await;
        Ok(ToolOutput::of(ToolResult::success(
            call_id,
            "Decision recorded",
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

    #[tokio::test]
    async fn test_decision_lands_in_hub() {
        let hub = Arc::new(CommunicationHub::new());
        let ctx = ToolCtx {
            run: Arc::new(RunContext::new("/tmp/p", "req")),
            hub: hub.clone(),
            synthesizer: Arc::new(ContentSynthesizer::new("test")),
        };
        let tool = RecordDecisionTool::new();
        let mut args = Map::new();
        args.insert("decision".into(), Value::String("use sqlite".into()));
        args.insert("rationale".into(), Value::String("zero ops".into()));

        let output = tool.execute(&ctx, "db-designer", "c1", &args).await.unwrap();
        assert!(!output.result.is_error);
        let snapshot = hub.snapshot().await;
        assert_eq!(snapshot.decisions.len(), 1);
        assert_eq!(snapshot.decisions[0].decision, "use sqlite");
        assert_eq!(snapshot.decisions[0].agent, "db-designer");
    }
}
