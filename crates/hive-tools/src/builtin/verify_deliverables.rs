use crate::registry::{ToolCtx, ToolHandler, ToolMeta, ToolOutput};
use async_trait::async_trait;
use hive_core::{HiveResult, ToolResult};
use serde_json::{json, Map, Value};

/// Checks that the listed deliverable paths exist on disk and are non-empty.
pub struct VerifyDeliverablesTool {
    meta: ToolMeta,
}

impl VerifyDeliverablesTool {
    /// Creates the tool.
    pub fn new() -> Self {
        let mut defaults = Map::new();
        defaults.insert("deliverables".into(), json!([]));
        Self {
            meta: ToolMeta {
                name: "verify_deliverables".to_string(),
                description: "Verify that the listed files exist under the project root.".to_string(),
                parameters_schema: json!({
                    "type": "object",
                    "properties": {
                        "deliverables": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Paths to verify, relative to the project root"
                        }
                    },
                    "required": ["deliverables"]
                }),
                required: vec!["deliverables".into()],
                defaults,
                arg_aliases: vec![
                    ("files".into(), "deliverables".into()),
                    ("paths".into(), "deliverables".into()),
                ],
                mutating: false,
                path_params: Vec::new(),
            },
        }
    }
}

impl Default for VerifyDeliverablesTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for VerifyDeliverablesTool {
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
        let entries: Vec<String> = args
            .get("deliverables")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut report = Vec::new();
        let mut missing = Vec::new();
        for raw in &entries {
            let resolved = match ctx.run.resolve_path(raw) {
                Ok(p) => p,
                Err(e) => {
                    report.push(json!({"path": raw, "exists": false, "error": e.to_string()}));
                    missing.push(raw.clone());
                    continue;
                }
            };
            match tokio::fs::metadata(&resolved).await {
                Ok(meta) if meta.is_file() && meta.len() > 0 => {
                    report.push(json!({"path": raw, "exists": true, "bytes": meta.len()}));
                }
                Ok(meta) => {
                    report.push(json!({"path": raw, "exists": true, "bytes": meta.len(), "empty": meta.len() == 0}));
                    missing.push(raw.clone());
                }
                Err(_) => {
                    report.push(json!({"path": raw, "exists": false}));
                    missing.push(raw.clone());
                }
            }
        }

        let body = json!({
            "verified": entries.len() - missing.len(),
            "missing": missing,
            "report": report,
        });
        Ok(ToolOutput::of(ToolResult::success(call_id, body.to_string())))
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
    async fn test_reports_present_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("README.md"), "# hi").unwrap();
        let ctx = ToolCtx {
            run: Arc::new(RunContext::new(tmp.path(), "req")),
            hub: Arc::new(CommunicationHub::new()),
            synthesizer: Arc::new(ContentSynthesizer::new("test")),
        };
        let tool = VerifyDeliverablesTool::new();
        let mut args = Map::new();
        args.insert("deliverables".into(), json!(["README.md", "missing.md"]));

        let output = tool.execute(&ctx, "a", "c1", &args).await.unwrap();
        let body: Value = serde_json::from_str(&output.result.content).unwrap();
        assert_eq!(body["verified"], 1);
        assert_eq!(body["missing"][0], "missing.md");
    }
}
