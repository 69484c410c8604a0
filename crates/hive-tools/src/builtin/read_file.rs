use crate::registry::{ToolCtx, ToolHandler, ToolMeta, ToolOutput};
use async_trait::async_trait;
use hive_core::{HiveResult, ToolResult};
use serde_json::{json, Map, Value};
use std::path::Path;

const MAX_READ_BYTES: usize = 64 * 1024;

/// Reads a file under the project root, truncating very large files.
pub struct ReadFileTool {
    meta: ToolMeta,
}

impl ReadFileTool {
    /// Creates the tool.
    pub fn new() -> Self {
        Self {
            meta: ToolMeta {
                name: "read_file".to_string(),
                description: "Read a file. Relative paths are resolved against the project root.".to_string(),
                parameters_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "File path to read"}
                    },
                    "required": ["path"]
                }),
                required: vec!["path".into()],
                defaults: Map::new(),
                arg_aliases: vec![
                    ("file_path".into(), "path".into()),
                    ("filename".into(), "path".into()),
                ],
                mutating: false,
                path_params: vec!["path".into()],
            },
        }
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    async fn execute(
        &self,
        _ctx: &ToolCtx,
        _agent_id: &str,
        call_id: &str,
        args: &Map<String, Value>,
    ) -> HiveResult<ToolOutput> {
        let path = args.get("path").and_then(Value::as_str).unwrap_or_default();
        match tokio::fs::read(Path::new(path)).await {
            Ok(bytes) => {
                let mut content = String::from_utf8_lossy(&bytes).into_owned();
                if content.len() > MAX_READ_BYTES {
                    let mut cut = MAX_READ_BYTES;
                    while !content.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    content.truncate(cut);
                    content.push_str("\n... [truncated]");
                }
                Ok(ToolOutput::of(ToolResult::success(call_id, content)))
            }
            Err(e) => Ok(ToolOutput::of(ToolResult::error(
                call_id,
                format!("failed to read '{path}': {e}"),
            ))),
        }
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

    fn ctx(root: &Path) -> ToolCtx {
        ToolCtx {
            run: Arc::new(RunContext::new(root, "req")),
            hub: Arc::new(CommunicationHub::new()),
            synthesizer: Arc::new(ContentSynthesizer::new("test")),
        }
    }

    #[tokio::test]
    async fn test_read_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hello.txt");
        std::fs::write(&path, "hello").unwrap();

        let tool = ReadFileTool::new();
        let mut args = Map::new();
        args.insert("path".into(), Value::String(path.display().to_string()));
        let output = tool.execute(&ctx(tmp.path()), "a", "c1", &args).await.unwrap();
        assert!(!output.result.is_error);
        assert_eq!(output.result.content, "hello");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_tool_error() {
        let tmp = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new();
        let mut args = Map::new();
        args.insert(
            "path".into(),
            Value::String(tmp.path().join("nope.txt").display().to_string()),
        );
        let output = tool.execute(&ctx(tmp.path()), "a", "c1", &args).await.unwrap();
        assert!(output.result.is_error);
    }
}
