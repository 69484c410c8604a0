use crate::registry::{ToolCtx, ToolHandler, ToolMeta, ToolOutput};
use async_trait::async_trait;
use hive_core::{HiveResult, ToolResult};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::info;

/// Writes content to a file under the project root.
///
/// By the time this handler runs, the invoker has resolved the path, filled
/// missing content from the synthesizer, and taken an exclusive lock.
pub struct WriteFileTool {
    meta: ToolMeta,
}

impl WriteFileTool {
    /// Creates the tool with its canonical schema and repair tables.
    pub fn new() -> Self {
        Self {
            meta: ToolMeta {
                name: "write_file".to_string(),
                description: "Write content to a file. Relative paths are resolved against the project root.".to_string(),
                parameters_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "File path, relative to the project root"},
                        "content": {"type": "string", "description": "Full file content"},
                        "reasoning": {"type": "string", "description": "Why this file is being written"}
                    },
                    "required": ["path", "content"]
                }),
                required: vec!["path".into(), "content".into()],
                defaults: Map::new(),
                arg_aliases: vec![
                    ("data".into(), "content".into()),
                    ("artifact".into(), "content".into()),
                    ("file_path".into(), "path".into()),
                    ("filename".into(), "path".into()),
                ],
                mutating: true,
                path_params: vec!["path".into()],
            },
        }
    }
}

impl Default for WriteFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for WriteFileTool {
    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    async fn execute(
        &self,
        _ctx: &ToolCtx,
        agent_id: &str,
        call_id: &str,
        args: &Map<String, Value>,
    ) -> HiveResult<ToolOutput> {
        let path = PathBuf::from(args.get("path").and_then(Value::as_str).unwrap_or_default());
        if path.as_os_str().is_empty() {
            return Ok(ToolOutput::of(ToolResult::error(call_id, "empty path")));
        }
        // All text I/O is UTF-8; non-string content is stored as pretty JSON.
        let content = match args.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => serde_json::to_string_pretty(other)?,
            None => String::new(),
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &content).await?;
        info!(
            agent = %agent_id,
            path = %path.display(),
            bytes = content.len(),
            "File written"
        );
        let response = json!({
            "path": path.display().to_string(),
            "bytes_written": content.len(),
        });
        Ok(ToolOutput {
            result: ToolResult::success(call_id, response.to_string()),
            files_written: vec![(path, content.len() as u64)],
        })
    }
}
