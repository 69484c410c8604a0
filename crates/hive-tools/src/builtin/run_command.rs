use crate::registry::{ToolCtx, ToolHandler, ToolMeta, ToolOutput};
use async_trait::async_trait;
use hive_core::{HiveResult, ToolResult};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const OUTPUT_CAP: usize = 16 * 1024;

/// Runs a shell command under the project root with a bounded timeout.
///
/// A timeout or non-zero exit is a structured tool error returned to the
/// agent, never a session failure.
pub struct RunCommandTool {
    meta: ToolMeta,
}

impl RunCommandTool {
    /// Creates the tool.
    pub fn new() -> Self {
        Self {
            meta: ToolMeta {
                name: "run_command".to_string(),
                description: "Run a shell command in the project directory and capture its output.".to_string(),
                parameters_schema: json!({
                    "type": "object",
                    "properties": {
                        "cmd": {"type": "string", "description": "Shell command line to run"},
                        "cwd": {"type": "string", "description": "Working directory, relative to the project root"},
                        "timeout_secs": {"type": "integer", "description": "Timeout in seconds (default 120)"}
                    },
                    "required": ["cmd"]
                }),
                required: vec!["cmd".into()],
                defaults: Map::new(),
                arg_aliases: vec![
                    ("command".into(), "cmd".into()),
                    ("working_dir".into(), "cwd".into()),
                    ("timeout".into(), "timeout_secs".into()),
                ],
                mutating: false,
                path_params: vec!["cwd".into()],
            },
        }
    }
}

impl Default for RunCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

fn capped(bytes: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if text.len() > OUTPUT_CAP {
        let mut cut = OUTPUT_CAP;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n... [truncated]");
    }
    text
}

#[async_trait]
impl ToolHandler for RunCommandTool {
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
        let cmd = args.get("cmd").and_then(Value::as_str).unwrap_or_default();
        if cmd.is_empty() {
            return Ok(ToolOutput::of(ToolResult::error(call_id, "empty command")));
        }
        let cwd = args
            .get("cwd")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_else(|| ctx.run.project_root.clone());
        let timeout_secs = args
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        info!(agent = %agent_id, cmd = %cmd, cwd = %cwd.display(), "Running command");

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(&cwd)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(Duration::from_secs(timeout_secs), child).await {
            Err(_) => Ok(ToolOutput::of(ToolResult::error(
                call_id,
                format!("command timed out after {timeout_secs}s: {cmd}"),
            ))),
            Ok(Err(e)) => Ok(ToolOutput::of(ToolResult::error(
                call_id,
                format!("failed to spawn command: {e}"),
            ))),
            Ok(Ok(output)) => {
                let status = output.status.code().unwrap_or(-1);
                let body = json!({
                    "status": status,
                    "stdout": capped(&output.stdout),
                    "stderr": capped(&output.stderr),
                });
                let result = if output.status.success() {
                    ToolResult::success(call_id, body.to_string())
                } else {
                    ToolResult::error(call_id, body.to_string())
                };
                Ok(ToolOutput::of(result))
            }
        }
    }
}
