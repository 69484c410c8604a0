use crate::synth::ContentSynthesizer;
use async_trait::async_trait;
use hive_core::{HiveResult, RunContext, ToolDescriptor, ToolResult};
use hive_coord::CommunicationHub;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Shared services available to every tool handler.
pub struct ToolCtx {
    /// Immutable run facts and path confinement.
    pub run: Arc<RunContext>,
    /// The communication hub for artifacts, decisions, and attribution.
    pub hub: Arc<CommunicationHub>,
    /// Deterministic scaffold content generation.
    pub synthesizer: Arc<ContentSynthesizer>,
}

/// Static metadata for one registered tool.
///
/// The invoker is the only component that reads the repair fields; handlers
/// see canonical arguments exclusively.
#[derive(Debug, Clone)]
pub struct ToolMeta {
    /// Canonical tool name.
    pub name: String,
    /// Description published to the LLM.
    pub description: String,
    /// JSON schema of the named parameters.
    pub parameters_schema: Value,
    /// Required canonical parameter names.
    pub required: Vec<String>,
    /// Defaults applied when a required parameter is missing.
    pub defaults: Map<String, Value>,
    /// Alternate argument key substitutions, alternate first.
    pub arg_aliases: Vec<(String, String)>,
    /// Whether the tool mutates a path and needs an exclusive lock plus
    /// loop-detector gating.
    pub mutating: bool,
    /// Argument names holding paths to resolve against the project root.
    pub path_params: Vec<String>,
}

impl ToolMeta {
    /// The canonical parameter names, read from the schema properties.
    pub fn canonical_params(&self) -> Vec<String> {
        self.parameters_schema["properties"]
            .as_object()
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The descriptor published to the LLM.
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters_schema: self.parameters_schema.clone(),
        }
    }
}

/// The result of a handler run, plus any files it wrote for attribution.
pub struct ToolOutput {
    /// The tool result returned into the chat session.
    pub result: ToolResult,
    /// Files written during this call, with byte counts.
    pub files_written: Vec<(PathBuf, u64)>,
}

impl ToolOutput {
    /// Wraps a result with no file side effects.
    pub fn of(result: ToolResult) -> Self {
        Self {
            result,
            files_written: Vec::new(),
        }
    }
}

/// Trait implemented by every tool handler.
///
/// Handlers receive canonical, repaired arguments only; the invoker has
/// already applied alias substitution, default filling, and path resolution.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Static metadata for this tool.
    fn meta(&self) -> &ToolMeta;

    /// Executes the tool call.
    async fn execute(
        &self,
        ctx: &ToolCtx,
        agent_id: &str,
        call_id: &str,
        args: &Map<String, Value>,
    ) -> HiveResult<ToolOutput>;
}

/// Central registry of callable tools.
///
/// Legacy name aliases (e.g. `write_file_tool`) resolve to canonical names;
/// a `<name>_tool` alias is registered automatically for every tool.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    aliases: HashMap<String, String>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool and its automatic `<name>_tool` alias.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.meta().name.clone();
        info!(tool = %name, "Registered tool");
        self.aliases.insert(format!("{name}_tool"), name.clone());
        self.tools.insert(name, handler);
    }

    /// Registers an additional legacy alias for a tool.
    pub fn register_alias(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.aliases.insert(alias.into(), canonical.into());
    }

    /// Resolves a possibly-aliased tool name to its canonical form.
    pub fn canonical_name(&self, raw: &str) -> Option<String> {
        if self.tools.contains_key(raw) {
            return Some(raw.to_string());
        }
        self.aliases.get(raw).cloned()
    }

    /// Looks up a tool by canonical name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.tools.get(name)
    }

    /// The tool catalog published to the LLM, sorted by name for
    /// deterministic request bodies.
    pub fn catalog(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> =
            self.tools.values().map(|t| t.meta().descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool {
        meta: ToolMeta,
    }

    impl EchoTool {
        fn new(name: &str) -> Self {
            Self {
                meta: ToolMeta {
                    name: name.to_string(),
                    description: format!("Echo tool {name}"),
                    parameters_schema: json!({
                        "type": "object",
                        "properties": {"text": {"type": "string"}},
                        "required": ["text"]
                    }),
                    required: vec!["text".into()],
                    defaults: Map::new(),
                    arg_aliases: Vec::new(),
                    mutating: false,
                    path_params: Vec::new(),
                },
            }
        }
    }

    #[async_trait]
    impl ToolHandler for EchoTool {
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
            let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
            Ok(ToolOutput::of(ToolResult::success(call_id, text)))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("echo")));
        assert_eq!(registry.tool_count(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_automatic_tool_suffix_alias() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("write_file")));
        assert_eq!(
            registry.canonical_name("write_file_tool").as_deref(),
            Some("write_file")
        );
        assert_eq!(registry.canonical_name("write_file").as_deref(), Some("write_file"));
        assert!(registry.canonical_name("nope").is_none());
    }

    #[test]
    fn test_explicit_alias() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("run_command")));
        registry.register_alias("shell", "run_command");
        assert_eq!(registry.canonical_name("shell").as_deref(), Some("run_command"));
    }

    #[test]
    fn test_catalog_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("zeta")));
        registry.register(Arc::new(EchoTool::new("alpha")));
        let catalog = registry.catalog();
        assert_eq!(catalog[0].name, "alpha");
        assert_eq!(catalog[1].name, "zeta");
    }

    #[test]
    fn test_canonical_params_from_schema() {
        let tool = EchoTool::new("echo");
        assert_eq!(tool.meta().canonical_params(), vec!["text"]);
    }
}
