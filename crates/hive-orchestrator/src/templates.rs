use std::collections::HashMap;

/// Role prompt bodies keyed by template id.
///
/// Template bodies are opaque to the kernel; unknown ids fall back to a
/// generic worker prompt so a workflow never fails on a missing template.
pub struct RoleTemplates {
    templates: HashMap<String, String>,
}

impl RoleTemplates {
    /// Creates a registry from explicit templates.
    pub fn new(templates: HashMap<String, String>) -> Self {
        Self { templates }
    }

    /// Adds or replaces a template.
    pub fn insert(&mut self, id: impl Into<String>, body: impl Into<String>) {
        self.templates.insert(id.into(), body.into());
    }

    /// The prompt body for a template id, or the generic fallback.
    pub fn get(&self, id: &str) -> &str {
        self.templates
            .get(id)
            .map(String::as_str)
            .unwrap_or(GENERIC_PROMPT)
    }
}

impl Default for RoleTemplates {
    fn default() -> Self {
        let mut templates = HashMap::new();
        templates.insert("analyst".to_string(), ANALYST_PROMPT.to_string());
        templates.insert("designer".to_string(), DESIGNER_PROMPT.to_string());
        templates.insert("builder".to_string(), BUILDER_PROMPT.to_string());
        templates.insert("test-writer".to_string(), TEST_WRITER_PROMPT.to_string());
        templates.insert("reviewer".to_string(), REVIEWER_PROMPT.to_string());
        templates.insert("documenter".to_string(), DOCUMENTER_PROMPT.to_string());
        Self { templates }
    }
}

/// The static handoff map: which agent substitutes for an abandoned one.
pub fn default_handoffs() -> HashMap<String, String> {
    HashMap::from([
        ("requirements-analyst".to_string(), "rapid-builder".to_string()),
        ("api-designer".to_string(), "rapid-builder".to_string()),
        ("frontend-builder".to_string(), "rapid-builder".to_string()),
    ])
}

const GENERIC_PROMPT: &str = "\
You are a software agent in a multi-agent swarm producing a project on disk.

Rules:
1. Use the provided tools for every file operation; never describe changes without making them.
2. Write complete, working file contents; never placeholders.
3. Share structured results other agents need with share_artifact.
4. Record notable choices with record_decision.
5. Finish by calling complete_task with a short summary.
";

const ANALYST_PROMPT: &str = "\
You are the requirements analyst in a multi-agent swarm. Read the \
requirements, resolve ambiguities conservatively, and produce a concise \
requirements document plus a share_artifact named 'requirements_summary' \
listing the features in priority order. Do not write application code. \
Finish with complete_task.
";

const DESIGNER_PROMPT: &str = "\
You are the system designer in a multi-agent swarm. Based on the \
requirements and any shared artifacts, design the data model and API \
surface. Share 'database_schema' and 'api_contract' artifacts for the \
builders, write the design documents to disk, and finish with complete_task.
";

const BUILDER_PROMPT: &str = "\
You are the implementation agent in a multi-agent swarm. Implement the \
project files according to the requirements and any shared artifacts \
(schemas, contracts, prior decisions). Write complete runnable files with \
write_file, verify them with verify_deliverables, and finish with \
complete_task summarizing what you built.
";

const TEST_WRITER_PROMPT: &str = "\
You are the test writer in a multi-agent swarm. Read the implemented files, \
write tests that cover the main paths and the stated edge cases, and run \
them with run_command where a test runner is available. Finish with \
complete_task.
";

const REVIEWER_PROMPT: &str = "\
You are the reviewer in a multi-agent swarm. Read the produced files, check \
them against the requirements and shared contracts, and record concrete \
findings with record_decision. Do not rewrite files wholesale. Finish with \
complete_task summarizing the verdict.
";

const DOCUMENTER_PROMPT: &str = "\
You are the documentation agent in a multi-agent swarm. Produce README and \
API documentation from the implemented files and shared artifacts. Finish \
with complete_task.
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_template() {
        let templates = RoleTemplates::default();
        assert!(templates.get("builder").contains("implementation agent"));
    }

    #[test]
    fn test_unknown_template_falls_back() {
        let templates = RoleTemplates::default();
        assert!(templates.get("no-such-role").contains("multi-agent swarm"));
    }

    #[test]
    fn test_handoff_map_has_builder_substitute() {
        let handoffs = default_handoffs();
        assert_eq!(
            handoffs.get("requirements-analyst").map(String::as_str),
            Some("rapid-builder")
        );
    }
}
