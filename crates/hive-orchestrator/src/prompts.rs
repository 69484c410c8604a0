use hive_core::{AgentTask, Artifact};

/// Cap on one artifact payload rendered into a prompt.
const ARTIFACT_RENDER_MAX: usize = 2_000;

/// Assembles the user prompt for one agent invocation.
///
/// The completed-work section is the hub's flat string rendering and nothing
/// else; structured artifacts are injected separately below it. A retry
/// carries the previous failure message so the agent can address it.
pub fn build_prompt(
    task: &AgentTask,
    requirements: &str,
    completed: &[String],
    artifacts: &[Artifact],
    previous_failure: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are agent '{}' in this run. Complete your task using the available tools.\n",
        task.id
    );

    if !requirements.is_empty() {
        prompt.push_str("\n=== REQUIREMENTS ===\n");
        prompt.push_str(requirements);
        prompt.push('\n');
    }

    if !completed.is_empty() {
        prompt.push_str("\n=== COMPLETED WORK ===\n");
        for line in completed {
            prompt.push_str("- ");
            prompt.push_str(line);
            prompt.push('\n');
        }
    }

    if !artifacts.is_empty() {
        prompt.push_str("\n=== SHARED ARTIFACTS ===\n");
        for artifact in artifacts {
            let rendered = serde_json::to_string_pretty(&artifact.payload)
                .unwrap_or_else(|_| artifact.payload.to_string());
            let rendered = if rendered.len() > ARTIFACT_RENDER_MAX {
                let mut cut = ARTIFACT_RENDER_MAX;
                while !rendered.is_char_boundary(cut) {
                    cut -= 1;
                }
                format!("{}\n... [truncated]", &rendered[..cut])
            } else {
                rendered
            };
            prompt.push_str(&format!(
                "--- {} (from {}) ---\n{}\n",
                artifact.key, artifact.producer, rendered
            ));
        }
    }

    if !task.expected_deliverables.is_empty() {
        prompt.push_str("\n=== EXPECTED DELIVERABLES ===\n");
        for path in &task.expected_deliverables {
            prompt.push_str("- ");
            prompt.push_str(path);
            prompt.push('\n');
        }
    }

    if let Some(failure) = previous_failure {
        prompt.push_str("\n=== PREVIOUS ATTEMPT FAILED ===\n");
        prompt.push_str(failure);
        prompt.push_str("\nAddress this failure directly before doing anything else.\n");
    }

    prompt
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_task() -> AgentTask {
        AgentTask::new("rapid-builder", "builder")
            .with_deliverables(vec!["src/main.py".to_string()])
    }

    #[test]
    fn test_sections_present() {
        let artifacts = vec![Artifact::new(
            "api_contract",
            "api-designer",
            json!({"endpoints": ["/health"]}),
            "application/json",
        )];
        let completed = vec!["api-designer: ok (2 files)".to_string()];
        let prompt = build_prompt(&sample_task(), "build a todo API", &completed, &artifacts, None);

        assert!(prompt.contains("agent 'rapid-builder'"));
        assert!(prompt.contains("=== REQUIREMENTS ===\nbuild a todo API"));
        assert!(prompt.contains("- api-designer: ok (2 files)"));
        assert!(prompt.contains("--- api_contract (from api-designer) ---"));
        assert!(prompt.contains("- src/main.py"));
        assert!(!prompt.contains("PREVIOUS ATTEMPT"));
    }

    #[test]
    fn test_retry_carries_failure() {
        let prompt = build_prompt(
            &sample_task(),
            "req",
            &[],
            &[],
            Some("session budget exceeded"),
        );
        assert!(prompt.contains("=== PREVIOUS ATTEMPT FAILED ===\nsession budget exceeded"));
    }

    #[test]
    fn test_completed_section_is_flat_lines() {
        let completed = vec!["a: ok (1 files)".to_string(), "b: fail".to_string()];
        let prompt = build_prompt(&sample_task(), "", &completed, &[], None);
        let section = prompt.split("=== COMPLETED WORK ===").nth(1).unwrap();
        for line in section.lines().filter(|l| l.starts_with('-')) {
            assert!(line.len() < 250);
        }
    }

    #[test]
    fn test_large_artifact_truncated() {
        let big = json!({"blob": "x".repeat(5_000)});
        let artifacts = vec![Artifact::new("big", "a", big, "application/json")];
        let prompt = build_prompt(&sample_task(), "", &[], &artifacts, None);
        assert!(prompt.contains("[truncated]"));
    }
}
