use crate::error::{HiveError, HiveResult};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Immutable facts about one orchestration run.
///
/// Mutable run state (artifacts, attributions, completed-task lines) lives in
/// the communication hub; this type carries only what every tool invocation
/// needs to resolve and confine paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Unique identifier for this run.
    pub run_id: Uuid,
    /// The directory into which all file operations are confined by default.
    pub project_root: PathBuf,
    /// The requirements blob handed to every agent prompt.
    pub requirements: String,
    /// Absolute prefixes outside the project root that tools may touch.
    pub allowed_prefixes: Vec<PathBuf>,
}

impl RunContext {
    /// Creates a run context rooted at `project_root`.
    pub fn new(project_root: impl Into<PathBuf>, requirements: impl Into<String>) -> Self {
        let project_root = normalize(&project_root.into());
        Self {
            run_id: Uuid::new_v4(),
            project_root: project_root.clone(),
            requirements: requirements.into(),
            allowed_prefixes: vec![project_root],
        }
    }

    /// Adds an absolute prefix that tools may write to.
    pub fn allow_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.allowed_prefixes.push(normalize(&prefix.into()));
        self
    }

    /// Resolves a raw path argument against the project root.
    ///
    /// Relative paths are joined onto the project root. Absolute paths must
    /// fall under an allow-listed prefix. `..` components are resolved
    /// lexically, so a relative path cannot escape the root.
    pub fn resolve_path(&self, raw: &str) -> HiveResult<PathBuf> {
        if raw.is_empty() {
            return Err(HiveError::Tool("empty path".into()));
        }
        let candidate = Path::new(raw);
        let resolved = if candidate.is_absolute() {
            normalize(candidate)
        } else {
            normalize(&self.project_root.join(candidate))
        };
        if self
            .allowed_prefixes
            .iter()
            .any(|prefix| resolved.starts_with(prefix))
        {
            Ok(resolved)
        } else {
            Err(HiveError::Tool(format!(
                "path '{raw}' resolves outside allowed prefixes"
            )))
        }
    }
}

/// Lexically normalizes a path: strips `.`, resolves `..` against the prefix,
/// and drops trailing separators.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RunContext {
        RunContext::new("/tmp/project", "build an API")
    }

    #[test]
    fn test_relative_path_joins_root() {
        let resolved = ctx().resolve_path("src/main.py").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/project/src/main.py"));
    }

    #[test]
    fn test_absolute_path_within_root() {
        let resolved = ctx().resolve_path("/tmp/project/API.md").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/project/API.md"));
    }

    #[test]
    fn test_absolute_path_outside_root_rejected() {
        assert!(ctx().resolve_path("/etc/passwd").is_err());
    }

    #[test]
    fn test_parent_escape_rejected() {
        assert!(ctx().resolve_path("../../etc/passwd").is_err());
    }

    #[test]
    fn test_dot_components_normalized() {
        let resolved = ctx().resolve_path("./src/./api.py").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/project/src/api.py"));
    }

    #[test]
    fn test_allowed_prefix() {
        let ctx = ctx().allow_prefix("/var/cache/hive");
        assert!(ctx.resolve_path("/var/cache/hive/data.json").is_ok());
        assert!(ctx.resolve_path("/var/other").is_err());
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(ctx().resolve_path("").is_err());
    }
}
