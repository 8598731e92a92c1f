use aidd_core::paths;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Resolve the workflow root.
///
/// Priority:
/// 1. `--root` (the directory itself when it carries `docs/`, else its `aidd/` child)
/// 2. `AIDD_ROOT`, `CLAUDE_PROJECT_DIR`, `CLAUDE_PLUGIN_ROOT`
/// 3. git top-level's `aidd/`
/// 4. Walk upward from `cwd` looking for an `aidd/` workflow
pub fn resolve_root(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return explicit_root(p);
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    paths::resolve_workflow_root(&cwd).context("cannot locate the aidd workflow")
}

fn explicit_root(path: &Path) -> anyhow::Result<PathBuf> {
    for candidate in [path.to_path_buf(), path.join(paths::AIDD_DIR)] {
        if candidate.join(paths::DOCS_DIR).is_dir() {
            return Ok(candidate);
        }
    }
    Err(aidd_core::AiddError::WorkflowNotFound(path.display().to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        let result = resolve_root(Some(dir.path())).unwrap();
        assert_eq!(result, dir.path());
    }

    #[test]
    fn explicit_project_dir_uses_aidd_child() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("aidd/docs")).unwrap();
        let result = resolve_root(Some(dir.path())).unwrap();
        assert_eq!(result, dir.path().join("aidd"));
    }

    #[test]
    fn explicit_root_without_docs_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = resolve_root(Some(dir.path())).unwrap_err();
        assert!(err.to_string().contains("workflow not found"));
    }
}
