use crate::error::{AiddError, Result};
use crate::git;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const AIDD_DIR: &str = "aidd";
pub const DOCS_DIR: &str = "docs";
pub const CONFIG_DIR: &str = "config";
pub const REPORTS_DIR: &str = "reports";

pub const ACTIVE_TICKET_FILE: &str = "docs/.active_ticket";
pub const ACTIVE_FEATURE_FILE: &str = "docs/.active_feature";
pub const ACTIVE_STAGE_FILE: &str = "docs/.active_stage";

pub const GATES_CONFIG: &str = "config/gates.json";
pub const CONTEXT_GC_CONFIG: &str = "config/context_gc.json";
pub const ALLOWED_DEPS_FILE: &str = "config/allowed-deps.txt";

pub const EVENTS_DIR: &str = "reports/events";
pub const QA_REPORTS_DIR: &str = "reports/qa";
pub const PRD_REPORTS_DIR: &str = "reports/prd";
pub const RESEARCH_REPORTS_DIR: &str = "reports/research";
pub const CONTEXT_REPORTS_DIR: &str = "reports/context";

// ---------------------------------------------------------------------------
// Artifact paths
// ---------------------------------------------------------------------------

pub fn prd_path(root: &Path, ticket: &str) -> PathBuf {
    root.join(DOCS_DIR).join("prd").join(format!("{ticket}.prd.md"))
}

pub fn plan_path(root: &Path, ticket: &str) -> PathBuf {
    root.join(DOCS_DIR).join("plan").join(format!("{ticket}.md"))
}

pub fn tasklist_path(root: &Path, ticket: &str) -> PathBuf {
    root.join(DOCS_DIR).join("tasklist").join(format!("{ticket}.md"))
}

pub fn research_path(root: &Path, ticket: &str) -> PathBuf {
    root.join(DOCS_DIR).join("research").join(format!("{ticket}.md"))
}

pub fn prd_report_path(root: &Path, ticket: &str) -> PathBuf {
    root.join(PRD_REPORTS_DIR).join(format!("{ticket}.json"))
}

pub fn qa_stamp_path(root: &Path, ticket: &str) -> PathBuf {
    root.join(QA_REPORTS_DIR)
        .join(format!(".gate-qa.{ticket}.stamp"))
}

pub fn events_path(root: &Path, ticket: &str) -> PathBuf {
    root.join(EVENTS_DIR).join(format!("{ticket}.jsonl"))
}

/// Research call-graph artifacts that exist for `ticket`, in a stable order.
pub fn call_graph_paths(root: &Path, ticket: &str) -> Vec<PathBuf> {
    let dir = root.join(RESEARCH_REPORTS_DIR);
    let mut found = Vec::new();
    for suffix in ["call-graph.json", "call-graph.pack.yaml", "call-graph.pack.toon", "call-graph.edges.jsonl"] {
        let path = dir.join(format!("{ticket}-{suffix}"));
        if path.is_file() {
            found.push(path);
        }
    }
    found
}

/// `path` relative to `root` with forward slashes, falling back to the full path.
pub fn display_rel(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Normalize a tool-supplied path for suffix matching: forward slashes, no
/// leading `./`, no leading `aidd/`.
pub fn normalize_rel(path: &str) -> String {
    let mut value = path.trim().replace('\\', "/");
    while let Some(rest) = value.strip_prefix("./") {
        value = rest.to_string();
    }
    if let Some(rest) = value.strip_prefix("aidd/") {
        value = rest.to_string();
    }
    value
}

// ---------------------------------------------------------------------------
// Workflow root resolution
// ---------------------------------------------------------------------------

/// Environment inputs for root resolution. Split out so tests can supply
/// values without touching the process environment.
#[derive(Debug, Clone, Default)]
pub struct RootEnv {
    pub aidd_root: Option<PathBuf>,
    pub project_dir: Option<PathBuf>,
    pub plugin_root: Option<PathBuf>,
    pub use_git: bool,
}

impl RootEnv {
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        RootEnv {
            aidd_root: var("AIDD_ROOT"),
            project_dir: var("CLAUDE_PROJECT_DIR"),
            plugin_root: var("CLAUDE_PLUGIN_ROOT"),
            use_git: true,
        }
    }
}

fn has_docs(dir: &Path) -> bool {
    dir.join(DOCS_DIR).is_dir()
}

/// `dir` itself when it is a workflow (named `aidd` or carrying docs/), else its `aidd/` child.
fn workflow_in(dir: &Path) -> Option<PathBuf> {
    if dir.file_name().is_some_and(|n| n == AIDD_DIR) && has_docs(dir) {
        return Some(dir.to_path_buf());
    }
    let child = dir.join(AIDD_DIR);
    if has_docs(&child) {
        return Some(child);
    }
    None
}

/// Resolve the workflow root from the process environment, starting at `start`.
pub fn resolve_workflow_root(start: &Path) -> Result<PathBuf> {
    resolve_workflow_root_with(start, &RootEnv::from_env())
}

/// Resolve the workflow root.
///
/// Precedence:
/// 1. `AIDD_ROOT` (must contain docs/; no fallthrough when set)
/// 2. `CLAUDE_PROJECT_DIR` (the dir itself if it is `aidd/`, else its `aidd/` child)
/// 3. `CLAUDE_PLUGIN_ROOT` with docs/
/// 4. git top-level's `aidd/`
/// 5. first ancestor of `start` named `aidd/` with docs/, or carrying an `aidd/` child
pub fn resolve_workflow_root_with(start: &Path, env: &RootEnv) -> Result<PathBuf> {
    if let Some(root) = &env.aidd_root {
        if has_docs(root) {
            return Ok(root.clone());
        }
        return Err(AiddError::WorkflowNotFound(root.display().to_string()));
    }

    if let Some(project) = &env.project_dir {
        if let Some(found) = workflow_in(project) {
            return Ok(found);
        }
    }

    if let Some(plugin) = &env.plugin_root {
        if has_docs(plugin) {
            return Ok(plugin.clone());
        }
    }

    if env.use_git {
        if let Some(top) = git::toplevel(start) {
            if let Some(found) = workflow_in(&top) {
                return Ok(found);
            }
        }
    }

    for dir in start.ancestors() {
        if let Some(found) = workflow_in(dir) {
            return Ok(found);
        }
    }

    Err(AiddError::WorkflowNotFound(
        start.join(AIDD_DIR).display().to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env() -> RootEnv {
        RootEnv::default()
    }

    fn make_workflow(base: &Path) -> PathBuf {
        let root = base.join("aidd");
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::create_dir_all(root.join("config")).unwrap();
        root
    }

    #[test]
    fn artifact_paths_are_deterministic() {
        let root = Path::new("/w/aidd");
        assert_eq!(prd_path(root, "T-1"), Path::new("/w/aidd/docs/prd/T-1.prd.md"));
        assert_eq!(plan_path(root, "T-1"), Path::new("/w/aidd/docs/plan/T-1.md"));
        assert_eq!(tasklist_path(root, "T-1"), Path::new("/w/aidd/docs/tasklist/T-1.md"));
        assert_eq!(
            qa_stamp_path(root, "T-1"),
            Path::new("/w/aidd/reports/qa/.gate-qa.T-1.stamp")
        );
        assert_eq!(events_path(root, "T-1"), Path::new("/w/aidd/reports/events/T-1.jsonl"));
    }

    #[test]
    fn normalize_rel_strips_prefixes() {
        assert_eq!(normalize_rel("./aidd/docs/prd/T.prd.md"), "docs/prd/T.prd.md");
        assert_eq!(normalize_rel("docs\\plan\\T.md"), "docs/plan/T.md");
    }

    #[test]
    fn explicit_aidd_root_wins() {
        let dir = TempDir::new().unwrap();
        let root = make_workflow(dir.path());
        let env = RootEnv {
            aidd_root: Some(root.clone()),
            ..no_env()
        };
        assert_eq!(resolve_workflow_root_with(Path::new("/"), &env).unwrap(), root);
    }

    #[test]
    fn explicit_aidd_root_without_docs_fails() {
        let dir = TempDir::new().unwrap();
        let env = RootEnv {
            aidd_root: Some(dir.path().to_path_buf()),
            ..no_env()
        };
        let err = resolve_workflow_root_with(dir.path(), &env).unwrap_err();
        assert!(matches!(err, AiddError::WorkflowNotFound(_)));
    }

    #[test]
    fn project_dir_points_at_parent_of_aidd() {
        let dir = TempDir::new().unwrap();
        let root = make_workflow(dir.path());
        let env = RootEnv {
            project_dir: Some(dir.path().to_path_buf()),
            ..no_env()
        };
        assert_eq!(resolve_workflow_root_with(Path::new("/"), &env).unwrap(), root);
    }

    #[test]
    fn walks_ancestors() {
        let dir = TempDir::new().unwrap();
        let root = make_workflow(dir.path());
        let deep = root.join("docs/prd");
        std::fs::create_dir_all(&deep).unwrap();
        assert_eq!(resolve_workflow_root_with(&deep, &no_env()).unwrap(), root);
        let sibling = dir.path().join("src/app");
        std::fs::create_dir_all(&sibling).unwrap();
        assert_eq!(resolve_workflow_root_with(&sibling, &no_env()).unwrap(), root);
    }

    #[test]
    fn missing_workflow_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = resolve_workflow_root_with(dir.path(), &no_env()).unwrap_err();
        assert!(err.to_string().contains("workflow not found"));
    }
}
