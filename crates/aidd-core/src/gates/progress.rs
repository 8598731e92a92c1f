//! Tasklist progress gate: code changes must come with newly checked
//! tasklist items.

use super::{preamble, GateContext};
use crate::config::TasklistProgressSettings;
use crate::gate::{Gate, GateDecision, ReasonCode};
use crate::git;
use crate::paths;
use std::collections::HashSet;
use std::path::Path;

const GATE: Gate = Gate::TasklistProgress;
const TRUTHY: &[&str] = &["1", "true", "yes", "on", "enabled"];
const LIST_LIMIT: usize = 5;

const CODE_SUFFIXES: &[&str] = &[
    "py", "pyi", "kt", "kts", "java", "groovy", "gradle", "go", "rs", "swift", "js", "jsx", "ts",
    "tsx", "mjs", "cjs", "c", "cc", "cpp", "cxx", "h", "hpp", "hh", "rb", "php", "scala", "sql",
    "cs", "fs", "dart", "sh", "bash", "zsh", "ps1", "yaml", "yml", "json", "toml", "ini", "cfg",
];

/// Runtime inputs that do not come from `config/gates.json`.
#[derive(Debug, Clone, Default)]
pub struct ProgressRun {
    /// `NAME=value` of the override variable when it is set to a truthy value.
    pub bypass: Option<String>,
    /// Who is asking: `manual`, `implement`, `qa`, `review` or `gate`.
    pub source: String,
}

impl ProgressRun {
    /// Resolve the bypass through `lookup`, normally `std::env::var`.
    pub fn resolve(
        settings: &TasklistProgressSettings,
        source: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let bypass = settings.override_env.as_deref().and_then(|name| {
            let value = lookup(name)?;
            let value = value.trim().to_lowercase();
            TRUTHY.contains(&value.as_str()).then(|| format!("{name}={value}"))
        });
        ProgressRun {
            bypass,
            source: source.trim().to_lowercase(),
        }
    }
}

// ---------------------------------------------------------------------------
// Code-file filter
// ---------------------------------------------------------------------------

/// Prefix of the workflow root inside the repository, e.g. `aidd/`. Empty
/// when the workflow is the repository itself.
fn workflow_prefix(root: &Path) -> String {
    let Some(top) = git::toplevel(root) else {
        return String::new();
    };
    let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let top = std::fs::canonicalize(&top).unwrap_or(top);
    match root.strip_prefix(&top) {
        Ok(rel) if !rel.as_os_str().is_empty() => {
            format!("{}/", rel.to_string_lossy().replace('\\', "/"))
        }
        _ => String::new(),
    }
}

/// Whether a repository-relative path counts as code. Workflow artifacts
/// under `docs/` and `reports/` never do.
pub fn is_code_file(path: &str, workflow_prefix: &str, settings: &TasklistProgressSettings) -> bool {
    let path = path.replace('\\', "/");
    let in_workflow = path.strip_prefix(workflow_prefix).unwrap_or(&path);
    if in_workflow.starts_with("docs/") || in_workflow.starts_with("reports/") {
        return false;
    }
    if settings.code_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
        return true;
    }
    if settings.code_globs.iter().any(|g| crate::config::glob_matches(g, &path)) {
        return true;
    }
    Path::new(&path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| CODE_SUFFIXES.contains(&e.as_str()))
}

// ---------------------------------------------------------------------------
// Checkbox diff
// ---------------------------------------------------------------------------

/// `- [x]` lines, keyed by their lowercased whitespace-collapsed form, first
/// occurrence wins.
fn checked_lines(text: &str) -> Vec<(String, &str)> {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|l| l.to_lowercase().starts_with("- [x]"))
        .filter_map(|l| {
            let key = l.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
            seen.insert(key.clone()).then_some((key, l))
        })
        .collect()
}

/// Checked lines in `new` that `old` does not have.
pub fn new_checked_items(old: &str, new: &str) -> Vec<String> {
    let before: HashSet<String> = checked_lines(old).into_iter().map(|(k, _)| k).collect();
    checked_lines(new)
        .into_iter()
        .filter(|(k, _)| !before.contains(k))
        .map(|(_, l)| l.to_string())
        .collect()
}

/// First `limit` entries and a `… (+N)` tail.
fn capped(items: &[String], limit: usize) -> Vec<String> {
    let mut out: Vec<String> = items.iter().take(limit).cloned().collect();
    if items.len() > limit {
        out.push(format!("… (+{})", items.len() - limit));
    }
    out
}

fn summary(paths: &[String]) -> String {
    let mut out = paths.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
    if paths.len() > 3 {
        out.push_str(&format!(", … (+{})", paths.len() - 3));
    }
    out
}

pub fn tasklist_progress(ctx: &GateContext<'_>, settings: &TasklistProgressSettings, run: &ProgressRun) -> GateDecision {
    if let Some(skip) = preamble(GATE, &settings.filter, ctx) {
        return skip;
    }
    if let Some(bypass) = &run.bypass {
        return GateDecision::skip(GATE, ReasonCode::EnvBypass, &ctx.args().detail(bypass.as_str()));
    }
    if !settings.sources.is_empty() && !settings.sources.contains(&run.source) {
        return GateDecision::skip(GATE, ReasonCode::SourceFiltered, &ctx.args().detail(run.source.as_str()));
    }

    let Some(changed) = git::changed_files(ctx.root) else {
        return GateDecision::skip(GATE, ReasonCode::NoGit, &ctx.args());
    };
    let prefix = workflow_prefix(ctx.root);
    let code_files: Vec<String> = changed
        .into_iter()
        .filter(|f| is_code_file(f, &prefix, settings))
        .collect();
    if code_files.is_empty() {
        return GateDecision::skip(GATE, ReasonCode::NoCodeChanges, &ctx.args());
    }
    tracing::debug!(count = code_files.len(), "code changes pending tasklist progress");

    let path = paths::tasklist_path(ctx.root, ctx.ticket);
    let rel = ctx.rel(&path);
    let Ok(current) = std::fs::read_to_string(&path) else {
        if settings.allow_missing_tasklist {
            return GateDecision::skip(
                GATE,
                ReasonCode::ArtifactMissing,
                &ctx.args().detail(format!("{rel} is missing and allow_missing_tasklist=true")),
            );
        }
        return GateDecision::block(
            GATE,
            ReasonCode::ArtifactMissing,
            &ctx.args()
                .subject("tasklist")
                .path(rel)
                .command(format!("/tasks-new {}", ctx.ticket)),
        )
        .with_details(capped(&code_files, LIST_LIMIT));
    };

    let committed = git::show_head(ctx.root, &rel).unwrap_or_default();
    let added = new_checked_items(&committed, &current);
    if !added.is_empty() {
        return GateDecision::pass(GATE).with_details(capped(&added, LIST_LIMIT));
    }
    GateDecision::block(
        GATE,
        ReasonCode::TasklistProgressMissing,
        &ctx.args()
            .path(rel)
            .detail(summary(&code_files))
            .command(format!("aidd progress --ticket {}", ctx.ticket)),
    )
    .with_details(capped(&code_files, LIST_LIMIT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateStatus;
    use std::process::Command;
    use tempfile::TempDir;

    fn enabled() -> TasklistProgressSettings {
        TasklistProgressSettings::default()
    }

    fn sh_git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(["-c", "user.name=aidd", "-c", "user.email=aidd@example.com", "-c", "commit.gpgsign=false"])
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?}");
    }

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    /// A repository with a committed tasklist holding one open item.
    fn repo() -> Option<TempDir> {
        which::which("git").ok()?;
        let dir = TempDir::new().unwrap();
        sh_git(dir.path(), &["init", "-q"]);
        write(dir.path(), "docs/tasklist/T.md", "- [x] scaffold\n- [ ] login endpoint\n");
        write(dir.path(), "README.md", "demo\n");
        sh_git(dir.path(), &["add", "."]);
        sh_git(dir.path(), &["commit", "-q", "-m", "init"]);
        Some(dir)
    }

    #[test]
    fn code_file_filter() {
        let s = TasklistProgressSettings {
            code_globs: vec!["proto/**/*.proto".into()],
            ..enabled()
        };
        assert!(is_code_file("src/main.rs", "", &s));
        assert!(is_code_file("scripts/build.sh", "", &s));
        assert!(is_code_file("proto/v1/api.proto", "", &s));
        assert!(!is_code_file("README.md", "", &s));
        assert!(!is_code_file("docs/tasklist/T.md", "", &s));
        assert!(!is_code_file("docs/config.json", "", &s));
        assert!(!is_code_file("aidd/reports/prd/T.json", "aidd/", &s));
        assert!(is_code_file("aidd/hooks/run.sh", "aidd/", &s));
    }

    #[test]
    fn only_new_checked_lines_count() {
        let old = "- [x] scaffold\n- [ ] login\n";
        let new = "- [X]   Scaffold\n- [x] login\n- [x] login\n";
        assert_eq!(new_checked_items(old, new), vec!["- [x] login"]);
        assert!(new_checked_items(new, old).is_empty());
        assert_eq!(new_checked_items("", "  - [x] a\n"), vec!["- [x] a"]);
    }

    #[test]
    fn truthy_override_bypasses() {
        let s = enabled();
        let run = ProgressRun::resolve(&s, "gate", |k| (k == "CLAUDE_SKIP_TASKLIST_PROGRESS").then(|| "Yes".into()));
        assert_eq!(run.bypass.as_deref(), Some("CLAUDE_SKIP_TASKLIST_PROGRESS=yes"));
        let dir = TempDir::new().unwrap();
        let d = tasklist_progress(&GateContext::new(dir.path(), "T"), &s, &run);
        assert_eq!(d.reason_code, Some(ReasonCode::EnvBypass));

        let run = ProgressRun::resolve(&s, "gate", |_| Some("0".into()));
        assert_eq!(run.bypass, None);
    }

    #[test]
    fn sources_restrict_the_gate() {
        let s = TasklistProgressSettings {
            sources: vec!["implement".into()],
            ..enabled()
        };
        let dir = TempDir::new().unwrap();
        let run = ProgressRun::resolve(&s, "QA", |_| None);
        let d = tasklist_progress(&GateContext::new(dir.path(), "T"), &s, &run);
        assert_eq!(d.reason_code, Some(ReasonCode::SourceFiltered));
        assert!(d.message.contains("'qa'"));
    }

    #[test]
    fn code_change_without_checkbox_blocks() {
        let Some(dir) = repo() else { return };
        write(dir.path(), "src/login.rs", "fn login() {}\n");
        let run = ProgressRun::resolve(&enabled(), "manual", |_| None);
        let d = tasklist_progress(&GateContext::new(dir.path(), "T"), &enabled(), &run);
        assert_eq!(d.reason_code, Some(ReasonCode::TasklistProgressMissing));
        assert_eq!(d.exit_code, 1);
        assert!(d.message.contains("src/login.rs"));
        assert!(d.message.contains("docs/tasklist/T.md"));
        assert_eq!(d.details, vec!["src/login.rs"]);

        write(dir.path(), "docs/tasklist/T.md", "- [x] scaffold\n- [x] login endpoint\n");
        let d = tasklist_progress(&GateContext::new(dir.path(), "T"), &enabled(), &run);
        assert_eq!(d.status, GateStatus::Pass);
        assert_eq!(d.details, vec!["- [x] login endpoint"]);
    }

    #[test]
    fn docs_only_change_is_skipped() {
        let Some(dir) = repo() else { return };
        write(dir.path(), "README.md", "demo, edited\n");
        let run = ProgressRun::resolve(&enabled(), "manual", |_| None);
        let d = tasklist_progress(&GateContext::new(dir.path(), "T"), &enabled(), &run);
        assert_eq!(d.reason_code, Some(ReasonCode::NoCodeChanges));
    }

    #[test]
    fn missing_tasklist_blocks_unless_allowed() {
        let Some(dir) = repo() else { return };
        write(dir.path(), "src/lib.rs", "\n");
        let run = ProgressRun::resolve(&enabled(), "manual", |_| None);
        let d = tasklist_progress(&GateContext::new(dir.path(), "OTHER"), &enabled(), &run);
        assert_eq!(d.reason_code, Some(ReasonCode::ArtifactMissing));
        assert!(d.is_block());

        let lenient = TasklistProgressSettings {
            allow_missing_tasklist: true,
            ..enabled()
        };
        let d = tasklist_progress(&GateContext::new(dir.path(), "OTHER"), &lenient, &run);
        assert!(d.is_skip());
    }
}
