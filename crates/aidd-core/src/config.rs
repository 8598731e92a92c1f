//! `config/gates.json`: per-gate policy with documented defaults.
//!
//! Loading never fails. A missing file means every gate runs with defaults;
//! malformed JSON or a section of the wrong shape degrades to defaults with a
//! warning on stderr.

use crate::paths;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

fn default_true() -> bool {
    true
}

fn default_blocking_statuses() -> Vec<String> {
    vec!["blocked".to_string()]
}

fn default_blocking_severities() -> Vec<String> {
    vec!["critical".to_string()]
}

// ---------------------------------------------------------------------------
// Branch filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BranchFilter {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub skip_branches: Vec<String>,
}

impl Default for BranchFilter {
    fn default() -> Self {
        BranchFilter {
            enabled: true,
            branches: Vec::new(),
            skip_branches: Vec::new(),
        }
    }
}

/// Shell-glob match (`*`, `?`, `[...]`). Patterns that fail to compile are
/// compared literally.
pub fn glob_matches(pattern: &str, value: &str) -> bool {
    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches(value),
        Err(_) => pattern == value,
    }
}

fn any_match(patterns: &[String], value: &str) -> bool {
    patterns
        .iter()
        .filter(|p| !p.trim().is_empty())
        .any(|p| glob_matches(p.trim(), value))
}

impl BranchFilter {
    /// `skip_branches` wins over `branches`. An unknown branch is allowed.
    pub fn allows(&self, branch: Option<&str>) -> bool {
        let Some(branch) = branch.map(str::trim).filter(|b| !b.is_empty()) else {
            return true;
        };
        if any_match(&self.skip_branches, branch) {
            return false;
        }
        self.branches.is_empty() || any_match(&self.branches, branch)
    }
}

// ---------------------------------------------------------------------------
// Per-gate settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReviewGateSettings {
    #[serde(flatten)]
    pub filter: BranchFilter,
    pub allow_missing_section: bool,
    pub require_action_items_closed: bool,
    pub approved_statuses: Option<Vec<String>>,
    pub blocking_statuses: Vec<String>,
    pub blocking_severities: Vec<String>,
    pub report_path: Option<String>,
    pub allow_missing_report: bool,
    #[serde(alias = "skip_on_prd_edit", alias = "skip_on_plan_edit")]
    pub skip_on_edit: bool,
    pub check_dialog_draft: bool,
}

impl Default for ReviewGateSettings {
    fn default() -> Self {
        ReviewGateSettings {
            filter: BranchFilter::default(),
            allow_missing_section: false,
            require_action_items_closed: true,
            approved_statuses: None,
            blocking_statuses: default_blocking_statuses(),
            blocking_severities: default_blocking_severities(),
            report_path: None,
            allow_missing_report: false,
            skip_on_edit: false,
            check_dialog_draft: true,
        }
    }
}

fn lowered(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

impl ReviewGateSettings {
    /// Configured approved statuses, or `defaults` when none are configured.
    pub fn approved(&self, defaults: &[&str]) -> Vec<String> {
        match &self.approved_statuses {
            Some(list) if !lowered(list).is_empty() => lowered(list),
            _ => defaults.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn blocking(&self) -> Vec<String> {
        lowered(&self.blocking_statuses)
    }

    pub fn severities(&self) -> Vec<String> {
        lowered(&self.blocking_severities)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TasklistSettings {
    #[serde(flatten)]
    pub filter: BranchFilter,
}

/// Repository prefixes whose changes count as code for the progress gate.
pub const DEFAULT_CODE_PREFIXES: &[&str] = &[
    "src/", "tests/", "test/", "app/", "apps/", "service/", "services/", "backend/", "frontend/",
    "lib/", "libs/", "core/", "packages/", "modules/", "cmd/",
];

pub const DEFAULT_PROGRESS_OVERRIDE_ENV: &str = "CLAUDE_SKIP_TASKLIST_PROGRESS";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TasklistProgressSettings {
    #[serde(flatten)]
    pub filter: BranchFilter,
    pub code_prefixes: Vec<String>,
    pub code_globs: Vec<String>,
    pub allow_missing_tasklist: bool,
    /// Variable that bypasses the gate when set to a truthy value.
    pub override_env: Option<String>,
    /// Invocation sources the gate applies to; empty means all.
    pub sources: Vec<String>,
}

impl Default for TasklistProgressSettings {
    fn default() -> Self {
        TasklistProgressSettings {
            filter: BranchFilter::default(),
            code_prefixes: DEFAULT_CODE_PREFIXES.iter().map(|p| p.to_string()).collect(),
            code_globs: Vec::new(),
            allow_missing_tasklist: false,
            override_env: Some(DEFAULT_PROGRESS_OVERRIDE_ENV.to_string()),
            sources: Vec::new(),
        }
    }
}

fn normalize_prefix(value: &str) -> Option<String> {
    let value = value.trim().replace('\\', "/");
    if value.is_empty() {
        return None;
    }
    Some(if value.ends_with('/') { value } else { format!("{value}/") })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
    #[default]
    Block,
    Warn,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QaSettings {
    #[serde(flatten)]
    pub filter: BranchFilter,
    /// QA runner command. Recorded for display only; this crate never executes it.
    pub command: Vec<String>,
    pub report: String,
    pub allow_missing_report: bool,
    pub debounce_minutes: u64,
    pub handoff: bool,
    pub handoff_mode: HandoffMode,
    pub blocking_severities: Vec<String>,
}

impl Default for QaSettings {
    fn default() -> Self {
        QaSettings {
            filter: BranchFilter::default(),
            command: Vec::new(),
            report: "reports/qa/{ticket}.json".to_string(),
            allow_missing_report: false,
            debounce_minutes: 0,
            handoff: false,
            handoff_mode: HandoffMode::Block,
            blocking_severities: default_blocking_severities(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalystSettings {
    #[serde(flatten)]
    pub filter: BranchFilter,
    pub min_questions: usize,
    pub require_ready: bool,
    pub allow_blocked: bool,
    pub check_open_questions: bool,
    pub require_dialog_section: bool,
}

impl Default for AnalystSettings {
    fn default() -> Self {
        AnalystSettings {
            filter: BranchFilter::default(),
            min_questions: 1,
            require_ready: true,
            allow_blocked: false,
            check_open_questions: true,
            require_dialog_section: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepsMode {
    #[default]
    Default,
    GradleOnly,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DepsSettings {
    pub enabled: bool,
    pub files: Vec<String>,
    pub mode: DepsMode,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct GatesConfig {
    raw: Map<String, Value>,
}

impl GatesConfig {
    pub fn load(root: &Path) -> Self {
        let path = root.join(paths::GATES_CONFIG);
        let Ok(text) = std::fs::read_to_string(&path) else {
            return GatesConfig::default();
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(raw)) => GatesConfig { raw },
            Ok(_) => {
                tracing::warn!(path = %path.display(), "gates config is not a JSON object; using defaults");
                GatesConfig::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed gates config; using defaults");
                GatesConfig::default()
            }
        }
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(raw) => GatesConfig { raw },
            _ => GatesConfig::default(),
        }
    }

    /// Raw section with the boolean shorthand expanded to `{enabled: bool}`.
    pub fn section(&self, key: &str) -> Option<Value> {
        match self.raw.get(key)? {
            Value::Bool(b) => Some(serde_json::json!({ "enabled": b })),
            Value::Object(map) => Some(Value::Object(map.clone())),
            other => {
                tracing::warn!(key, value = %other, "gates config section has unexpected shape; using defaults");
                None
            }
        }
    }

    pub fn has_section(&self, key: &str) -> bool {
        self.raw.contains_key(key)
    }

    fn settings<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let Some(section) = self.section(key) else {
            return T::default();
        };
        serde_json::from_value(section).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "invalid gates config section; using defaults");
            T::default()
        })
    }

    pub fn prd_review(&self) -> ReviewGateSettings {
        let mut s: ReviewGateSettings = self.settings("prd_review");
        if s.report_path.is_none() {
            s.report_path = Some("reports/prd/{ticket}.json".to_string());
        }
        s
    }

    pub fn plan_review(&self) -> ReviewGateSettings {
        self.settings("plan_review")
    }

    pub fn tasklist_spec(&self) -> TasklistSettings {
        self.settings("tasklist_spec")
    }

    /// Off unless `tasklist_progress` is present. Prefixes gain a trailing
    /// slash; an empty list falls back to [`DEFAULT_CODE_PREFIXES`].
    pub fn tasklist_progress(&self) -> TasklistProgressSettings {
        let mut s: TasklistProgressSettings = self.settings("tasklist_progress");
        if !self.has_section("tasklist_progress") {
            s.filter.enabled = false;
        }
        s.code_prefixes = s.code_prefixes.iter().filter_map(|p| normalize_prefix(p)).collect();
        if s.code_prefixes.is_empty() {
            s.code_prefixes = TasklistProgressSettings::default().code_prefixes;
        }
        s.code_globs = s
            .code_globs
            .iter()
            .map(|g| g.trim().replace('\\', "/"))
            .filter(|g| !g.is_empty())
            .collect();
        s.override_env = s.override_env.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        s.sources = lowered(&s.sources);
        s
    }

    pub fn qa(&self) -> QaSettings {
        self.settings("qa")
    }

    pub fn analyst(&self) -> AnalystSettings {
        self.settings("analyst")
    }

    /// `deps_allowlist` plus the legacy top-level `deps_allowlist_files` and
    /// `deps_allowlist_mode` keys.
    pub fn deps_allowlist(&self) -> DepsSettings {
        let mut s: DepsSettings = self.settings("deps_allowlist");
        if s.files.is_empty() {
            match self.raw.get("deps_allowlist_files") {
                Some(Value::Array(items)) => {
                    s.files = items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                }
                Some(Value::String(list)) => {
                    s.files = list
                        .split([',', ' '])
                        .filter(|p| !p.trim().is_empty())
                        .map(|p| p.trim().to_string())
                        .collect();
                }
                _ => {}
            }
        }
        if let Some(Value::String(mode)) = self.raw.get("deps_allowlist_mode") {
            if mode.trim().eq_ignore_ascii_case("gradle-only") {
                s.mode = DepsMode::GradleOnly;
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = GatesConfig::load(dir.path());
        let prd = cfg.prd_review();
        assert!(prd.filter.enabled);
        assert!(prd.require_action_items_closed);
        assert_eq!(prd.blocking(), vec!["blocked"]);
        assert_eq!(prd.severities(), vec!["critical"]);
        assert_eq!(prd.report_path.as_deref(), Some("reports/prd/{ticket}.json"));
        assert_eq!(cfg.plan_review().report_path, None);
        assert!(!cfg.deps_allowlist().enabled);
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join(paths::GATES_CONFIG), "{ nope").unwrap();
        let cfg = GatesConfig::load(dir.path());
        assert!(cfg.qa().filter.enabled);
    }

    #[test]
    fn boolean_shorthand() {
        let cfg = GatesConfig::from_value(json!({"prd_review": false, "deps_allowlist": true}));
        assert!(!cfg.prd_review().filter.enabled);
        assert!(cfg.deps_allowlist().enabled);
    }

    #[test]
    fn approved_statuses_prefer_config() {
        let cfg = GatesConfig::from_value(json!({"prd_review": {"approved_statuses": ["Approved"]}}));
        assert_eq!(cfg.prd_review().approved(&["ready"]), vec!["approved"]);
        assert_eq!(cfg.plan_review().approved(&["ready"]), vec!["ready"]);
    }

    #[test]
    fn qa_fields() {
        let cfg = GatesConfig::from_value(json!({
            "qa": {"command": ["false"], "debounce_minutes": 10, "handoff": true, "handoff_mode": "warn"}
        }));
        let qa = cfg.qa();
        assert_eq!(qa.command, vec!["false"]);
        assert_eq!(qa.debounce_minutes, 10);
        assert_eq!(qa.handoff_mode, HandoffMode::Warn);
        assert_eq!(qa.report, "reports/qa/{ticket}.json");
    }

    #[test]
    fn tasklist_progress_is_opt_in() {
        let cfg = GatesConfig::default();
        let progress = cfg.tasklist_progress();
        assert!(!progress.filter.enabled);
        assert_eq!(progress.override_env.as_deref(), Some(DEFAULT_PROGRESS_OVERRIDE_ENV));

        let cfg = GatesConfig::from_value(json!({
            "tasklist_progress": {
                "code_prefixes": ["server", " ", "web\\ui/"],
                "code_globs": ["*.proto"],
                "override_env": "",
                "sources": ["Implement"]
            }
        }));
        let progress = cfg.tasklist_progress();
        assert!(progress.filter.enabled);
        assert_eq!(progress.code_prefixes, vec!["server/", "web/ui/"]);
        assert_eq!(progress.code_globs, vec!["*.proto"]);
        assert_eq!(progress.override_env, None);
        assert_eq!(progress.sources, vec!["implement"]);

        let cfg = GatesConfig::from_value(json!({"tasklist_progress": {"code_prefixes": []}}));
        assert_eq!(cfg.tasklist_progress().code_prefixes.len(), DEFAULT_CODE_PREFIXES.len());
    }

    #[test]
    fn deps_legacy_keys() {
        let cfg = GatesConfig::from_value(json!({
            "deps_allowlist": true,
            "deps_allowlist_files": "build.gradle, settings.gradle",
            "deps_allowlist_mode": "gradle-only"
        }));
        let deps = cfg.deps_allowlist();
        assert_eq!(deps.files, vec!["build.gradle", "settings.gradle"]);
        assert_eq!(deps.mode, DepsMode::GradleOnly);
    }

    #[test]
    fn skip_branches_win() {
        let filter = BranchFilter {
            enabled: true,
            branches: vec!["feature/*".into()],
            skip_branches: vec!["feature/wip-*".into()],
        };
        assert!(filter.allows(Some("feature/login")));
        assert!(!filter.allows(Some("feature/wip-x")));
        assert!(!filter.allows(Some("main")));
        assert!(filter.allows(None));
    }

    #[test]
    fn glob_character_classes() {
        assert!(glob_matches("release/v[0-9]*", "release/v2.1"));
        assert!(glob_matches("hotfix-?", "hotfix-a"));
        assert!(!glob_matches("hotfix-?", "hotfix-ab"));
    }

    #[test]
    fn skip_on_edit_aliases() {
        let cfg = GatesConfig::from_value(json!({"prd_review": {"skip_on_prd_edit": true}}));
        assert!(cfg.prd_review().skip_on_edit);
    }
}
