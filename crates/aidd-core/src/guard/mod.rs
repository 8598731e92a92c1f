//! Context guard: pre-tool decisions for `Bash` and `Read`, and the
//! transcript-size check run on prompt submission.

pub mod bash;
pub mod read;
pub mod transcript;

use crate::context_config::{ContextConfig, GuardMode, PromptInjectionGuard};
use crate::rate_limit;
use serde::Serialize;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

/// Tokens that put a Bash command in scope for `light` mode.
const AIDD_TOKENS: &[&str] = &["aidd/", "docs/", "reports/", "config/", ".cache/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Allow,
    Ask,
    Deny,
}

/// What the guard wants the host to do. `permission: None` means no opinion:
/// the hook prints an empty envelope and the tool call proceeds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuardDecision {
    pub permission: Option<Permission>,
    pub reason: Option<String>,
    pub system_message: Option<String>,
    pub updated_input: Option<Value>,
}

impl GuardDecision {
    pub fn none() -> Self {
        GuardDecision::default()
    }

    pub fn with(permission: Permission, reason: impl Into<String>, message: impl Into<String>) -> Self {
        GuardDecision {
            permission: Some(permission),
            reason: Some(reason.into()),
            system_message: Some(message.into()),
            updated_input: None,
        }
    }

    /// Allow carrying the injection warning, or no opinion when there is none.
    pub fn allow_with_notice(reason: &str, notice: Option<String>) -> Self {
        match notice {
            Some(message) => GuardDecision::with(Permission::Allow, reason, message),
            None => GuardDecision::none(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.permission.is_none()
    }
}

/// Filesystem context for one guard invocation.
#[derive(Debug, Clone, Copy)]
pub struct GuardEnv<'a> {
    pub root: &'a Path,
    pub project_dir: &'a Path,
    pub now: f64,
}

impl GuardEnv<'_> {
    pub fn log_dir(&self, raw: &str) -> PathBuf {
        rate_limit::resolve_log_dir(self.root, self.project_dir, raw)
    }

    /// `true` when `guard` already fired within `interval` seconds.
    pub fn rate_limited(&self, log_dir_raw: &str, guard: &str, interval: f64) -> bool {
        rate_limit::should_rate_limit(&self.log_dir(log_dir_raw), guard, interval, self.now)
    }

    /// Tool path made absolute against the project dir, then the workflow root.
    pub fn resolve_tool_path(&self, raw: &str) -> PathBuf {
        let candidate = PathBuf::from(raw);
        if candidate.is_absolute() {
            return lexical_normalize(&candidate);
        }
        let from_project = lexical_normalize(&self.project_dir.join(&candidate));
        if from_project.exists() {
            return from_project;
        }
        let from_root = lexical_normalize(&self.root.join(&candidate));
        if from_root.exists() {
            from_root
        } else {
            from_project
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Scope checks
// ---------------------------------------------------------------------------

pub fn command_targets_aidd(command: &str) -> bool {
    let lowered = command.to_lowercase();
    AIDD_TOKENS.iter().any(|t| lowered.contains(t))
}

pub fn is_aidd_scoped(env: &GuardEnv<'_>, raw: &str) -> bool {
    if raw.trim().is_empty() {
        return false;
    }
    let path = env.resolve_tool_path(raw);
    if let Ok(rel) = path.strip_prefix(lexical_normalize(env.root)) {
        let rel = rel.to_string_lossy().replace('\\', "/");
        if !rel.is_empty() {
            return AIDD_TOKENS[1..].iter().any(|t| rel.starts_with(t));
        }
    }
    let text = path.to_string_lossy().replace('\\', "/");
    text.contains("/aidd/") || text.ends_with("/aidd") || text.starts_with("aidd/")
}

// ---------------------------------------------------------------------------
// Prompt-injection notice
// ---------------------------------------------------------------------------

fn segments(guard: &PromptInjectionGuard) -> Vec<String> {
    guard
        .path_segments
        .iter()
        .map(|s| s.trim().trim_matches(|c: char| c == '/' || c == '\\').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn command_has_segment(command: &str, segments: &[String]) -> bool {
    let lowered = command.to_lowercase();
    segments.iter().any(|seg| {
        let seg = seg.to_lowercase();
        lowered.contains(&format!("{seg}/")) || lowered.contains(&format!("{seg}\\"))
    })
}

pub fn path_has_segment(path: &Path, segments: &[String]) -> bool {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .any(|part| segments.iter().any(|s| s == part))
}

pub enum InjectionTarget<'a> {
    Command(&'a str),
    Path(&'a Path),
}

/// The configured warning when the target touches a dependency directory
/// and the guard has not fired recently.
pub fn injection_notice(cfg: &ContextConfig, env: &GuardEnv<'_>, target: InjectionTarget<'_>) -> Option<String> {
    let guard = &cfg.prompt_injection_guard;
    if !guard.enabled {
        return None;
    }
    let segments = segments(guard);
    if segments.is_empty() {
        return None;
    }
    let hit = match target {
        InjectionTarget::Command(cmd) => command_has_segment(cmd, &segments),
        InjectionTarget::Path(path) => path_has_segment(path, &segments),
    };
    if !hit || env.rate_limited(&guard.log_dir, "prompt_injection", guard.min_interval_seconds) {
        return None;
    }
    let message = guard.message.trim();
    Some(if message.is_empty() {
        crate::messages::DEFAULT_INJECTION_MESSAGE.to_string()
    } else {
        message.to_string()
    })
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// `file_path`, `path` or `filename` from a tool input.
pub fn tool_path(input: &Value) -> Option<&str> {
    ["file_path", "path", "filename"]
        .iter()
        .find_map(|k| input.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Decide on one `PreToolUse` call. Tools other than `Bash` and `Read` get no
/// opinion.
pub fn pre_tool_use(cfg: &ContextConfig, env: &GuardEnv<'_>, tool_name: &str, input: &Value) -> GuardDecision {
    if !cfg.enabled || cfg.mode == GuardMode::Off {
        return GuardDecision::none();
    }
    if cfg.mode == GuardMode::Light {
        let in_scope = match tool_name {
            "Bash" => command_targets_aidd(input.get("command").and_then(Value::as_str).unwrap_or_default()),
            _ => tool_path(input).is_some_and(|p| is_aidd_scoped(env, p)),
        };
        if !in_scope {
            return GuardDecision::none();
        }
    }
    match tool_name {
        "Bash" => match input.get("command").and_then(Value::as_str) {
            Some(cmd) if !cmd.trim().is_empty() => bash::decide(cfg, env, cmd),
            _ => GuardDecision::none(),
        },
        "Read" => match tool_path(input) {
            Some(path) => read::decide(cfg, env, path),
            None => GuardDecision::none(),
        },
        _ => GuardDecision::none(),
    }
}
