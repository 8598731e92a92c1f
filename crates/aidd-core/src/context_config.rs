//! `config/context_gc.json`, deep-merged over a static default literal.

use crate::paths;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

/// Recursive merge: objects merge per key, every other shape replaces.
pub fn merge(default: &Value, overlay: &Value) -> Value {
    match (default, overlay) {
        (Value::Object(base), Value::Object(over)) => {
            let mut out = base.clone();
            for (k, v) in over {
                let merged = match base.get(k) {
                    Some(existing) => merge(existing, v),
                    None => v.clone(),
                };
                out.insert(k.clone(), merged);
            }
            Value::Object(out)
        }
        (_, over) => over.clone(),
    }
}

pub fn default_value() -> Value {
    json!({
        "enabled": true,
        "mode": "strict",
        "working_set": {
            "max_chars": 6000,
            "max_tasks": 25,
            "max_open_questions": 15,
            "context_pack_max_lines": 20,
            "context_pack_max_chars": 1200,
            "include_git_status": true,
            "max_git_status_lines": 60
        },
        "transcript_limits": {
            "soft_bytes": 2_500_000,
            "hard_bytes": 4_500_000,
            "hard_behavior": "block_prompt"
        },
        "bash_output_guard": {
            "enabled": true,
            "tail_lines": 200,
            "log_dir": "aidd/reports/logs",
            "only_for_regex": r"(docker\s+logs|kubectl\s+logs|journalctl|gradlew|mvn|npm|pnpm|pytest|go\s+test|cat\s+)",
            "skip_if_regex": r"(--tail\s+|\|\s*tail\b|>\s*\S+|2>\s*\S+|--quiet\b|--silent\b)",
            "min_interval_seconds": 0
        },
        "read_guard": {
            "enabled": true,
            "max_bytes": 200_000,
            "ask_instead_of_deny": true,
            "log_dir": "aidd/reports/logs",
            "min_interval_seconds": 0
        },
        "dangerous_bash_guard": {
            "enabled": true,
            "mode": "ask",
            "patterns": [
                r"\brm\s+-[a-zA-Z]*r[a-zA-Z]*f\b",
                r"\brm\s+-[a-zA-Z]*f[a-zA-Z]*r\b",
                r"\bgit\s+reset\s+--hard\b",
                r"\bgit\s+clean\s+-[a-zA-Z]*f",
                r"\bgit\s+push\b.*(--force\b|\s-f\b)"
            ]
        },
        "prompt_injection_guard": {
            "enabled": true,
            "path_segments": ["node_modules", ".venv", "venv", "vendor", "site-packages", "third_party"],
            "message": crate::messages::DEFAULT_INJECTION_MESSAGE,
            "log_dir": "aidd/reports/logs",
            "min_interval_seconds": 300
        }
    })
}

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardMode {
    Off,
    Light,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardBehavior {
    BlockPrompt,
    WarnOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    Ask,
    Deny,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkingSetLimits {
    pub max_chars: usize,
    pub max_tasks: usize,
    pub max_open_questions: usize,
    pub context_pack_max_lines: usize,
    pub context_pack_max_chars: usize,
    pub include_git_status: bool,
    pub max_git_status_lines: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptLimits {
    pub soft_bytes: u64,
    pub hard_bytes: u64,
    pub hard_behavior: HardBehavior,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BashOutputGuard {
    pub enabled: bool,
    pub tail_lines: u32,
    pub log_dir: String,
    pub only_for_regex: String,
    pub skip_if_regex: String,
    pub min_interval_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadGuard {
    pub enabled: bool,
    pub max_bytes: u64,
    pub ask_instead_of_deny: bool,
    pub log_dir: String,
    pub min_interval_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DangerousBashGuard {
    pub enabled: bool,
    pub mode: PermissionMode,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptInjectionGuard {
    pub enabled: bool,
    pub path_segments: Vec<String>,
    pub message: String,
    pub log_dir: String,
    pub min_interval_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    pub enabled: bool,
    pub mode: GuardMode,
    pub working_set: WorkingSetLimits,
    pub transcript_limits: TranscriptLimits,
    pub bash_output_guard: BashOutputGuard,
    pub read_guard: ReadGuard,
    pub dangerous_bash_guard: DangerousBashGuard,
    pub prompt_injection_guard: PromptInjectionGuard,
}

impl ContextConfig {
    pub fn defaults() -> Self {
        Self::from_overrides(&Value::Null)
    }

    /// Merge `overrides` over the defaults. An override that breaks the typed
    /// shape is dropped with a warning.
    pub fn from_overrides(overrides: &Value) -> Self {
        let defaults = default_value();
        let merged = match overrides {
            Value::Object(_) => merge(&defaults, overrides),
            _ => defaults.clone(),
        };
        match serde_json::from_value::<ContextConfig>(merged) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "invalid context_gc overrides; using defaults");
                Self::from_defaults_literal(defaults)
            }
        }
    }

    fn from_defaults_literal(defaults: Value) -> Self {
        serde_json::from_value(defaults).expect("context_gc defaults match ContextConfig")
    }

    pub fn load(root: &Path) -> Self {
        let path = root.join(paths::CONTEXT_GC_CONFIG);
        let Ok(text) = std::fs::read_to_string(&path) else {
            return Self::defaults();
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(v) => Self::from_overrides(&v),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed context_gc config; using defaults");
                Self::defaults()
            }
        }
    }
}
