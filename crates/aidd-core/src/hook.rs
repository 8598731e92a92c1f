//! Host hook protocol: one JSON event in, one JSON decision out.

use crate::config::GatesConfig;
use crate::context_config::ContextConfig;
use crate::gate::{Gate, GateDecision, ReasonCode};
use crate::gates::{self, analyst::AnalystOverrides, progress::ProgressRun, qa::QaRun, GateContext};
use crate::git;
use crate::guard::{self, transcript::TranscriptCheck, GuardDecision, GuardEnv, Permission};
use crate::identifiers;
use crate::messages::{self, MessageArgs};
use crate::paths;
use crate::rate_limit;
use crate::reports::PackFormat;
use crate::snapshot::{self, SnapshotRequest};
use crate::working_set;
use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const HOOKS_MODE_ENV: &str = "AIDD_HOOKS_MODE";
/// Source name the Stop hook reports to the tasklist progress gate.
pub const PROGRESS_SOURCE: &str = "gate";

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    #[serde(alias = "hookEventName")]
    pub hook_event_name: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    SessionStart,
    UserPromptSubmit,
    PreToolUse,
    PreCompact,
    Stop,
    SubagentStop,
    Other,
}

impl HookEvent {
    pub fn parse(name: &str) -> Self {
        match name {
            "SessionStart" => HookEvent::SessionStart,
            "UserPromptSubmit" => HookEvent::UserPromptSubmit,
            "PreToolUse" => HookEvent::PreToolUse,
            "PreCompact" => HookEvent::PreCompact,
            "Stop" => HookEvent::Stop,
            "SubagentStop" => HookEvent::SubagentStop,
            _ => HookEvent::Other,
        }
    }
}

impl HookInput {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn event(&self) -> HookEvent {
        HookEvent::parse(&self.hook_event_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision: Option<Permission>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    pub suppress_output: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Default for HookOutput {
    fn default() -> Self {
        HookOutput {
            suppress_output: true,
            hook_specific_output: None,
            system_message: None,
            decision: None,
            reason: None,
        }
    }
}

impl HookOutput {
    pub fn from_guard(event_name: &str, decision: GuardDecision) -> Self {
        if decision.is_none() {
            return HookOutput::default();
        }
        HookOutput {
            hook_specific_output: Some(HookSpecificOutput {
                hook_event_name: event_name.to_string(),
                permission_decision: decision.permission,
                permission_decision_reason: decision.reason,
                updated_input: decision.updated_input,
                additional_context: None,
            }),
            system_message: decision.system_message,
            ..Default::default()
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        HookOutput {
            decision: Some("block".to_string()),
            reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Everything the CLI needs to finish the invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct HookReply {
    pub output: HookOutput,
    pub stderr: Option<String>,
    pub exit_code: i32,
}

impl HookReply {
    pub fn ok(output: HookOutput) -> Self {
        HookReply {
            output,
            stderr: None,
            exit_code: 0,
        }
    }

    /// An error or panic escaped the dispatcher.
    pub fn internal_error(detail: &str) -> Self {
        let args = MessageArgs::default().detail(detail);
        HookReply {
            output: HookOutput::default(),
            stderr: Some(messages::block(ReasonCode::GateInternalError, &args)),
            exit_code: 2,
        }
    }

    /// Unparseable payloads never block the agent.
    pub fn fail_open(error: &str) -> Self {
        tracing::warn!(error, "malformed hook payload; allowing");
        HookReply::ok(HookOutput {
            system_message: Some(format!("aidd hook: ignored malformed payload ({error})")),
            ..Default::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HookEnv {
    /// Workflow root; `None` when the project has no workflow.
    pub root: Option<PathBuf>,
    pub project_dir: PathBuf,
    pub fast_mode: bool,
    /// `NAME=value` of the tasklist progress override, when set.
    pub progress_bypass: Option<String>,
    pub qa_bypass: bool,
    pub format: PackFormat,
    pub now: f64,
}

fn env_flag(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|v| !v.is_empty())
}

/// `AIDD_HOOKS_MODE=fast` skips advisory checks.
pub fn fast_mode_from_env() -> bool {
    std::env::var(HOOKS_MODE_ENV).is_ok_and(|v| v.trim().eq_ignore_ascii_case("fast"))
}

impl HookEnv {
    /// Resolve from the payload's `cwd` and the process environment.
    pub fn from_input(input: &HookInput) -> Self {
        let project_dir = input
            .cwd
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("CLAUDE_PROJECT_DIR").map(PathBuf::from))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let root = match paths::resolve_workflow_root(&project_dir) {
            Ok(root) => Some(root),
            Err(e) => {
                tracing::debug!(error = %e, "no workflow root");
                None
            }
        };
        let progress_bypass = root.as_deref().and_then(|root| {
            let settings = GatesConfig::load(root).tasklist_progress();
            ProgressRun::resolve(&settings, PROGRESS_SOURCE, |name| std::env::var(name).ok()).bypass
        });
        HookEnv {
            root,
            project_dir,
            fast_mode: fast_mode_from_env(),
            progress_bypass,
            qa_bypass: env_flag(gates::qa::SKIP_ENV),
            format: PackFormat::from_env(),
            now: rate_limit::epoch_now(),
        }
    }

    fn context_config(&self) -> ContextConfig {
        match &self.root {
            Some(root) => ContextConfig::load(root),
            None => ContextConfig::defaults(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(input: &HookInput, env: &HookEnv) -> HookReply {
    tracing::debug!(event = %input.hook_event_name, tool = ?input.tool_name, "hook event");
    match input.event() {
        HookEvent::SessionStart | HookEvent::UserPromptSubmit => on_prompt(input, env),
        HookEvent::PreToolUse => on_pre_tool(input, env),
        HookEvent::PreCompact => on_pre_compact(input, env),
        HookEvent::Stop | HookEvent::SubagentStop => on_stop(env),
        HookEvent::Other => HookReply::ok(HookOutput::default()),
    }
}

fn on_prompt(input: &HookInput, env: &HookEnv) -> HookReply {
    let cfg = env.context_config();
    if !cfg.enabled {
        return HookReply::ok(HookOutput::default());
    }
    let transcript = input.transcript_path.as_deref().map(Path::new);
    let system_message = match guard::transcript::check(transcript, &cfg.transcript_limits) {
        TranscriptCheck::Block(reason) => return HookReply::ok(HookOutput::block(reason)),
        TranscriptCheck::Warn(message) => Some(message),
        TranscriptCheck::Ok => None,
    };
    let context = env
        .root
        .as_deref()
        .map(|root| working_set::build(root, &env.project_dir, &cfg).text)
        .filter(|t| !t.is_empty());
    HookReply::ok(HookOutput {
        hook_specific_output: context.map(|c| HookSpecificOutput {
            hook_event_name: input.hook_event_name.clone(),
            additional_context: Some(c),
            ..Default::default()
        }),
        system_message,
        ..Default::default()
    })
}

fn on_pre_tool(input: &HookInput, env: &HookEnv) -> HookReply {
    let cfg = env.context_config();
    let root = env.root.as_deref().unwrap_or(&env.project_dir);
    let guard_env = GuardEnv {
        root,
        project_dir: &env.project_dir,
        now: env.now,
    };
    let tool_input = input.tool_input.clone().unwrap_or(Value::Null);
    let decision = guard::pre_tool_use(
        &cfg,
        &guard_env,
        input.tool_name.as_deref().unwrap_or_default(),
        &tool_input,
    );
    HookReply::ok(HookOutput::from_guard(&input.hook_event_name, decision))
}

/// Snapshot the working set before compaction. Never blocks.
fn on_pre_compact(input: &HookInput, env: &HookEnv) -> HookReply {
    let Some(root) = env.root.as_deref() else {
        return HookReply::ok(HookOutput::default());
    };
    let cfg = env.context_config();
    if !cfg.enabled {
        return HookReply::ok(HookOutput::default());
    }
    let ws = working_set::build(root, &env.project_dir, &cfg);
    if ws.text.is_empty() {
        return HookReply::ok(HookOutput::default());
    }
    let request = SnapshotRequest {
        session_id: input.session_id.as_deref(),
        transcript_path: input.transcript_path.as_deref(),
        trigger: input.trigger.as_deref(),
        custom_instructions: input.custom_instructions.as_deref(),
        generated_at: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
    };
    if let Err(e) = snapshot::write(root, &ws, &request) {
        tracing::warn!(error = %e, "failed to write precompact snapshot");
    }
    HookReply::ok(HookOutput::default())
}

/// Workflow gates and the first stage (by rank) each applies from.
const WORKFLOW_GATES: &[(Gate, &str)] = &[
    (Gate::Analyst, "plan"),
    (Gate::PrdReview, "spec-interview"),
    (Gate::PlanReview, "review-prd"),
    (Gate::TasklistSpec, "implement"),
    (Gate::TasklistProgress, "implement"),
];

fn run_workflow_gate(gate: Gate, ctx: &GateContext<'_>, cfg: &GatesConfig, env: &HookEnv) -> Option<GateDecision> {
    Some(match gate {
        Gate::Analyst => gates::analyst::analyst(ctx, &cfg.analyst(), AnalystOverrides::default()),
        Gate::PrdReview => gates::review::prd_review(ctx, &cfg.prd_review(), env.format),
        Gate::PlanReview => gates::review::plan_review(ctx, &cfg.plan_review()),
        Gate::TasklistSpec => gates::tasklist::tasklist_spec(ctx, &cfg.tasklist_spec()),
        Gate::TasklistProgress => {
            let run = ProgressRun {
                bypass: env.progress_bypass.clone(),
                source: PROGRESS_SOURCE.to_string(),
            };
            gates::progress::tasklist_progress(ctx, &cfg.tasklist_progress(), &run)
        }
        _ => return None,
    })
}

fn blocked(decision: &GateDecision) -> HookReply {
    HookReply {
        output: HookOutput::block(decision.message.clone()),
        stderr: Some(decision.render()),
        exit_code: 2,
    }
}

fn on_stop(env: &HookEnv) -> HookReply {
    let Some(root) = env.root.as_deref() else {
        return HookReply::ok(HookOutput::default());
    };
    let ids = identifiers::read_identifiers(root);
    let Some(ticket) = ids.resolved_ticket() else {
        return HookReply::ok(HookOutput::default());
    };
    let branch = git::current_branch(&env.project_dir);
    let ctx = GateContext {
        root,
        ticket,
        slug: ids.resolved_slug().unwrap_or(ticket),
        branch: branch.as_deref(),
        file_path: None,
    };
    let cfg = GatesConfig::load(root);
    let stage = identifiers::read_active_stage(root);
    let rank = stage.as_deref().and_then(identifiers::stage_rank);

    for (gate, from) in WORKFLOW_GATES {
        let applies = match (rank, identifiers::stage_rank(from)) {
            (Some(current), Some(min)) => current >= min,
            _ => false,
        };
        if !applies {
            continue;
        }
        let Some(decision) = run_workflow_gate(*gate, &ctx, &cfg, env) else {
            continue;
        };
        gates::record_as(&ctx, &decision, "gate-workflow", "hook");
        if decision.is_block() {
            return blocked(&decision);
        }
    }

    let mut advisories = Vec::new();
    let qa_run = QaRun {
        bypass: env.qa_bypass,
        require_stage: true,
        format: env.format,
        now: env.now,
    };
    let qa = gates::qa::qa(&ctx, &cfg.qa(), qa_run);
    gates::record(&ctx, &qa, "hook");
    if qa.is_block() {
        return blocked(&qa);
    }
    advisories.extend(qa.warnings);

    let deps = gates::deps::deps_allowlist(&ctx, &cfg.deps_allowlist(), env.fast_mode);
    advisories.extend(deps.warnings);

    HookReply::ok(HookOutput {
        system_message: (!advisories.is_empty()).then(|| advisories.join("\n")),
        ..Default::default()
    })
}
