//! Working-set builder: a bounded summary of the active ticket injected into
//! each prompt.

use crate::context_config::{ContextConfig, GuardMode, WorkingSetLimits};
use crate::git;
use crate::identifiers::{self, FeatureIdentifiers};
use crate::io::read_head;
use crate::markdown::{self, CheckState};
use crate::paths;
use chrono::{Local, SecondsFormat};
use serde::Serialize;
use std::path::Path;

pub const HEADER: &str = "### AIDD Working Set (auto-generated)";
const TRUNCATED: &str = "\n\n... (truncated)\n";
const CODE_TRUNCATED: &str = "... (code block truncated) ...";
const MAX_READ_BYTES: u64 = 300_000;
const PRD_MAX_LINES: usize = 220;
const PRD_MAX_CHARS: usize = 1500;
const RESEARCH_MAX_CHARS: usize = 1200;
const FENCE_MAX_LINES: usize = 25;
const GIT_STATUS_INLINE: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkingSet {
    pub text: String,
    pub ticket: Option<String>,
    pub slug: Option<String>,
}

/// Inputs resolved by the caller. `generated` is the timestamp written in the
/// header; `include_git` lets tests run without a repository.
#[derive(Debug, Clone)]
pub struct WorkingSetInputs<'a> {
    pub root: &'a Path,
    pub project_dir: &'a Path,
    pub ids: FeatureIdentifiers,
    pub stage: Option<String>,
    pub generated: String,
    pub include_git: bool,
}

fn char_prefix(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Cut to `max_chars` characters, trimmed on the right.
fn cap(text: &str, max_chars: usize) -> String {
    char_prefix(text, max_chars).trim_end().to_string()
}

/// Keep the first 25 lines of every fenced code block.
pub fn strip_long_code_blocks(md: &str) -> String {
    let mut out = Vec::new();
    let mut in_fence = false;
    let mut fence_lines = 0;
    for line in md.lines() {
        if line.trim().starts_with("```") {
            in_fence = !in_fence;
            fence_lines = 0;
            out.push(line);
            continue;
        }
        if in_fence {
            fence_lines += 1;
            if fence_lines <= FENCE_MAX_LINES {
                out.push(line);
            } else if fence_lines == FENCE_MAX_LINES + 1 {
                out.push(CODE_TRUNCATED);
            }
            continue;
        }
        out.push(line);
    }
    out.join("\n")
}

/// Open checkboxes (up to `max_tasks`), done count, total count.
pub fn tasks(md: &str, max_tasks: usize) -> (Vec<String>, usize, usize) {
    let mut open = Vec::new();
    let (mut done, mut total) = (0, 0);
    for item in md.lines().filter_map(markdown::checkbox) {
        match item.state {
            CheckState::Open => {
                total += 1;
                if open.len() < max_tasks {
                    open.push(format!("- [ ] {}", item.text));
                }
            }
            CheckState::Closed => {
                total += 1;
                done += 1;
            }
            CheckState::Other => {}
        }
    }
    (open, done, total)
}

/// First `max_lines` lines, then at most `max_chars` characters.
pub fn excerpt(md: &str, max_lines: usize, max_chars: usize) -> Option<String> {
    let mut text = md.trim().to_string();
    if text.is_empty() {
        return None;
    }
    if max_lines > 0 {
        text = text.lines().take(max_lines).collect::<Vec<_>>().join("\n").trim().to_string();
    }
    if max_chars > 0 && text.chars().count() > max_chars {
        text = cap(&text, max_chars);
    }
    (!text.is_empty()).then_some(text)
}

fn prd_section(root: &Path, ticket: &str) -> Option<Vec<String>> {
    let text = read_head(&paths::prd_path(root, ticket), MAX_READ_BYTES)?;
    let title = text
        .lines()
        .take(40)
        .find_map(|l| l.strip_prefix("# "))
        .map(str::trim);
    let status = text
        .lines()
        .take(80)
        .map(str::trim)
        .find(|l| l.to_lowercase().starts_with("status:"));
    let head: String = text.lines().take(PRD_MAX_LINES).collect::<Vec<_>>().join("\n");
    let body = excerpt(&strip_long_code_blocks(&head), 0, PRD_MAX_CHARS);

    let mut out = vec!["#### PRD".to_string()];
    out.push(format!("- Path: {}", paths::display_rel(root, &paths::prd_path(root, ticket))));
    if let Some(title) = title {
        out.push(format!("- Title: {title}"));
    }
    if let Some(status) = status {
        out.push(format!("- {status}"));
    }
    if let Some(body) = body {
        out.push(String::new());
        out.push(body);
    }
    Some(out)
}

fn research_section(root: &Path, ticket: &str) -> Option<Vec<String>> {
    let text = read_head(&paths::research_path(root, ticket), MAX_READ_BYTES)?;
    let body = excerpt(&text, 0, RESEARCH_MAX_CHARS)?;
    Some(vec!["#### Research (excerpt)".to_string(), body])
}

fn call_graph_section(root: &Path, ticket: &str) -> Option<Vec<String>> {
    let found = paths::call_graph_paths(root, ticket);
    if found.is_empty() {
        return None;
    }
    let mut out = vec!["#### Call graph".to_string()];
    out.extend(found.iter().map(|p| format!("- {}", paths::display_rel(root, p))));
    Some(out)
}

fn context_pack_section(root: &Path, ticket: &str, tasklist: Option<&str>, limits: &WorkingSetLimits) -> Option<Vec<String>> {
    let body = tasklist
        .and_then(|t| markdown::anchor(t, "CONTEXT_PACK"))
        .or_else(|| read_head(&root.join(paths::REPORTS_DIR).join("context").join(format!("{ticket}.pack.md")), MAX_READ_BYTES))?;
    let text = excerpt(
        &strip_long_code_blocks(&body),
        limits.context_pack_max_lines,
        limits.context_pack_max_chars,
    )?;
    Some(vec!["#### Context Pack".to_string(), text])
}

fn tasklist_section(tasklist: &str, limits: &WorkingSetLimits) -> Vec<String> {
    let (open, done, total) = tasks(tasklist, limits.max_tasks);
    let mut out = vec!["#### Tasklist".to_string()];
    if total > 0 {
        out.push(format!("- Progress: {done}/{total} done"));
    }
    out.extend(open);
    out
}

fn repo_section(project_dir: &Path, limits: &WorkingSetLimits) -> Option<Vec<String>> {
    let branch = git::current_branch(project_dir);
    let mut status = git::status_lines(project_dir);
    if branch.is_none() && status.is_empty() {
        return None;
    }
    let mut out = vec!["#### Repo state".to_string()];
    if let Some(branch) = branch {
        out.push(format!("- Branch: {branch}"));
    }
    if !status.is_empty() {
        status.truncate(limits.max_git_status_lines);
        out.push(format!("- Dirty files: {}", status.len()));
        out.extend(status.iter().take(GIT_STATUS_INLINE).map(|l| format!("  - {l}")));
    }
    Some(out)
}

/// Apply the `max_chars` cap with a visible marker.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(120);
    format!("{}{TRUNCATED}", char_prefix(text, keep).trim_end())
}

pub fn compose(inputs: &WorkingSetInputs<'_>, limits: &WorkingSetLimits) -> WorkingSet {
    let ticket = inputs.ids.resolved_ticket().map(str::to_string);
    let slug = inputs.ids.slug_hint.clone();

    let mut parts: Vec<String> = vec![HEADER.to_string(), format!("- Generated: {}", inputs.generated)];
    if let Some(t) = &ticket {
        match &slug {
            Some(s) => parts.push(format!("- Ticket: {t} (slug: {s})")),
            None => parts.push(format!("- Ticket: {t}")),
        }
    }
    if let Some(stage) = &inputs.stage {
        parts.push(format!("- Stage: {stage}"));
        let anchor = Path::new(paths::DOCS_DIR).join("anchors").join(format!("{stage}.md"));
        if inputs.root.join(&anchor).is_file() {
            parts.push(format!("- Stage anchor: {}", anchor.to_string_lossy()));
        }
    }
    parts.push(String::new());

    let mut push = |section: Vec<String>| {
        parts.extend(section);
        parts.push(String::new());
    };

    if let Some(t) = ticket.as_deref() {
        let tasklist = read_head(&paths::tasklist_path(inputs.root, t), MAX_READ_BYTES);
        for section in [
            prd_section(inputs.root, t),
            research_section(inputs.root, t),
            call_graph_section(inputs.root, t),
            context_pack_section(inputs.root, t, tasklist.as_deref(), limits),
            tasklist.as_deref().map(|md| tasklist_section(md, limits)),
        ]
        .into_iter()
        .flatten()
        {
            push(section);
        }
    }
    if inputs.include_git && limits.include_git_status {
        if let Some(section) = repo_section(inputs.project_dir, limits) {
            push(section);
        }
    }

    let text = parts.join("\n").trim().to_string();
    WorkingSet {
        text: truncate(&text, limits.max_chars),
        ticket,
        slug,
    }
}

/// Build from disk. Empty when the context guard is disabled or `off`.
pub fn build(root: &Path, project_dir: &Path, cfg: &ContextConfig) -> WorkingSet {
    build_for(root, project_dir, cfg, identifiers::read_identifiers(root))
}

/// Like [`build`] for explicit identifiers.
pub fn build_for(root: &Path, project_dir: &Path, cfg: &ContextConfig, ids: FeatureIdentifiers) -> WorkingSet {
    if !cfg.enabled || cfg.mode == GuardMode::Off {
        return WorkingSet::default();
    }
    let inputs = WorkingSetInputs {
        root,
        project_dir,
        ids,
        stage: identifiers::read_active_stage(root),
        generated: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        include_git: true,
    };
    compose(&inputs, &cfg.working_set)
}
