//! Tasklist spec readiness gate (pre-implement).

use super::{preamble, GateContext};
use crate::config::TasklistSettings;
use crate::gate::{Gate, GateDecision, ReasonCode};
use crate::markdown::{self, CheckboxItem};
use crate::paths;
use regex::Regex;
use std::sync::OnceLock;

const GATE: Gate = Gate::TasklistSpec;
const NONE_VALUES: &[&str] = &["none", "нет", "n/a", "na"];

fn spec_ready_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*Status:\s*READY\b").expect("valid regex"))
}

fn profile_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bprofile:\s*(fast|targeted|full|none)\b").expect("valid regex")
    })
}

fn tests_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*(?:[-*]\s*)?Tests\s*:").expect("valid regex"))
}

fn blocker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\(blocker\)").expect("valid regex"))
}

fn open_checkbox_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*-\s+\[\s*\]\s+").expect("valid regex"))
}

fn command_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:\./\S+|/\S+|[A-Za-z0-9_.-]+(?:/[A-Za-z0-9_.-]+)+|[A-Za-z0-9_.-]+)(?:\s|$)",
        )
        .expect("valid regex")
    })
}

fn label_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9 _/+-]{2,40}:\s*(?P<command>.+)$").expect("valid regex")
    })
}

fn non_command_hint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:per-iteration(?:\s+test)?\s+commands?|iteration-specific\s+patterns?|test\s+commands?\s+listed\s+below|commands?\s+listed\s+below|see\s+below)\b",
        )
        .expect("valid regex")
    })
}

// ---------------------------------------------------------------------------
// Tests.tasks entries
// ---------------------------------------------------------------------------

/// Strip surrounding backticks and a `Label: cmd` prefix when what follows
/// looks like a command.
pub fn normalize_task(raw: &str) -> String {
    let mut text = raw.trim();
    if text.len() >= 2 && text.starts_with('`') && text.ends_with('`') {
        text = text[1..text.len() - 1].trim();
    }
    if let Some(caps) = label_prefix_re().captures(text) {
        let command = caps["command"].trim();
        if !command.is_empty() && command_like_re().is_match(command) {
            return command.to_string();
        }
    }
    text.to_string()
}

/// First unquoted `&&`, `||` or `;` in a single task entry.
pub fn shell_chain_token(command: &str) -> Option<&'static str> {
    let bytes = command.as_bytes();
    let (mut in_single, mut in_double, mut escaped) = (false, false, false);
    let mut idx = 0;
    while idx < bytes.len() {
        let ch = bytes[idx];
        if escaped {
            escaped = false;
        } else if ch == b'\\' {
            escaped = true;
        } else if ch == b'\'' && !in_double {
            in_single = !in_single;
        } else if ch == b'"' && !in_single {
            in_double = !in_double;
        } else if !in_single && !in_double {
            if bytes[idx..].starts_with(b"&&") {
                return Some("&&");
            }
            if bytes[idx..].starts_with(b"||") {
                return Some("||");
            }
            if ch == b';' {
                return Some(";");
            }
        }
        idx += 1;
    }
    None
}

/// A single executable command: parses as shell words, is not a builtin like
/// `cd`, and its head looks like a program or path.
pub fn looks_like_command(command: &str) -> bool {
    let value = command.trim();
    if value.is_empty() || non_command_hint_re().is_match(value) {
        return false;
    }
    if matches!(value.to_lowercase().as_str(), "none" | "n/a" | "not set" | "tbd") {
        return false;
    }
    let Some(parts) = shlex::split(value) else {
        return false;
    };
    let Some(head) = parts.first().map(|h| h.trim()) else {
        return false;
    };
    if head.is_empty() || head == "cd" {
        return false;
    }
    if matches!(head.to_lowercase().as_str(), "none" | "n/a" | "not" | "tbd") {
        return false;
    }
    command_like_re().is_match(head)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskIssue {
    pub code: ReasonCode,
    pub item: usize,
    pub entry: String,
}

/// Problems with the `Tests.tasks` entries of one NEXT_3 item.
pub fn task_issues(item_no: usize, item: &CheckboxItem) -> Vec<TaskIssue> {
    let mut issues = Vec::new();
    for raw in markdown::list_field(&item.lines, "tasks") {
        let entry = normalize_task(&raw);
        if entry.is_empty() {
            continue;
        }
        let code = if shell_chain_token(&entry).is_some() {
            ReasonCode::TasklistShellChainSingleEntry
        } else if !looks_like_command(&entry) {
            ReasonCode::TasklistNonCommandEntry
        } else {
            continue;
        };
        issues.push(TaskIssue {
            code,
            item: item_no,
            entry,
        });
    }
    issues
}

// ---------------------------------------------------------------------------
// Section checks
// ---------------------------------------------------------------------------

/// Fields missing from a NEXT_3 item, in display order.
fn missing_fields(item: &CheckboxItem) -> Vec<&'static str> {
    let mut missing = Vec::new();
    for field in ["DoD", "Boundaries"] {
        match markdown::field_value(&item.lines, field) {
            Some(v) if !markdown::is_placeholder(&v) => {}
            _ => missing.push(field),
        }
    }
    let body = item.lines.join("\n");
    if !tests_field_re().is_match(&body) {
        missing.push("Tests");
    }
    if !profile_re().is_match(&body) {
        missing.push("Tests.profile");
    }
    missing
}

fn blocker_lines(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let marker = blocker_re().find(line)?;
            let rest = &line[marker.end()..];
            let text = rest.trim_matches(|c: char| c.is_whitespace() || ":.-".contains(c));
            let lowered = text.to_lowercase();
            if text.is_empty() || NONE_VALUES.contains(&lowered.as_str()) || markdown::is_placeholder(text) {
                None
            } else {
                Some(line.trim().to_string())
            }
        })
        .collect()
}

/// Checklist lines between the "coverage checklist" marker and the next
/// heading or "question queue" marker.
fn coverage_block(body: &str) -> Vec<&str> {
    let mut inside = false;
    let mut out = Vec::new();
    for line in body.lines() {
        let lower = line.to_lowercase();
        if !inside {
            inside = lower.contains("coverage checklist");
            continue;
        }
        let trimmed = line.trim_start();
        if trimmed.starts_with("##") || lower.contains("question queue") {
            break;
        }
        if trimmed.starts_with("- [") {
            out.push(line);
        }
    }
    out
}

pub fn tasklist_spec(ctx: &GateContext<'_>, settings: &TasklistSettings) -> GateDecision {
    if let Some(skip) = preamble(GATE, &settings.filter, ctx) {
        return skip;
    }
    let path = paths::tasklist_path(ctx.root, ctx.ticket);
    let rel = ctx.rel(&path);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return GateDecision::block(
            GATE,
            ReasonCode::ArtifactMissing,
            &ctx.args()
                .subject("tasklist")
                .path(rel)
                .command(format!("/tasks-new {}", ctx.ticket)),
        );
    };
    let fail = |code: ReasonCode, detail: &str| {
        GateDecision::block(
            GATE,
            code,
            &ctx.args()
                .path(rel.as_str())
                .detail(detail)
                .command(format!("/spec-interview {}", ctx.ticket)),
        )
    };

    let anchors = markdown::anchors(&text);

    let Some(spec) = anchors.get("SPEC") else {
        return fail(ReasonCode::TasklistSpecNotReady, "missing section: ## AIDD:SPEC");
    };
    if !spec_ready_re().is_match(spec) {
        return fail(ReasonCode::TasklistSpecNotReady, "AIDD:SPEC Status is not READY");
    }

    if let Some(questions) = anchors.get("OPEN_QUESTIONS") {
        let blockers = blocker_lines(questions);
        if !blockers.is_empty() {
            return fail(
                ReasonCode::TasklistBlockerQuestion,
                "blocker questions present in AIDD:OPEN_QUESTIONS",
            )
            .with_details(blockers);
        }
    }

    let Some(next3) = anchors.get("NEXT_3") else {
        return fail(ReasonCode::TasklistNext3Incomplete, "missing section: ## AIDD:NEXT_3");
    };
    let items = markdown::checkbox_items(next3);
    if items.len() < 3 {
        return fail(ReasonCode::TasklistNext3Incomplete, "AIDD:NEXT_3 has fewer than 3 checkboxes");
    }
    let incomplete: Vec<String> = items
        .iter()
        .take(3)
        .enumerate()
        .filter_map(|(i, item)| {
            let missing = missing_fields(item);
            if missing.is_empty() {
                None
            } else {
                Some(format!("item {} missing: {} -> {}", i + 1, missing.join(", "), item.header))
            }
        })
        .collect();
    if !incomplete.is_empty() {
        return fail(
            ReasonCode::TasklistNext3Incomplete,
            "AIDD:NEXT_3 items missing required fields",
        )
        .with_details(incomplete);
    }

    let Some(interview) = anchors.get("INTERVIEW") else {
        return fail(ReasonCode::TasklistInterviewIncomplete, "missing section: ## AIDD:INTERVIEW");
    };
    let coverage = coverage_block(interview);
    if coverage.is_empty() {
        return fail(
            ReasonCode::TasklistInterviewIncomplete,
            "coverage checklist missing in AIDD:INTERVIEW",
        );
    }
    let open: Vec<String> = coverage
        .iter()
        .filter(|l| open_checkbox_re().is_match(l))
        .map(|l| l.trim().to_string())
        .collect();
    if !open.is_empty() {
        return fail(
            ReasonCode::TasklistInterviewIncomplete,
            "coverage checklist not complete in AIDD:INTERVIEW",
        )
        .with_details(open);
    }

    let issues: Vec<TaskIssue> = items
        .iter()
        .enumerate()
        .flat_map(|(i, item)| task_issues(i + 1, item))
        .collect();
    if let Some(first) = issues.first() {
        let detail = match first.code {
            ReasonCode::TasklistShellChainSingleEntry => {
                "Tests.tasks entry chains several commands; split it into one command per entry"
            }
            _ => "Tests.tasks entry is not an executable command",
        };
        let lines = issues
            .iter()
            .map(|i| format!("item {}: {} ({})", i.item, i.entry, i.code))
            .collect();
        return fail(first.code, detail).with_details(lines);
    }

    GateDecision::pass(GATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateStatus;
    use std::path::Path;
    use tempfile::TempDir;

    const ITEM: &str = "- [ ] I{n}: step\n  - DoD: endpoint returns 200\n  - Boundaries: api/\n  - Tests:\n    - profile: fast\n    - tasks:\n      - cargo test -p api\n";

    fn next3() -> String {
        (1..=3).map(|n| ITEM.replace("{n}", &n.to_string())).collect()
    }

    fn full_tasklist() -> String {
        format!(
            "# Tasklist\n\n## AIDD:SPEC\nStatus: READY\n\n## AIDD:OPEN_QUESTIONS\n- (blocker): none\n\n## AIDD:NEXT_3\n{}\n## AIDD:INTERVIEW\n### Coverage checklist\n- [x] scope\n- [x] risks\n### Question queue\n- [ ] later\n",
            next3()
        )
    }

    fn write(root: &Path, body: &str) {
        let p = paths::tasklist_path(root, "T");
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, body).unwrap();
    }

    fn run(root: &Path) -> GateDecision {
        tasklist_spec(&GateContext::new(root, "T"), &TasklistSettings::default())
    }

    #[test]
    fn complete_tasklist_passes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), &full_tasklist());
        let d = run(dir.path());
        assert_eq!(d.status, GateStatus::Pass, "{}", d.render());
    }

    #[test]
    fn missing_next3_section() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "## AIDD:SPEC\nStatus: READY\n");
        let d = run(dir.path());
        assert_eq!(d.reason_code, Some(ReasonCode::TasklistNext3Incomplete));
        assert!(d.message.contains("missing section: ## AIDD:NEXT_3"));
        assert_eq!(d.exit_code, 2);
    }

    #[test]
    fn spec_must_be_ready() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "## AIDD:SPEC\nStatus: DRAFT\n");
        let d = run(dir.path());
        assert_eq!(d.reason_code, Some(ReasonCode::TasklistSpecNotReady));
        assert!(d.message.contains("AIDD:SPEC Status is not READY"));
    }

    #[test]
    fn blocker_question_blocks() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            &full_tasklist().replace("- (blocker): none", "- (blocker): which database?"),
        );
        assert_eq!(run(dir.path()).reason_code, Some(ReasonCode::TasklistBlockerQuestion));

        write(dir.path(), &full_tasklist().replace("- (blocker): none", "- (blocker) - нет."));
        assert_eq!(run(dir.path()).status, GateStatus::Pass);
    }

    #[test]
    fn blocker_marker_after_non_ascii_text() {
        assert_eq!(
            blocker_lines("- İİİ (blocker): нужен доступ к API\n"),
            vec!["- İİİ (blocker): нужен доступ к API".to_string()]
        );
        assert_eq!(blocker_lines("- Ünïcode (BLOCKER): нет\n"), Vec::<String>::new());
        assert!(blocker_lines("- İstanbul без маркера\n").is_empty());
    }

    #[test]
    fn next3_field_checks() {
        let dir = TempDir::new().unwrap();
        let broken = full_tasklist().replacen("  - DoD: endpoint returns 200\n", "  - DoD: <tbd>\n", 1);
        write(dir.path(), &broken);
        let d = run(dir.path());
        assert_eq!(d.reason_code, Some(ReasonCode::TasklistNext3Incomplete));
        assert!(d.details[0].starts_with("item 1 missing: DoD -> - [ ] I1"));

        let no_profile = full_tasklist().replace("    - profile: fast\n", "");
        write(dir.path(), &no_profile);
        let d = run(dir.path());
        assert!(d.details[0].contains("Tests.profile"));
    }

    #[test]
    fn fewer_than_three_items() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            &format!("## AIDD:SPEC\nStatus: READY\n## AIDD:NEXT_3\n{}", ITEM.replace("{n}", "1")),
        );
        assert!(run(dir.path()).message.contains("fewer than 3 checkboxes"));
    }

    #[test]
    fn interview_coverage() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), &full_tasklist().replace("- [x] risks", "- [ ] risks"));
        let d = run(dir.path());
        assert_eq!(d.reason_code, Some(ReasonCode::TasklistInterviewIncomplete));
        assert!(d.message.contains("not complete"));

        let no_interview = full_tasklist();
        let cut = no_interview.find("## AIDD:INTERVIEW").unwrap();
        write(dir.path(), &no_interview[..cut]);
        assert!(run(dir.path()).message.contains("missing section: ## AIDD:INTERVIEW"));
    }

    #[test]
    fn chained_task_entry_blocks() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            &full_tasklist().replacen("cargo test -p api", "cargo build && cargo test", 1),
        );
        let d = run(dir.path());
        assert_eq!(d.reason_code, Some(ReasonCode::TasklistShellChainSingleEntry));

        write(dir.path(), &full_tasklist().replacen("cargo test -p api", "cd api", 1));
        assert_eq!(run(dir.path()).reason_code, Some(ReasonCode::TasklistNonCommandEntry));
    }

    #[test]
    fn missing_tasklist_blocks() {
        let dir = TempDir::new().unwrap();
        let d = run(dir.path());
        assert_eq!(d.reason_code, Some(ReasonCode::ArtifactMissing));
    }

    #[test]
    fn command_helpers() {
        assert_eq!(normalize_task("`pytest -q`"), "pytest -q");
        assert_eq!(normalize_task("Unit tests: pytest -q"), "pytest -q");
        assert_eq!(shell_chain_token("echo 'a && b'"), None);
        assert_eq!(shell_chain_token("make a; make b"), Some(";"));
        assert_eq!(shell_chain_token(r#"run "x" || true"#), Some("||"));
        assert!(looks_like_command("./gradlew test"));
        assert!(looks_like_command("npm run test"));
        assert!(!looks_like_command("see below"));
        assert!(!looks_like_command("cd src"));
        assert!(!looks_like_command("echo 'unterminated"));
    }
}
