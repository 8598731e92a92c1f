//! QA gate: report structure, blocking findings and the tasklist handoff.

use super::{preamble, GateContext};
use crate::config::{HandoffMode, QaSettings};
use crate::gate::{Gate, GateDecision, ReasonCode};
use crate::identifiers;
use crate::markdown::{self, CheckState};
use crate::paths;
use crate::rate_limit;
use crate::reports::{self, PackFormat, ReportLoad};
use serde_json::Value;

const GATE: Gate = Gate::Qa;
pub const SKIP_ENV: &str = "CLAUDE_SKIP_QA";
const SUMMARY_VALUES: &[&str] = &["pass", "warn", "fail"];

/// Runtime inputs that do not come from `config/gates.json`.
#[derive(Debug, Clone, Copy)]
pub struct QaRun {
    /// `CLAUDE_SKIP_QA` was set.
    pub bypass: bool,
    /// Skip unless the active stage is `qa`.
    pub require_stage: bool,
    pub format: PackFormat,
    pub now: f64,
}

impl QaRun {
    pub fn from_env(require_stage: bool) -> Self {
        QaRun {
            bypass: std::env::var_os(SKIP_ENV).is_some_and(|v| !v.is_empty()),
            require_stage,
            format: PackFormat::from_env(),
            now: rate_limit::epoch_now(),
        }
    }
}

/// Problems with the report body, empty when it is acceptable.
pub fn report_problems(report: &Value, blocking: &[String]) -> Vec<String> {
    let mut problems = Vec::new();
    match report.get("tests_summary").and_then(Value::as_str) {
        None => problems.push("missing field tests_summary".to_string()),
        Some(s) => {
            let s = s.trim().to_lowercase();
            if !SUMMARY_VALUES.contains(&s.as_str()) {
                problems.push(format!("tests_summary '{s}' is not one of pass|warn|fail"));
            }
        }
    }
    for key in ["tests_executed", "findings"] {
        if !report.get(key).is_some_and(Value::is_array) {
            problems.push(format!("missing array {key}"));
        }
    }
    for finding in reports::blocking_findings(report, blocking) {
        problems.push(format!("blocking finding {finding}"));
    }
    problems
}

/// QA handoff checkboxes: under `## AIDD:HANDOFF_INBOX` when present, the
/// whole tasklist otherwise.
fn handoff_items(tasklist: &str, report_rel: &str) -> Vec<markdown::ActionItem> {
    let scope = markdown::anchor(tasklist, "HANDOFF_INBOX").unwrap_or_else(|| tasklist.to_string());
    scope
        .lines()
        .filter_map(markdown::checkbox)
        .filter(|item| {
            let lower = item.text.to_lowercase();
            lower.contains("source: qa")
                || lower.split(|c: char| !c.is_alphanumeric()).any(|w| w == "qa")
                || (!report_rel.is_empty() && item.text.contains(report_rel))
        })
        .collect()
}

fn handoff_problem(ctx: &GateContext<'_>, report_rel: &str) -> Option<String> {
    let path = paths::tasklist_path(ctx.root, ctx.ticket);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Some("tasklist is missing".to_string());
    };
    let items = handoff_items(&text, report_rel);
    if items.is_empty() {
        return Some("no QA checkbox found".to_string());
    }
    let open = items.iter().filter(|i| i.state == CheckState::Open).count();
    (open > 0).then(|| format!("{open} QA item(s) still open"))
}

pub fn qa(ctx: &GateContext<'_>, settings: &QaSettings, run: QaRun) -> GateDecision {
    if let Some(skip) = preamble(GATE, &settings.filter, ctx) {
        return skip;
    }
    if run.bypass {
        return GateDecision::skip(GATE, ReasonCode::EnvBypass, &ctx.args().detail(SKIP_ENV));
    }
    if run.require_stage {
        let stage = identifiers::read_active_stage(ctx.root).unwrap_or_default();
        if stage != "qa" {
            return GateDecision::skip(GATE, ReasonCode::StageMismatch, &ctx.args().status(stage));
        }
    }

    let stamp = paths::qa_stamp_path(ctx.root, ctx.ticket);
    if settings.debounce_minutes > 0 {
        if let Some(last) = rate_limit::read_stamp(&stamp) {
            let elapsed = run.now - last;
            if elapsed >= 0.0 && elapsed < settings.debounce_minutes.saturating_mul(60) as f64 {
                return GateDecision::skip(
                    GATE,
                    ReasonCode::Debounced,
                    &ctx.args().detail(format!("{}s", elapsed as u64)),
                );
            }
        }
    }

    let remedy = format!("/qa {}", ctx.ticket);
    let report_path = reports::resolve_template(
        ctx.root,
        &settings.report,
        ctx.ticket,
        ctx.slug,
        ctx.branch.unwrap_or_default(),
    );
    let report_rel = ctx.rel(&report_path);
    match reports::load_report(&report_path, run.format) {
        ReportLoad::Missing if settings.allow_missing_report => {}
        ReportLoad::Missing => {
            return GateDecision::block(
                GATE,
                ReasonCode::ReportMissing,
                &ctx.args().path(report_rel.as_str()).command(remedy),
            );
        }
        ReportLoad::Corrupted { path, error } => {
            return GateDecision::block(
                GATE,
                ReasonCode::QaFindings,
                &ctx.args().path(ctx.rel(&path)).detail(error).command(remedy),
            );
        }
        ReportLoad::Loaded { path, value } => {
            let blocking: Vec<String> = settings
                .blocking_severities
                .iter()
                .map(|s| s.trim().to_lowercase())
                .collect();
            let problems = report_problems(&value, &blocking);
            if !problems.is_empty() {
                return GateDecision::block(
                    GATE,
                    ReasonCode::QaFindings,
                    &ctx.args()
                        .path(ctx.rel(&path))
                        .detail(problems.join("; "))
                        .command(remedy),
                )
                .with_details(problems);
            }
        }
    }

    let mut warnings = Vec::new();
    if settings.handoff {
        if let Some(problem) = handoff_problem(ctx, &report_rel) {
            let tasklist = ctx.rel(&paths::tasklist_path(ctx.root, ctx.ticket));
            match settings.handoff_mode {
                HandoffMode::Block => {
                    return GateDecision::block(
                        GATE,
                        ReasonCode::HandoffTasklist,
                        &ctx.args().detail(problem).path(tasklist),
                    );
                }
                HandoffMode::Warn => {
                    warnings.push(format!("WARN: QA handoff не отражён в {tasklist}: {problem}"));
                }
            }
        }
    }

    if let Err(e) = rate_limit::write_stamp(&stamp, run.now) {
        tracing::warn!(path = %stamp.display(), error = %e, "failed to write QA debounce stamp");
    }
    GateDecision::pass(GATE).with_warnings(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateStatus;
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    fn run_at(now: f64) -> QaRun {
        QaRun {
            bypass: false,
            require_stage: true,
            format: PackFormat::Yaml,
            now,
        }
    }

    fn setup(root: &Path, report: Option<Value>) {
        identifiers::write_active_stage(root, "qa", false).unwrap();
        if let Some(report) = report {
            let p = root.join("reports/qa/T.json");
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, report.to_string()).unwrap();
        }
    }

    fn good_report() -> Value {
        json!({"tests_summary": "pass", "tests_executed": [], "findings": []})
    }

    #[test]
    fn missing_report_blocks_with_exit_2() {
        let dir = TempDir::new().unwrap();
        setup(dir.path(), None);
        let d = qa(&GateContext::new(dir.path(), "T"), &QaSettings::default(), run_at(1000.0));
        assert_eq!(d.reason_code, Some(ReasonCode::ReportMissing));
        assert_eq!(d.exit_code, 2);
        assert!(d.message.contains("отчёт QA не создан"));
    }

    #[test]
    fn other_stage_skips() {
        let dir = TempDir::new().unwrap();
        identifiers::write_active_stage(dir.path(), "implement", false).unwrap();
        let d = qa(&GateContext::new(dir.path(), "T"), &QaSettings::default(), run_at(0.0));
        assert_eq!(d.reason_code, Some(ReasonCode::StageMismatch));
    }

    #[test]
    fn bypass_skips() {
        let dir = TempDir::new().unwrap();
        let run = QaRun {
            bypass: true,
            ..run_at(0.0)
        };
        let d = qa(&GateContext::new(dir.path(), "T"), &QaSettings::default(), run);
        assert_eq!(d.reason_code, Some(ReasonCode::EnvBypass));
    }

    #[test]
    fn report_shape_and_findings() {
        let dir = TempDir::new().unwrap();
        setup(dir.path(), Some(json!({"tests_summary": "maybe", "findings": []})));
        let d = qa(&GateContext::new(dir.path(), "T"), &QaSettings::default(), run_at(0.0));
        assert_eq!(d.reason_code, Some(ReasonCode::QaFindings));
        assert_eq!(d.details.len(), 2);

        setup(
            dir.path(),
            Some(json!({
                "tests_summary": "fail",
                "tests_executed": [],
                "findings": [{"severity": "critical", "title": "crash on save"}]
            })),
        );
        let d = qa(&GateContext::new(dir.path(), "T"), &QaSettings::default(), run_at(0.0));
        assert!(d.message.contains("[critical] crash on save"));
    }

    #[test]
    fn pass_writes_stamp_and_debounces() {
        let dir = TempDir::new().unwrap();
        setup(dir.path(), Some(good_report()));
        let settings = QaSettings {
            debounce_minutes: 10,
            ..Default::default()
        };
        let ctx = GateContext::new(dir.path(), "T");
        assert_eq!(qa(&ctx, &settings, run_at(1000.0)).status, GateStatus::Pass);
        let again = qa(&ctx, &settings, run_at(1100.0));
        assert_eq!(again.reason_code, Some(ReasonCode::Debounced));
        assert_eq!(qa(&ctx, &settings, run_at(1700.0)).status, GateStatus::Pass);
    }

    #[test]
    fn huge_debounce_window_saturates() {
        let dir = TempDir::new().unwrap();
        setup(dir.path(), Some(good_report()));
        let settings = QaSettings {
            debounce_minutes: u64::MAX,
            ..Default::default()
        };
        let ctx = GateContext::new(dir.path(), "T");
        assert_eq!(qa(&ctx, &settings, run_at(1000.0)).status, GateStatus::Pass);
        let again = qa(&ctx, &settings, run_at(1_000_000.0));
        assert_eq!(again.reason_code, Some(ReasonCode::Debounced));
    }

    #[test]
    fn handoff_block_and_warn() {
        let dir = TempDir::new().unwrap();
        setup(dir.path(), Some(good_report()));
        let tasklist = paths::tasklist_path(dir.path(), "T");
        std::fs::create_dir_all(tasklist.parent().unwrap()).unwrap();
        std::fs::write(&tasklist, "## AIDD:HANDOFF_INBOX\n- [ ] fix login (source: qa)\n").unwrap();

        let ctx = GateContext::new(dir.path(), "T");
        let mut settings = QaSettings {
            handoff: true,
            ..Default::default()
        };
        let d = qa(&ctx, &settings, run_at(0.0));
        assert_eq!(d.reason_code, Some(ReasonCode::HandoffTasklist));

        settings.handoff_mode = HandoffMode::Warn;
        let d = qa(&ctx, &settings, run_at(0.0));
        assert_eq!(d.status, GateStatus::Pass);
        assert_eq!(d.warnings.len(), 1);

        std::fs::write(&tasklist, "## AIDD:HANDOFF_INBOX\n- [x] fix login (source: qa)\n").unwrap();
        settings.handoff_mode = HandoffMode::Block;
        assert_eq!(qa(&ctx, &settings, run_at(0.0)).status, GateStatus::Pass);
    }
}
