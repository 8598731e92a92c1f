//! Analyst dialog gate: numbered question/answer pairs and a readiness status
//! inside the PRD.

use super::{preamble, GateContext};
use crate::config::AnalystSettings;
use crate::gate::{Gate, GateDecision, ReasonCode};
use crate::gates::review::ANALYST_DIALOG_HEADING;
use crate::markdown;
use crate::paths;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

pub const OPEN_QUESTIONS_HEADING: &str = "10. Открытые вопросы";
const ALLOWED_STATUSES: &[&str] = &["READY", "BLOCKED", "PENDING"];

fn question_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*Вопрос\s+(\d+)\s*:").expect("valid regex"))
}

fn answer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*Ответ\s+(\d+)\s*:").expect("valid regex"))
}

fn status_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*Status:\s*([A-Za-z]+)").expect("valid regex"))
}

/// Per-invocation overrides from the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalystOverrides {
    pub min_questions: Option<usize>,
    pub require_ready: Option<bool>,
    pub allow_blocked: Option<bool>,
}

fn numbers(re: &Regex, text: &str) -> BTreeSet<u32> {
    re.captures_iter(text)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// First three entries, then an ellipsis.
fn sample(nums: &[u32]) -> String {
    let mut out = nums
        .iter()
        .take(3)
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if nums.len() > 3 {
        out.push_str(", …");
    }
    out
}

pub fn analyst(ctx: &GateContext<'_>, settings: &AnalystSettings, overrides: AnalystOverrides) -> GateDecision {
    const GATE: Gate = Gate::Analyst;
    if let Some(skip) = preamble(GATE, &settings.filter, ctx) {
        return skip;
    }
    let prd_path = paths::prd_path(ctx.root, ctx.ticket);
    let Ok(text) = std::fs::read_to_string(&prd_path) else {
        return GateDecision::block(GATE, ReasonCode::MissingPrd, &ctx.args().path(ctx.rel(&prd_path)));
    };

    let remedy = format!("/idea-new {}", ctx.ticket);
    let block = |code: ReasonCode, detail: String| {
        GateDecision::block(GATE, code, &ctx.args().detail(detail).command(remedy.as_str()))
    };

    let sections = markdown::sections(&text);
    let dialog = sections.get_prefix_ignore_case(ANALYST_DIALOG_HEADING);
    if settings.require_dialog_section && dialog.is_none() {
        return block(
            ReasonCode::AnalystMissingDialog,
            format!("PRD не содержит раздела `## {ANALYST_DIALOG_HEADING}`"),
        );
    }

    let questions = numbers(question_re(), &text);
    let answers = numbers(answer_re(), &text);

    let min_questions = overrides.min_questions.unwrap_or(settings.min_questions);
    if min_questions > 0 && questions.len() < min_questions {
        return block(
            ReasonCode::AnalystMinQuestions,
            format!("analyst должен задать минимум {min_questions} вопрос(ов) в формате «Вопрос N: …»"),
        );
    }

    if let Some(&max) = questions.iter().next_back() {
        // One past the sample size is enough for the ellipsis.
        let missing: Vec<u32> = (1..=max).filter(|n| !questions.contains(n)).take(4).collect();
        if !missing.is_empty() {
            return block(
                ReasonCode::AnalystNumberingGap,
                format!(
                    "нарушена последовательность нумерации вопросов (пропущены {}); перенумеруйте вопросы и ответы",
                    sample(&missing)
                ),
            );
        }
    }

    let orphans: Vec<u32> = answers.difference(&questions).copied().collect();
    if !orphans.is_empty() {
        return block(
            ReasonCode::AnalystOrphanAnswer,
            format!(
                "найдены ответы без соответствующих вопросов ({}); согласуйте пары «Вопрос N»/«Ответ N»",
                sample(&orphans)
            ),
        );
    }

    let unanswered: Vec<u32> = questions.difference(&answers).copied().collect();
    if !unanswered.is_empty() {
        return block(
            ReasonCode::AnalystMissingAnswer,
            format!(
                "отсутствуют ответы для вопросов {}; ответьте в формате «Ответ N: …»",
                sample(&unanswered)
            ),
        );
    }

    // The dialog's own status line, falling back to the first one in the file.
    let status = dialog
        .and_then(|body| status_re().captures(body))
        .or_else(|| status_re().captures(&text))
        .map(|c| c[1].to_uppercase());
    let Some(status) = status else {
        return block(
            ReasonCode::AnalystStatusInvalid,
            format!("в PRD отсутствует строка `Status:` → обновите раздел `## {ANALYST_DIALOG_HEADING}`"),
        );
    };
    if !ALLOWED_STATUSES.contains(&status.as_str()) {
        return block(
            ReasonCode::AnalystStatusInvalid,
            format!("некорректное значение статуса (`{status}`), допустимо READY|BLOCKED|PENDING"),
        );
    }

    let require_ready = overrides.require_ready.unwrap_or(settings.require_ready);
    let allow_blocked = overrides.allow_blocked.unwrap_or(settings.allow_blocked);
    if require_ready && status == "BLOCKED" && !allow_blocked {
        return block(
            ReasonCode::AnalystStatusBlocked,
            "PRD помечен Status: BLOCKED; ответьте на вопросы и доведите цикл до READY".to_string(),
        );
    }
    if require_ready && status == "PENDING" {
        return block(
            ReasonCode::AnalystStatusPending,
            "статус PENDING; закройте вопросы и установите Status: READY".to_string(),
        );
    }

    if settings.check_open_questions && status == "READY" {
        let open = sections
            .get(OPEN_QUESTIONS_HEADING)
            .map(markdown::status_and_actions)
            .is_some_and(|b| b.has_open_items());
        if open {
            return block(
                ReasonCode::AnalystOpenQuestions,
                "статус READY, но раздел «Открытые вопросы» содержит незакрытые пункты".to_string(),
            );
        }
    }

    GateDecision::pass(GATE)
}
