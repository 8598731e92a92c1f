//! PRD review and plan review gates.

use super::{preamble, GateContext};
use crate::config::ReviewGateSettings;
use crate::gate::{Gate, GateDecision, ReasonCode};
use crate::markdown;
use crate::paths;
use crate::reports::{self, PackFormat, ReportLoad};
use std::path::PathBuf;

pub const PRD_REVIEW_HEADING: &str = "PRD Review";
pub const PLAN_REVIEW_HEADING: &str = "Plan Review";
pub const ANALYST_DIALOG_HEADING: &str = "Диалог analyst";

const PRD_APPROVED_DEFAULT: &[&str] = &["ready", "approved"];
const PLAN_APPROVED_DEFAULT: &[&str] = &["ready"];

/// What differs between the PRD and plan variants.
struct ReviewKind {
    gate: Gate,
    heading: &'static str,
    approved_default: &'static [&'static str],
    review_command: &'static str,
    uppercase_status: bool,
}

const PRD: ReviewKind = ReviewKind {
    gate: Gate::PrdReview,
    heading: PRD_REVIEW_HEADING,
    approved_default: PRD_APPROVED_DEFAULT,
    review_command: "/review-prd",
    uppercase_status: false,
};

const PLAN: ReviewKind = ReviewKind {
    gate: Gate::PlanReview,
    heading: PLAN_REVIEW_HEADING,
    approved_default: PLAN_APPROVED_DEFAULT,
    review_command: "/review-spec",
    uppercase_status: true,
};

fn edits_artifact(file_path: Option<&str>, suffix: &str) -> bool {
    file_path.is_some_and(|p| paths::normalize_rel(p).ends_with(suffix))
}

/// Section checks shared by both gates. `None` means the section passed.
fn check_section(
    kind: &ReviewKind,
    settings: &ReviewGateSettings,
    ctx: &GateContext<'_>,
    text: &str,
    rel: &str,
) -> Option<GateDecision> {
    let command = format!("{} {}", kind.review_command, ctx.ticket);
    let args = ctx
        .args()
        .subject(kind.heading)
        .path(rel)
        .command(command.as_str());

    let sections = markdown::sections(text);
    let Some(body) = sections.get(kind.heading) else {
        if settings.allow_missing_section {
            return Some(GateDecision::pass(kind.gate));
        }
        return Some(GateDecision::block(kind.gate, ReasonCode::MissingSection, &args));
    };

    let block = markdown::status_and_actions(body);
    let status = block
        .status
        .clone()
        .unwrap_or_else(|| reports::DEFAULT_REVIEW_STATUS.to_string());
    let shown = if kind.uppercase_status {
        status.to_uppercase()
    } else {
        status.clone()
    };

    if settings.blocking().contains(&status) {
        return Some(GateDecision::block(
            kind.gate,
            ReasonCode::BlockingStatus,
            &args.status(shown),
        ));
    }
    if !settings.approved(kind.approved_default).contains(&status) {
        return Some(GateDecision::block(
            kind.gate,
            ReasonCode::NotApproved,
            &args.status(shown),
        ));
    }
    if settings.require_action_items_closed && block.has_open_items() {
        let open = block.open_items().map(|i| i.text.clone()).collect();
        return Some(
            GateDecision::block(kind.gate, ReasonCode::OpenActions, &args).with_details(open),
        );
    }
    None
}

fn dialog_is_draft(text: &str) -> bool {
    markdown::sections(text)
        .get_prefix_ignore_case(ANALYST_DIALOG_HEADING)
        .map(markdown::status_and_actions)
        .and_then(|b| b.status)
        .is_some_and(|s| s == "draft")
}

pub fn prd_review(ctx: &GateContext<'_>, settings: &ReviewGateSettings, pack: PackFormat) -> GateDecision {
    if let Some(skip) = preamble(Gate::PrdReview, &settings.filter, ctx) {
        return skip;
    }
    let prd_path = paths::prd_path(ctx.root, ctx.ticket);
    let rel = ctx.rel(&prd_path);
    if settings.skip_on_edit && edits_artifact(ctx.file_path, &format!("docs/prd/{}.prd.md", ctx.ticket)) {
        return GateDecision::skip(Gate::PrdReview, ReasonCode::SelfEdit, &ctx.args().path(rel));
    }

    let Ok(text) = std::fs::read_to_string(&prd_path) else {
        return GateDecision::block(Gate::PrdReview, ReasonCode::MissingPrd, &ctx.args().path(rel));
    };

    if settings.check_dialog_draft && dialog_is_draft(&text) {
        return GateDecision::block(
            Gate::PrdReview,
            ReasonCode::DraftDialog,
            &ctx.args().command(format!("/idea-new {}", ctx.ticket)),
        );
    }

    if let Some(decision) = check_section(&PRD, settings, ctx, &text, &rel) {
        return decision;
    }

    match &settings.report_path {
        Some(template) => check_report(ctx, settings, template, pack),
        None => GateDecision::pass(Gate::PrdReview),
    }
}

fn check_report(
    ctx: &GateContext<'_>,
    settings: &ReviewGateSettings,
    template: &str,
    pack: PackFormat,
) -> GateDecision {
    let report_path: PathBuf = reports::resolve_template(
        ctx.root,
        template,
        ctx.ticket,
        ctx.slug,
        ctx.branch.unwrap_or_default(),
    );
    let args = ctx
        .args()
        .subject(PRD_REVIEW_HEADING)
        .path(ctx.rel(&report_path))
        .command(format!("aidd prd-review --ticket {}", ctx.ticket));

    match reports::load_report(&report_path, pack) {
        ReportLoad::Missing if settings.allow_missing_report => GateDecision::pass(Gate::PrdReview),
        ReportLoad::Missing => GateDecision::block(Gate::PrdReview, ReasonCode::MissingReport, &args),
        ReportLoad::Corrupted { path, error } => GateDecision::block(
            Gate::PrdReview,
            ReasonCode::ReportCorrupted,
            &args.path(ctx.rel(&path)).detail(error),
        ),
        ReportLoad::Loaded { path, value } => {
            let hits = reports::blocking_findings(&value, &settings.severities());
            if hits.is_empty() {
                GateDecision::pass(Gate::PrdReview)
            } else {
                let detail = hits.len().to_string();
                GateDecision::block(
                    Gate::PrdReview,
                    ReasonCode::BlockingFinding,
                    &args.path(ctx.rel(&path)).detail(detail),
                )
                .with_details(hits)
            }
        }
    }
}

pub fn plan_review(ctx: &GateContext<'_>, settings: &ReviewGateSettings) -> GateDecision {
    if let Some(skip) = preamble(Gate::PlanReview, &settings.filter, ctx) {
        return skip;
    }
    let plan_path = paths::plan_path(ctx.root, ctx.ticket);
    let rel = ctx.rel(&plan_path);
    if settings.skip_on_edit && edits_artifact(ctx.file_path, &format!("docs/plan/{}.md", ctx.ticket)) {
        return GateDecision::skip(Gate::PlanReview, ReasonCode::SelfEdit, &ctx.args().path(rel));
    }
    let Ok(text) = std::fs::read_to_string(&plan_path) else {
        return GateDecision::block(
            Gate::PlanReview,
            ReasonCode::ArtifactMissing,
            &ctx.args()
                .subject("плана")
                .path(rel)
                .command(format!("/plan-new {}", ctx.ticket)),
        );
    };
    check_section(&PLAN, settings, ctx, &text, &rel).unwrap_or_else(|| GateDecision::pass(Gate::PlanReview))
}
