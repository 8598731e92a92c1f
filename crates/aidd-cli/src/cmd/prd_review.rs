use crate::output::print_json;
use aidd_core::{paths, reports};
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, ticket: Option<&str>, stdout: bool, json: bool) -> anyhow::Result<()> {
    let (ticket, slug) = super::resolve_ticket(root, ticket)?;
    let prd_path = paths::prd_path(root, &ticket);
    let content = std::fs::read_to_string(&prd_path)
        .with_context(|| format!("cannot read {}", paths::display_rel(root, &prd_path)))?;

    let report = reports::analyse_prd(&ticket, &slug, &content);
    if stdout {
        return print_json(&report);
    }

    let out = paths::prd_report_path(root, &ticket);
    reports::write_prd_report(&out, &report).context("failed to write PRD review report")?;
    if json {
        print_json(&report)?;
    } else {
        println!(
            "PRD review report saved to {} (recommended status: {})",
            paths::display_rel(root, &out),
            report.recommended_status
        );
    }
    Ok(())
}
