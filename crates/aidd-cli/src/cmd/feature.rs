use crate::output::print_json;
use aidd_core::identifiers;
use anyhow::Context;
use std::path::Path;

pub fn activate(root: &Path, ticket: &str, slug_hint: Option<&str>, json: bool) -> anyhow::Result<()> {
    let ids = identifiers::write_identifiers(root, ticket, slug_hint)
        .with_context(|| format!("failed to activate '{ticket}'"))?;

    if json {
        print_json(&ids)?;
    } else {
        let ticket = ids.ticket.as_deref().unwrap_or_default();
        let hint = ids.slug_hint.as_deref().unwrap_or_default();
        println!("Active ticket: {ticket} (slug hint: {hint})");
    }
    Ok(())
}

pub fn set_stage(root: &Path, stage: &str, allow_custom: bool, json: bool) -> anyhow::Result<()> {
    let stage = identifiers::write_active_stage(root, stage, allow_custom)?;

    if json {
        print_json(&serde_json::json!({ "stage": stage }))?;
    } else {
        println!("Active stage: {stage}");
    }
    Ok(())
}
