pub mod events;
pub mod feature;
pub mod gate;
pub mod hook;
pub mod prd_review;
pub mod working_set;

use aidd_core::identifiers;
use anyhow::Context;
use std::path::Path;

/// `--ticket` or the active ticket, with its slug hint.
pub fn resolve_ticket(root: &Path, ticket: Option<&str>) -> anyhow::Result<(String, String)> {
    let ids = identifiers::resolve_identifiers(root, ticket, None);
    let ticket = ids
        .require_ticket()
        .context("no ticket to check")?
        .to_string();
    let slug = ids.resolved_slug().unwrap_or(ticket.as_str()).to_string();
    Ok((ticket, slug))
}
