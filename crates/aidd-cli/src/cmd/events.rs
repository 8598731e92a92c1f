use crate::output::print_json_line;
use aidd_core::events;
use std::path::Path;

pub fn run(root: &Path, ticket: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let (ticket, _) = super::resolve_ticket(root, ticket)?;
    for event in events::tail(root, &ticket, limit) {
        print_json_line(&event)?;
    }
    Ok(())
}
