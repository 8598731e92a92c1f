use crate::output::print_json;
use aidd_core::{context_config::ContextConfig, identifiers, working_set};
use std::path::Path;

pub fn run(root: &Path, ticket: Option<&str>, json: bool) -> anyhow::Result<()> {
    let cfg = ContextConfig::load(root);
    let ids = identifiers::resolve_identifiers(root, ticket, None);
    let project_dir = std::env::current_dir()?;
    let set = working_set::build_for(root, &project_dir, &cfg, ids);

    if json {
        return print_json(&set);
    }
    if set.text.is_empty() {
        eprintln!("working set is disabled (context_gc mode is off)");
        return Ok(());
    }
    println!("{}", set.text);
    Ok(())
}
