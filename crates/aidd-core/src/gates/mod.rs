//! Gate decision procedures. Each gate reads artifacts, never writes them
//! (QA's debounce stamp is the one file a gate owns), and answers with a
//! [`GateDecision`].

pub mod analyst;
pub mod deps;
pub mod progress;
pub mod qa;
pub mod review;
pub mod tasklist;

use crate::config::BranchFilter;
use crate::events::{self, NewEvent};
use crate::gate::{Gate, GateDecision, ReasonCode};
use crate::messages::MessageArgs;
use std::path::Path;

/// Inputs shared by every gate invocation.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub root: &'a Path,
    pub ticket: &'a str,
    pub slug: &'a str,
    pub branch: Option<&'a str>,
    /// File the agent is editing, when the gate runs from a tool hook.
    pub file_path: Option<&'a str>,
}

impl<'a> GateContext<'a> {
    pub fn new(root: &'a Path, ticket: &'a str) -> Self {
        GateContext {
            root,
            ticket,
            slug: ticket,
            branch: None,
            file_path: None,
        }
    }

    pub fn args(&self) -> MessageArgs {
        MessageArgs::new(self.ticket)
    }

    pub fn rel(&self, path: &Path) -> String {
        crate::paths::display_rel(self.root, path)
    }
}

/// Enabled flag and branch filters. `Some` short-circuits the gate with a skip.
pub fn preamble(gate: Gate, filter: &BranchFilter, ctx: &GateContext<'_>) -> Option<GateDecision> {
    if !filter.enabled {
        return Some(GateDecision::skip(gate, ReasonCode::GateDisabled, &ctx.args()));
    }
    if !filter.allows(ctx.branch) {
        let branch = ctx.branch.unwrap_or_default();
        return Some(GateDecision::skip(
            gate,
            ReasonCode::BranchFiltered,
            &ctx.args().detail(branch),
        ));
    }
    None
}

/// Record a pass/block outcome under the gate's own event type. Skips are
/// not logged.
pub fn record(ctx: &GateContext<'_>, decision: &GateDecision, source: &str) {
    record_as(ctx, decision, &decision.gate.event_type(), source);
}

/// Like [`record`] with an explicit event type, e.g. `gate-workflow`.
pub fn record_as(ctx: &GateContext<'_>, decision: &GateDecision, kind: &str, source: &str) {
    if decision.is_skip() {
        return;
    }
    let details = decision
        .reason_code
        .map(|c| serde_json::json!({ "reason_code": c.as_str(), "message": decision.message }));
    let result = events::append(
        ctx.root,
        NewEvent {
            ticket: ctx.ticket,
            slug_hint: Some(ctx.slug),
            kind,
            status: Some(decision.status.as_str()),
            details,
            source: Some(source),
            ..Default::default()
        },
    );
    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to append gate event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateStatus;
    use tempfile::TempDir;

    #[test]
    fn disabled_gate_skips() {
        let dir = TempDir::new().unwrap();
        let ctx = GateContext::new(dir.path(), "T");
        let filter = BranchFilter {
            enabled: false,
            ..Default::default()
        };
        let d = preamble(Gate::PrdReview, &filter, &ctx).unwrap();
        assert_eq!(d.status, GateStatus::Skip);
        assert_eq!(d.reason_code, Some(ReasonCode::GateDisabled));
    }

    #[test]
    fn record_writes_pass_and_block_only() {
        let dir = TempDir::new().unwrap();
        let ctx = GateContext::new(dir.path(), "T");
        record(&ctx, &GateDecision::pass(Gate::Qa), "test");
        record(
            &ctx,
            &GateDecision::skip(Gate::Qa, ReasonCode::Debounced, &ctx.args()),
            "test",
        );
        let events = events::tail(dir.path(), "T", 10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "gate-qa");
        assert_eq!(events[0].status.as_deref(), Some("pass"));
    }
}
