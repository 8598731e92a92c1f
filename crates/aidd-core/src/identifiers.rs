//! Identifier store: the active ticket, its slug hint, and the active stage.

use crate::error::{AiddError, Result};
use crate::io::{atomic_write, read_trimmed};
use crate::paths;
use serde::Serialize;
use std::path::Path;

pub const VALID_STAGES: &[&str] = &[
    "idea",
    "research",
    "plan",
    "review-plan",
    "review-prd",
    "spec-interview",
    "tasklist",
    "implement",
    "review",
    "qa",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureIdentifiers {
    pub ticket: Option<String>,
    pub slug_hint: Option<String>,
}

impl FeatureIdentifiers {
    /// The ticket, falling back to the slug hint for workflows that only
    /// ever wrote `.active_feature`.
    pub fn resolved_ticket(&self) -> Option<&str> {
        self.ticket.as_deref().or(self.slug_hint.as_deref())
    }

    /// The slug hint, falling back to the ticket.
    pub fn resolved_slug(&self) -> Option<&str> {
        self.slug_hint.as_deref().or(self.ticket.as_deref())
    }

    /// Resolved ticket or [`AiddError::TicketMissing`].
    pub fn require_ticket(&self) -> Result<&str> {
        self.resolved_ticket().ok_or(AiddError::TicketMissing)
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn read_identifiers(root: &Path) -> FeatureIdentifiers {
    let ticket = read_trimmed(&root.join(paths::ACTIVE_TICKET_FILE));
    let slug_hint = read_trimmed(&root.join(paths::ACTIVE_FEATURE_FILE));
    let ticket = ticket.or_else(|| slug_hint.clone());
    FeatureIdentifiers { ticket, slug_hint }
}

/// Stored identifiers with explicit values layered on top.
pub fn resolve_identifiers(
    root: &Path,
    ticket: Option<&str>,
    slug_hint: Option<&str>,
) -> FeatureIdentifiers {
    let stored = read_identifiers(root);
    let explicit_ticket = clean(ticket);
    let explicit_hint = clean(slug_hint);
    let ticket_changed = explicit_ticket.is_some() && explicit_ticket != stored.ticket;
    FeatureIdentifiers {
        ticket: explicit_ticket.or(stored.ticket),
        // A slug hint stored for a different ticket does not carry over.
        slug_hint: if ticket_changed {
            explicit_hint
        } else {
            explicit_hint.or(stored.slug_hint)
        },
    }
}

/// Persist the active ticket and slug hint (defaulting to the ticket).
pub fn write_identifiers(root: &Path, ticket: &str, slug_hint: Option<&str>) -> Result<FeatureIdentifiers> {
    let ticket = clean(Some(ticket)).ok_or(AiddError::TicketMissing)?;
    let hint = clean(slug_hint).unwrap_or_else(|| ticket.clone());
    atomic_write(&root.join(paths::ACTIVE_TICKET_FILE), format!("{ticket}\n").as_bytes())?;
    atomic_write(&root.join(paths::ACTIVE_FEATURE_FILE), format!("{hint}\n").as_bytes())?;
    tracing::debug!(ticket = %ticket, slug_hint = %hint, "identifiers written");
    Ok(FeatureIdentifiers {
        ticket: Some(ticket),
        slug_hint: Some(hint),
    })
}

pub fn read_active_stage(root: &Path) -> Option<String> {
    read_trimmed(&root.join(paths::ACTIVE_STAGE_FILE)).map(|s| s.to_lowercase())
}

pub fn write_active_stage(root: &Path, stage: &str, allow_custom: bool) -> Result<String> {
    let value = stage.trim().to_lowercase();
    if value.is_empty() || (!allow_custom && !VALID_STAGES.contains(&value.as_str())) {
        return Err(AiddError::InvalidStage(stage.to_string()));
    }
    atomic_write(&root.join(paths::ACTIVE_STAGE_FILE), format!("{value}\n").as_bytes())?;
    Ok(value)
}

/// Position of `stage` in [`VALID_STAGES`]; custom stages have no rank.
pub fn stage_rank(stage: &str) -> Option<usize> {
    VALID_STAGES.iter().position(|s| *s == stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_defaults_hint_to_ticket() {
        let dir = TempDir::new().unwrap();
        write_identifiers(dir.path(), "ABC-123", None).unwrap();
        let ids = read_identifiers(dir.path());
        assert_eq!(ids.ticket.as_deref(), Some("ABC-123"));
        assert_eq!(ids.slug_hint.as_deref(), Some("ABC-123"));
    }

    #[test]
    fn write_then_read_with_hint() {
        let dir = TempDir::new().unwrap();
        write_identifiers(dir.path(), "ABC-123", Some("checkout-flow")).unwrap();
        let ids = read_identifiers(dir.path());
        assert_eq!(
            ids,
            FeatureIdentifiers {
                ticket: Some("ABC-123".into()),
                slug_hint: Some("checkout-flow".into()),
            }
        );
    }

    #[test]
    fn empty_ticket_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            write_identifiers(dir.path(), "  ", None),
            Err(AiddError::TicketMissing)
        ));
    }

    #[test]
    fn legacy_slug_only_becomes_ticket() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join(paths::ACTIVE_FEATURE_FILE), "legacy-slug\n").unwrap();
        let ids = read_identifiers(dir.path());
        assert_eq!(ids.resolved_ticket(), Some("legacy-slug"));
    }

    #[test]
    fn explicit_ticket_overrides_store() {
        let dir = TempDir::new().unwrap();
        write_identifiers(dir.path(), "OLD-1", Some("old")).unwrap();
        let ids = resolve_identifiers(dir.path(), Some("NEW-2"), None);
        assert_eq!(ids.ticket.as_deref(), Some("NEW-2"));
        assert_eq!(ids.resolved_slug(), Some("NEW-2"));

        let same = resolve_identifiers(dir.path(), Some("OLD-1"), None);
        assert_eq!(same.slug_hint.as_deref(), Some("old"));
    }

    #[test]
    fn stage_validation() {
        let dir = TempDir::new().unwrap();
        assert_eq!(write_active_stage(dir.path(), "QA", false).unwrap(), "qa");
        assert_eq!(read_active_stage(dir.path()).as_deref(), Some("qa"));
        assert!(write_active_stage(dir.path(), "deploy", false).is_err());
        assert_eq!(write_active_stage(dir.path(), "deploy", true).unwrap(), "deploy");
        assert_eq!(stage_rank("implement"), Some(7));
        assert_eq!(stage_rank("deploy"), None);
    }
}
