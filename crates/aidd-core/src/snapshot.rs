//! PreCompact snapshot: the working set, a metadata record and the tail of
//! the transcript, saved under `reports/context/` before the host compacts
//! the conversation.

use crate::error::Result;
use crate::io::atomic_write;
use crate::paths;
use crate::working_set::WorkingSet;
use serde::Serialize;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Bytes of transcript kept in `transcript_tail.jsonl`.
pub const TAIL_MAX_BYTES: u64 = 200_000;

pub const WORKING_SET_FILE: &str = "working_set.md";
pub const META_FILE: &str = "precompact_meta.json";
pub const TAIL_FILE: &str = "transcript_tail.jsonl";
pub const LATEST_FILE: &str = "latest_working_set.md";

/// Payload fields the snapshot records.
#[derive(Debug, Clone, Default)]
pub struct SnapshotRequest<'a> {
    pub session_id: Option<&'a str>,
    pub transcript_path: Option<&'a str>,
    pub trigger: Option<&'a str>,
    pub custom_instructions: Option<&'a str>,
    pub generated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotMeta {
    pub generated_at: String,
    pub hook: &'static str,
    pub trigger: Option<String>,
    pub custom_instructions: Option<String>,
    pub ticket: Option<String>,
    pub slug: Option<String>,
    pub transcript_path: Option<String>,
    pub transcript_bytes: Option<u64>,
}

/// Single path component: anything outside `[A-Za-z0-9._-]` becomes `_`,
/// blanks and dot-only names become `unknown`.
pub fn component(value: Option<&str>) -> String {
    let cleaned: String = value
        .unwrap_or_default()
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "._-".contains(c) { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Last `max_bytes` of a file, decoded lossily. Empty when unreadable.
pub fn tail_bytes(path: &Path, max_bytes: u64) -> String {
    let read = || -> std::io::Result<Vec<u8>> {
        let mut f = std::fs::File::open(path)?;
        let size = f.metadata()?.len();
        if size > max_bytes {
            f.seek(SeekFrom::Start(size - max_bytes))?;
        }
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        Ok(buf)
    };
    read()
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

fn write_session(dir: &Path, ws: &str, meta: &SnapshotMeta, tail: &str) -> Result<()> {
    atomic_write(&dir.join(WORKING_SET_FILE), format!("{ws}\n").as_bytes())?;
    atomic_write(&dir.join(META_FILE), serde_json::to_string_pretty(meta)?.as_bytes())?;
    if !tail.trim().is_empty() {
        atomic_write(&dir.join(TAIL_FILE), tail.as_bytes())?;
    }
    Ok(())
}

/// Write the snapshot for one session, plus a per-ticket copy when a ticket
/// is active. Returns the session directories written.
pub fn write(root: &Path, ws: &WorkingSet, req: &SnapshotRequest<'_>) -> Result<Vec<PathBuf>> {
    let transcript = req.transcript_path.filter(|p| !p.is_empty()).map(Path::new);
    let meta = SnapshotMeta {
        generated_at: req.generated_at.clone(),
        hook: "PreCompact",
        trigger: req.trigger.map(str::to_string),
        custom_instructions: req.custom_instructions.map(str::to_string),
        ticket: ws.ticket.clone(),
        slug: ws.slug.clone(),
        transcript_path: req.transcript_path.map(str::to_string),
        transcript_bytes: transcript.and_then(|p| std::fs::metadata(p).ok()).map(|m| m.len()),
    };
    let tail = transcript
        .map(|p| tail_bytes(p, TAIL_MAX_BYTES))
        .unwrap_or_default();
    let session = component(req.session_id);
    let latest = format!("{}\n", ws.text);

    let base = root.join(paths::CONTEXT_REPORTS_DIR);
    let mut written = vec![base.join(&session)];
    write_session(&written[0], &ws.text, &meta, &tail)?;
    atomic_write(&base.join(LATEST_FILE), latest.as_bytes())?;

    if let Some(ticket) = ws.ticket.as_deref() {
        let ticket_root = base.join("by-ticket").join(component(Some(ticket)));
        let dir = ticket_root.join(&session);
        write_session(&dir, &ws.text, &meta, &tail)?;
        atomic_write(&ticket_root.join(LATEST_FILE), latest.as_bytes())?;
        written.push(dir);
    }
    tracing::debug!(dirs = written.len(), "precompact snapshot written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ws(ticket: Option<&str>) -> WorkingSet {
        WorkingSet {
            text: "### AIDD Working Set (auto-generated)\n- Ticket: T-1".to_string(),
            ticket: ticket.map(str::to_string),
            slug: None,
        }
    }

    #[test]
    fn session_and_ticket_copies() {
        let dir = TempDir::new().unwrap();
        let transcript = dir.path().join("t.jsonl");
        std::fs::write(&transcript, "{\"a\":1}\n{\"b\":2}\n").unwrap();
        let transcript = transcript.to_string_lossy().into_owned();
        let req = SnapshotRequest {
            session_id: Some("s-1"),
            transcript_path: Some(&transcript),
            trigger: Some("auto"),
            generated_at: "2024-01-01T00:00:00+00:00".to_string(),
            ..Default::default()
        };
        let dirs = write(dir.path(), &ws(Some("T-1")), &req).unwrap();
        let base = dir.path().join("reports/context");
        assert_eq!(dirs, vec![base.join("s-1"), base.join("by-ticket/T-1/s-1")]);

        for d in &dirs {
            let text = std::fs::read_to_string(d.join(WORKING_SET_FILE)).unwrap();
            assert!(text.ends_with("- Ticket: T-1\n"));
            let tail = std::fs::read_to_string(d.join(TAIL_FILE)).unwrap();
            assert_eq!(tail, "{\"a\":1}\n{\"b\":2}\n");
        }
        let meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(base.join("s-1").join(META_FILE)).unwrap()).unwrap();
        assert_eq!(meta["hook"], "PreCompact");
        assert_eq!(meta["trigger"], "auto");
        assert_eq!(meta["ticket"], "T-1");
        assert_eq!(meta["transcript_bytes"], 16);
        assert!(base.join(LATEST_FILE).is_file());
        assert!(base.join("by-ticket/T-1").join(LATEST_FILE).is_file());
    }

    #[test]
    fn no_ticket_and_no_transcript() {
        let dir = TempDir::new().unwrap();
        let dirs = write(dir.path(), &ws(None), &SnapshotRequest::default()).unwrap();
        assert_eq!(dirs, vec![dir.path().join("reports/context/unknown")]);
        assert!(!dirs[0].join(TAIL_FILE).exists());
        assert!(!dir.path().join("reports/context/by-ticket").exists());
    }

    #[test]
    fn tail_keeps_last_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t");
        std::fs::write(&path, "0123456789").unwrap();
        assert_eq!(tail_bytes(&path, 4), "6789");
        assert_eq!(tail_bytes(&path, 100), "0123456789");
        assert_eq!(tail_bytes(&dir.path().join("missing"), 4), "");
    }

    #[test]
    fn components_are_sanitized() {
        assert_eq!(component(Some("abc-1.2_x")), "abc-1.2_x");
        assert_eq!(component(Some("../etc")), ".._etc");
        assert_eq!(component(Some("..")), "unknown");
        assert_eq!(component(Some("  ")), "unknown");
        assert_eq!(component(None), "unknown");
    }
}
