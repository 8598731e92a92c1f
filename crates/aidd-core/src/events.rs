//! Append-only per-ticket JSONL log of gate outcomes.

use crate::error::Result;
use crate::io::append_text;
use crate::paths;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub ts: String,
    pub ticket: String,
    pub slug_hint: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// What a caller supplies; the timestamp is stamped at write time.
#[derive(Debug, Clone, Default)]
pub struct NewEvent<'a> {
    pub ticket: &'a str,
    pub slug_hint: Option<&'a str>,
    pub kind: &'a str,
    pub status: Option<&'a str>,
    pub details: Option<Value>,
    pub report: Option<&'a str>,
    pub source: Option<&'a str>,
}

pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Append one event. Returns `None` without writing when the ticket is empty.
pub fn append(root: &Path, event: NewEvent<'_>) -> Result<Option<Event>> {
    let ticket = event.ticket.trim();
    if ticket.is_empty() {
        return Ok(None);
    }
    let record = Event {
        ts: now_ts(),
        ticket: ticket.to_string(),
        slug_hint: event
            .slug_hint
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(ticket)
            .to_string(),
        kind: event.kind.to_string(),
        status: event.status.map(str::to_string),
        details: event.details,
        report: event.report.map(str::to_string),
        source: event.source.map(str::to_string),
    };
    let mut line = serde_json::to_string(&record)?;
    line.push('\n');
    append_text(&paths::events_path(root, ticket), &line)?;
    Ok(Some(record))
}

/// Last `limit` well-formed events in file order. Malformed lines are skipped.
pub fn tail(root: &Path, ticket: &str, limit: usize) -> Vec<Event> {
    let Ok(text) = std::fs::read_to_string(paths::events_path(root, ticket)) else {
        return Vec::new();
    };
    let mut picked: Vec<Event> = text
        .lines()
        .rev()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<Event>(l).ok())
        .take(limit)
        .collect();
    picked.reverse();
    picked
}
