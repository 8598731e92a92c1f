//! Artifact parser: sections, status lines, action items, front-matter and
//! `AIDD:` anchor blocks. Nothing here fails; malformed input yields whatever
//! could be extracted.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub body: String,
}

/// Ordered `## ` sections of a document. Lookups return the first match.
#[derive(Debug, Clone, Default)]
pub struct Sections {
    items: Vec<Section>,
}

impl Sections {
    /// Exact, case-sensitive title match.
    pub fn get(&self, title: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|s| s.title == title)
            .map(|s| s.body.as_str())
    }

    /// Case-insensitive prefix match, for localized headings that carry suffixes.
    pub fn get_prefix_ignore_case(&self, prefix: &str) -> Option<&str> {
        let needle = prefix.to_lowercase();
        self.items
            .iter()
            .find(|s| s.title.to_lowercase().starts_with(&needle))
            .map(|s| s.body.as_str())
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|s| s.title.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn heading_title(line: &str) -> Option<&str> {
    line.trim().strip_prefix("## ").map(str::trim)
}

fn tidy_body(lines: &[&str]) -> String {
    let trimmed: Vec<&str> = lines.iter().map(|l| l.trim_end()).collect();
    let start = trimmed.iter().position(|l| !l.is_empty());
    let end = trimmed.iter().rposition(|l| !l.is_empty());
    match (start, end) {
        (Some(s), Some(e)) => trimmed[s..=e].join("\n"),
        _ => String::new(),
    }
}

/// Split `text` into `## ` sections in a single pass.
pub fn sections(text: &str) -> Sections {
    let mut items = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for line in text.lines() {
        if let Some(title) = heading_title(line) {
            if let Some((t, body)) = current.take() {
                items.push(Section {
                    title: t,
                    body: tidy_body(&body),
                });
            }
            current = Some((title.to_string(), Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((t, body)) = current {
        items.push(Section {
            title: t,
            body: tidy_body(&body),
        });
    }
    Sections { items }
}

// ---------------------------------------------------------------------------
// Status and action items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Open,
    Closed,
    /// `- [~]`, `- [-]` and similar markers.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionItem {
    pub state: CheckState,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewBlock {
    /// Lowercased status value; `None` when absent or blank.
    pub status: Option<String>,
    pub action_items: Vec<ActionItem>,
}

impl ReviewBlock {
    pub fn open_items(&self) -> impl Iterator<Item = &ActionItem> {
        self.action_items
            .iter()
            .filter(|i| i.state == CheckState::Open)
    }

    pub fn has_open_items(&self) -> bool {
        self.open_items().next().is_some()
    }
}

/// Classify a `- [ ]` / `- [x]` line. `None` when the line is not a checkbox.
pub fn checkbox(line: &str) -> Option<ActionItem> {
    let rest = line.trim().strip_prefix("- [")?;
    let mut chars = rest.chars();
    let mark = chars.next()?;
    let tail = chars.as_str().strip_prefix(']')?;
    let state = match mark {
        ' ' => CheckState::Open,
        'x' | 'X' => CheckState::Closed,
        _ => CheckState::Other,
    };
    Some(ActionItem {
        state,
        text: tail.trim().to_string(),
    })
}

pub fn status_and_actions(body: &str) -> ReviewBlock {
    let mut block = ReviewBlock::default();
    let mut seen_status = false;
    for line in body.lines() {
        let trimmed = line.trim();
        if !seen_status && trimmed.to_lowercase().starts_with("status:") {
            seen_status = true;
            let value = trimmed
                .split_once(':')
                .map(|(_, v)| v.trim().to_lowercase())
                .unwrap_or_default();
            if !value.is_empty() {
                block.status = Some(value);
            }
            continue;
        }
        if trimmed.starts_with("- [") {
            if let Some(item) = checkbox(trimmed) {
                block.action_items.push(item);
            }
        }
    }
    block
}

// ---------------------------------------------------------------------------
// Front-matter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontValue {
    Scalar(String),
    List(Vec<String>),
}

fn unquote(value: &str) -> String {
    let v = value.trim();
    for q in ['"', '\''] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return v[1..v.len() - 1].to_string();
        }
    }
    v.to_string()
}

/// Flat `key: value` entries and `key:` followed by `  - item` lists.
/// Any other shape yields an empty mapping.
pub fn front_matter(text: &str) -> BTreeMap<String, FrontValue> {
    let mut lines = text.lines().skip_while(|l| l.trim().is_empty());
    if lines.next().map(str::trim) != Some("---") {
        return BTreeMap::new();
    }
    let mut block = Vec::new();
    let mut closed = false;
    for line in lines {
        if line.trim() == "---" {
            closed = true;
            break;
        }
        block.push(line);
    }
    if !closed {
        return BTreeMap::new();
    }

    let mut map = BTreeMap::new();
    let mut list_key: Option<String> = None;
    for line in block {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        if let Some(item) = line.trim_start().strip_prefix("- ") {
            let Some(key) = &list_key else {
                return BTreeMap::new();
            };
            if let Some(FrontValue::List(items)) = map.get_mut(key) {
                items.push(unquote(item));
            }
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return BTreeMap::new();
        };
        if line.starts_with(char::is_whitespace) {
            return BTreeMap::new();
        }
        let key = key.trim().to_string();
        if value.trim().is_empty() {
            map.insert(key.clone(), FrontValue::List(Vec::new()));
            list_key = Some(key);
        } else {
            map.insert(key, FrontValue::Scalar(unquote(value)));
            list_key = None;
        }
    }
    map
}

// ---------------------------------------------------------------------------
// AIDD anchors
// ---------------------------------------------------------------------------

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^##\s+AIDD:([A-Z0-9_]+)\b").expect("valid regex"))
}

fn next_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^##\s").expect("valid regex"))
}

/// `## AIDD:<NAME>` blocks keyed by uppercased name. First occurrence wins.
pub fn anchors(text: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let lines: Vec<&str> = text.lines().collect();
    let mut idx = 0;
    while idx < lines.len() {
        let Some(caps) = anchor_re().captures(lines[idx].trim_start()) else {
            idx += 1;
            continue;
        };
        let name = caps[1].to_uppercase();
        let start = idx + 1;
        let mut end = start;
        while end < lines.len() && !next_heading_re().is_match(lines[end].trim_start()) {
            end += 1;
        }
        map.entry(name).or_insert_with(|| tidy_body(&lines[start..end]));
        idx = end;
    }
    map
}

/// Body of one anchor, e.g. `anchor(text, "NEXT_3")`.
pub fn anchor(text: &str, name: &str) -> Option<String> {
    anchors(text).remove(&name.to_uppercase())
}

// ---------------------------------------------------------------------------
// Checkbox items and fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckboxItem {
    pub header: String,
    pub state: CheckState,
    /// Continuation lines up to the next sibling checkbox.
    pub lines: Vec<String>,
}

fn checkbox_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\s*)-\s+\[[ xX]\]\s+").expect("valid regex"))
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Top-level checkbox items of a section body. Top level is the shallowest
/// indentation any checkbox in the body uses.
pub fn checkbox_items(body: &str) -> Vec<CheckboxItem> {
    let lines: Vec<&str> = body.lines().collect();
    let Some(top) = lines
        .iter()
        .filter_map(|l| checkbox_line_re().captures(l).map(|c| c[1].len()))
        .min()
    else {
        return Vec::new();
    };

    let mut items: Vec<CheckboxItem> = Vec::new();
    for line in lines {
        let is_top = checkbox_line_re()
            .captures(line)
            .is_some_and(|c| c[1].len() == top);
        if is_top {
            let item = checkbox(line);
            items.push(CheckboxItem {
                header: line.trim().to_string(),
                state: item.map(|i| i.state).unwrap_or(CheckState::Other),
                lines: Vec::new(),
            });
        } else if let Some(current) = items.last_mut() {
            current.lines.push(line.to_string());
        }
    }
    items
}

/// Value of a `- Field: value` line (bullet optional, key case-insensitive).
pub fn field_value(lines: &[String], field: &str) -> Option<String> {
    let pattern = format!(r"(?i)^\s*(?:[-*]\s*)?{}\s*:\s*(.*)$", regex::escape(field));
    let re = Regex::new(&pattern).ok()?;
    lines
        .iter()
        .find_map(|l| re.captures(l).map(|c| c[1].trim().to_string()))
}

/// Empty, `...`, `tbd`/`todo`, or anything wrapped in `<...>`.
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim().trim_matches('`').trim();
    if v.is_empty() {
        return true;
    }
    if v.starts_with('<') && v.ends_with('>') {
        return true;
    }
    matches!(v.to_lowercase().as_str(), "..." | "…" | "tbd" | "todo")
}

/// Items of a `- field:` block (indented `- item` lines), or the inline form
/// `field: a; b` / `field: ["a", "b"]`. Placeholder entries are dropped.
pub fn list_field(lines: &[String], field: &str) -> Vec<String> {
    let block_pattern = format!(r"(?i)^(\s*)-\s*{}\s*:\s*$", regex::escape(field));
    let Ok(block_re) = Regex::new(&block_pattern) else {
        return Vec::new();
    };
    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = block_re.captures(line) else {
            continue;
        };
        let base = caps[1].len();
        let mut items = Vec::new();
        for raw in &lines[idx + 1..] {
            if raw.trim().is_empty() {
                continue;
            }
            let indent = indent_of(raw);
            if indent <= base {
                break;
            }
            if let Some(item) = raw.trim_start().strip_prefix('-') {
                let item = item.trim();
                if !is_angle_placeholder(item) {
                    items.push(item.to_string());
                }
            }
        }
        return items;
    }

    match field_value(lines, field) {
        Some(inline) if !inline.is_empty() => parse_inline_list(&inline),
        _ => Vec::new(),
    }
}

fn is_angle_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || (v.starts_with('<') && v.ends_with('>'))
}

fn parse_inline_list(text: &str) -> Vec<String> {
    let text = text.trim();
    let parts: Vec<String> = if text.starts_with('[') && text.ends_with(']') {
        match serde_json::from_str::<Vec<serde_json::Value>>(text) {
            Ok(values) => values
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
            Err(_) => text[1..text.len() - 1]
                .split(',')
                .map(|p| p.trim().trim_matches(|c: char| c == '"' || c == '\'').to_string())
                .collect(),
        }
    } else {
        text.split(';').map(|p| p.trim().to_string()).collect()
    };
    parts
        .into_iter()
        .filter(|p| !is_angle_placeholder(p))
        .collect()
}
