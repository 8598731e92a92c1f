//! Report files: the pack-first loader and the PRD review report generator.

use crate::error::Result;
use crate::events::now_ts;
use crate::io::atomic_write;
use crate::markdown::{self, CheckState};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Pack-first loader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PackFormat {
    #[default]
    Yaml,
    Toon,
}

impl PackFormat {
    /// `AIDD_PACK_FORMAT`; anything but `toon` means yaml.
    pub fn from_env() -> Self {
        match std::env::var("AIDD_PACK_FORMAT") {
            Ok(v) if v.trim().eq_ignore_ascii_case("toon") => PackFormat::Toon,
            _ => PackFormat::Yaml,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            PackFormat::Yaml => ".pack.yaml",
            PackFormat::Toon => ".pack.toon",
        }
    }

    pub fn alternate(self) -> Self {
        match self {
            PackFormat::Yaml => PackFormat::Toon,
            PackFormat::Toon => PackFormat::Yaml,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportLoad {
    Missing,
    Loaded { path: PathBuf, value: Value },
    Corrupted { path: PathBuf, error: String },
}

fn report_stem(path: &Path) -> String {
    let text = path.to_string_lossy();
    for suffix in [".pack.yaml", ".pack.toon", ".json"] {
        if let Some(stem) = text.strip_suffix(suffix) {
            return stem.to_string();
        }
    }
    text.into_owned()
}

/// Candidate files in lookup order: preferred pack, alternate pack, JSON.
pub fn report_candidates(json_path: &Path, format: PackFormat) -> Vec<PathBuf> {
    let stem = report_stem(json_path);
    vec![
        PathBuf::from(format!("{stem}{}", format.extension())),
        PathBuf::from(format!("{stem}{}", format.alternate().extension())),
        PathBuf::from(format!("{stem}.json")),
    ]
}

fn parse_report(path: &Path, text: &str) -> std::result::Result<Value, String> {
    let name = path.to_string_lossy();
    if name.ends_with(".pack.yaml") {
        return serde_yaml::from_str::<Value>(text).map_err(|e| e.to_string());
    }
    if name.ends_with(".pack.toon") {
        // Pack payloads are JSON-compatible; fall back to the YAML reader.
        return serde_json::from_str::<Value>(text)
            .or_else(|_| serde_yaml::from_str::<Value>(text))
            .map_err(|e| e.to_string());
    }
    serde_json::from_str::<Value>(text).map_err(|e| e.to_string())
}

pub fn load_report(json_path: &Path, format: PackFormat) -> ReportLoad {
    for path in report_candidates(json_path, format) {
        if !path.is_file() {
            continue;
        }
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                return ReportLoad::Corrupted {
                    path,
                    error: e.to_string(),
                }
            }
        };
        return match parse_report(&path, &text) {
            Ok(value) if value.is_object() => ReportLoad::Loaded { path, value },
            Ok(_) => ReportLoad::Corrupted {
                path,
                error: "top-level value is not an object".to_string(),
            },
            Err(error) => ReportLoad::Corrupted { path, error },
        };
    }
    ReportLoad::Missing
}

/// Severities of `findings[]` that appear in `blocking` (both lowercased).
pub fn blocking_findings(report: &Value, blocking: &[String]) -> Vec<String> {
    let Some(findings) = report.get("findings").and_then(Value::as_array) else {
        return Vec::new();
    };
    findings
        .iter()
        .filter_map(|f| {
            let severity = f.get("severity")?.as_str()?.trim().to_lowercase();
            if !blocking.contains(&severity) {
                return None;
            }
            let title = f.get("title").and_then(Value::as_str).unwrap_or("");
            Some(format!("[{severity}] {title}").trim().to_string())
        })
        .collect()
}

/// Expand `{ticket}`, `{slug}` and `{branch}` in a report template, dropping a
/// leading `aidd/` when the workflow root is itself the `aidd/` directory.
pub fn resolve_template(root: &Path, template: &str, ticket: &str, slug: &str, branch: &str) -> PathBuf {
    let expanded = template
        .replace("{ticket}", ticket)
        .replace("{slug}", slug)
        .replace("{branch}", branch);
    let path = PathBuf::from(&expanded);
    if path.is_absolute() {
        return path;
    }
    let rel = expanded.trim_start_matches("./");
    let rel = match rel.strip_prefix("aidd/") {
        Some(rest) if root.file_name().is_some_and(|n| n == "aidd") => rest,
        _ => rel,
    };
    root.join(rel)
}

// ---------------------------------------------------------------------------
// PRD review report
// ---------------------------------------------------------------------------

pub const DEFAULT_REVIEW_STATUS: &str = "pending";
const REVIEW_APPROVED: &[&str] = &["ready"];
const REVIEW_BLOCKING: &[&str] = &["blocked", "reject"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: String,
    pub title: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrdReviewReport {
    pub ticket: String,
    pub slug: String,
    pub status: String,
    pub recommended_status: String,
    pub findings: Vec<Finding>,
    pub action_items: Vec<String>,
    pub generated_at: String,
}

fn todo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:TODO|TBD)\b").expect("valid regex"))
}

fn angle_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

fn html_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"))
}

fn normalize_review_status(status: Option<&str>) -> String {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => DEFAULT_REVIEW_STATUS.to_string(),
        Some("ready_for_implementation" | "ready-for-implementation") => "ready".to_string(),
        Some(s) => s.to_string(),
    }
}

/// Lines outside `## PRD Review` that still carry TODO/TBD or `<...>` placeholders.
fn placeholder_lines(content: &str) -> Vec<String> {
    let sanitized = html_comment_re().replace_all(content, " ");
    let mut inside_review = false;
    let mut hits = Vec::new();
    for line in sanitized.lines() {
        let trimmed = line.trim();
        if let Some(title) = trimmed.strip_prefix("## ") {
            inside_review = title.trim() == "PRD Review";
            continue;
        }
        if inside_review || trimmed.is_empty() {
            continue;
        }
        if todo_re().is_match(trimmed) || angle_re().is_match(trimmed) {
            hits.push(trimmed.to_string());
        }
    }
    hits
}

/// Heuristic review of a PRD body.
pub fn analyse_prd(ticket: &str, slug: &str, content: &str) -> PrdReviewReport {
    let sections = markdown::sections(content);
    let block = sections
        .get("PRD Review")
        .map(markdown::status_and_actions)
        .unwrap_or_default();
    let status = normalize_review_status(block.status.as_deref());
    let approved = REVIEW_APPROVED.contains(&status.as_str());
    let blocking = REVIEW_BLOCKING.contains(&status.as_str());
    let open_items = block.has_open_items();

    let mut findings = Vec::new();
    let placeholders = placeholder_lines(content);
    for line in &placeholders {
        findings.push(Finding {
            severity: "major".into(),
            title: "Найдены заглушки в PRD".into(),
            details: line.clone(),
        });
    }
    if !approved && placeholders.is_empty() && !open_items {
        findings.push(Finding {
            severity: "minor".into(),
            title: "Статус PRD Review не обновлён".into(),
            details: "Укажите Status: READY после ревью.".into(),
        });
    }
    if blocking {
        findings.push(Finding {
            severity: "critical".into(),
            title: "PRD Review помечен как BLOCKED".into(),
            details: "Закройте блокеры перед разработкой.".into(),
        });
    }

    let has = |sev: &str| findings.iter().any(|f| f.severity == sev);
    let recommended_status = if blocking || has("critical") {
        "blocked"
    } else if has("major") || open_items || !approved {
        "pending"
    } else {
        "ready"
    };

    let action_items = block
        .action_items
        .iter()
        .map(|i| {
            let mark = match i.state {
                CheckState::Open => " ",
                CheckState::Closed => "x",
                CheckState::Other => "~",
            };
            format!("- [{mark}] {}", i.text)
        })
        .collect();

    PrdReviewReport {
        ticket: ticket.to_string(),
        slug: slug.to_string(),
        status,
        recommended_status: recommended_status.to_string(),
        findings,
        action_items,
        generated_at: now_ts(),
    }
}

pub fn write_prd_report(path: &Path, report: &PrdReviewReport) -> Result<()> {
    let mut data = serde_json::to_string_pretty(report)?;
    data.push('\n');
    atomic_write(path, data.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn prefers_pack_then_alternate_then_json() {
        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("reports/qa/T.json");
        std::fs::create_dir_all(json_path.parent().unwrap()).unwrap();
        assert_eq!(load_report(&json_path, PackFormat::Yaml), ReportLoad::Missing);

        std::fs::write(&json_path, r#"{"source": "json"}"#).unwrap();
        let ReportLoad::Loaded { value, .. } = load_report(&json_path, PackFormat::Yaml) else {
            panic!("expected json");
        };
        assert_eq!(value["source"], "json");

        std::fs::write(dir.path().join("reports/qa/T.pack.toon"), r#"{"source": "toon"}"#).unwrap();
        let ReportLoad::Loaded { value, .. } = load_report(&json_path, PackFormat::Yaml) else {
            panic!("expected toon fallback");
        };
        assert_eq!(value["source"], "toon");

        std::fs::write(dir.path().join("reports/qa/T.pack.yaml"), "source: yaml\n").unwrap();
        let ReportLoad::Loaded { value, path } = load_report(&json_path, PackFormat::Yaml) else {
            panic!("expected yaml");
        };
        assert_eq!(value["source"], "yaml");
        assert!(path.to_string_lossy().ends_with(".pack.yaml"));

        let ReportLoad::Loaded { value, .. } = load_report(&json_path, PackFormat::Toon) else {
            panic!("expected toon preferred");
        };
        assert_eq!(value["source"], "toon");
    }

    #[test]
    fn corrupted_json_is_reported() {
        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("r.json");
        std::fs::write(&json_path, "{broken").unwrap();
        assert!(matches!(
            load_report(&json_path, PackFormat::Yaml),
            ReportLoad::Corrupted { .. }
        ));
    }

    #[test]
    fn blocking_findings_filter_by_severity() {
        let report = json!({"findings": [
            {"severity": "Critical", "title": "boom"},
            {"severity": "minor", "title": "nit"}
        ]});
        let hits = blocking_findings(&report, &["critical".to_string()]);
        assert_eq!(hits, vec!["[critical] boom"]);
    }

    #[test]
    fn template_strips_aidd_prefix_inside_aidd_root() {
        let root = Path::new("/w/aidd");
        assert_eq!(
            resolve_template(root, "aidd/reports/qa/{ticket}.json", "T", "s", "main"),
            Path::new("/w/aidd/reports/qa/T.json")
        );
        let other = Path::new("/w/workflow");
        assert_eq!(
            resolve_template(other, "reports/{slug}-{branch}.json", "T", "s", "dev"),
            Path::new("/w/workflow/reports/s-dev.json")
        );
    }

    #[test]
    fn analyse_ready_prd() {
        let prd = "# PRD\n\n## Goals\nShip.\n\n## PRD Review\nStatus: READY\n- [x] checked\n";
        let report = analyse_prd("T", "slug", prd);
        assert_eq!(report.status, "ready");
        assert_eq!(report.recommended_status, "ready");
        assert!(report.findings.is_empty());
        assert_eq!(report.action_items, vec!["- [x] checked"]);
    }

    #[test]
    fn analyse_placeholders_and_blocked() {
        let prd = "## Goals\nTBD\n<fill in>\n\n## PRD Review\nStatus: blocked\n- [ ] fix <this>\n";
        let report = analyse_prd("T", "T", prd);
        assert_eq!(report.recommended_status, "blocked");
        let majors = report.findings.iter().filter(|f| f.severity == "major").count();
        assert_eq!(majors, 2);
        assert!(report.findings.iter().any(|f| f.severity == "critical"));
    }

    #[test]
    fn analyse_missing_review_is_pending() {
        let report = analyse_prd("T", "T", "## Goals\nShip.\n");
        assert_eq!(report.status, "pending");
        assert_eq!(report.recommended_status, "pending");
        assert_eq!(report.findings[0].severity, "minor");
    }
}
