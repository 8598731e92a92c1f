//! Dependency allowlist check. Warns about dependencies added in the working
//! tree diff that are missing from `config/allowed-deps.txt`. Never blocks.

use super::GateContext;
use crate::config::{DepsMode, DepsSettings};
use crate::gate::{Gate, GateDecision, ReasonCode};
use crate::git;
use crate::paths;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

const GATE: Gate = Gate::DepsAllowlist;

pub const GRADLE_FILES: &[&str] = &[
    "**/build.gradle",
    "**/build.gradle.kts",
    "**/settings.gradle",
    "**/settings.gradle.kts",
    "**/gradle/libs.versions.toml",
];

const OTHER_FILES: &[&str] = &[
    "**/package.json",
    "**/pyproject.toml",
    "**/requirements*.txt",
    "**/Pipfile",
    "**/Pipfile.lock",
    "**/poetry.lock",
    "**/setup.py",
    "**/setup.cfg",
    "**/go.mod",
    "**/Cargo.toml",
    "**/*.csproj",
    "**/*.fsproj",
    "**/*.vbproj",
    "**/Directory.Packages.props",
    "**/packages.config",
];

const PACKAGE_JSON_IGNORE: &[&str] = &[
    "name", "version", "private", "description", "license", "author", "repository", "homepage",
    "scripts", "workspaces", "engines", "files", "exports", "main", "module", "types",
];

const TOML_IGNORE: &[&str] = &[
    "name", "version", "description", "authors", "license", "edition", "dependencies",
    "dev-dependencies", "optional-dependencies", "python", "python_version",
    "python_full_version", "readme", "homepage", "repository", "documentation", "keywords",
];

const TOML_LIST_KEYS: &[&str] = &["dependencies", "dev-dependencies", "optional-dependencies"];

const SETUP_PY_KEYS: &[&str] = &["install_requires", "tests_require", "setup_requires", "extras_require"];

/// Pathspecs the diff is restricted to.
pub fn dep_files(settings: &DepsSettings) -> Vec<String> {
    if !settings.files.is_empty() {
        return settings.files.clone();
    }
    let mut files: Vec<String> = GRADLE_FILES.iter().map(|s| s.to_string()).collect();
    if settings.mode == DepsMode::Default {
        files.extend(OTHER_FILES.iter().map(|s| s.to_string()));
    }
    files
}

// ---------------------------------------------------------------------------
// Diff parsing
// ---------------------------------------------------------------------------

/// Added lines per file from a `git diff --unified=0` body.
pub fn added_lines(diff: &str) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;
    for line in diff.lines() {
        if line.starts_with("diff --git ") {
            current = None;
            continue;
        }
        if let Some(path) = line.strip_prefix("+++ ") {
            current = path.trim().strip_prefix("b/").map(str::to_string);
            continue;
        }
        let (Some(path), Some(added)) = (&current, line.strip_prefix('+')) else {
            continue;
        };
        out.entry(path.clone()).or_default().push(added.to_string());
    }
    out
}

/// Load `config/allowed-deps.txt`: one entry per line, `#` comments,
/// whitespace ignored. `None` when the file is absent.
pub fn load_allowlist(path: &Path) -> Option<BTreeSet<String>> {
    let text = std::fs::read_to_string(path).ok()?;
    Some(
        text.lines()
            .map(|raw| raw.split('#').next().unwrap_or_default())
            .map(|s| s.split_whitespace().collect::<String>())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid regex"))
}

/// Reduce a requirement spec like `requests[socks]>=2.0; python_version>"3"`
/// to its package name.
fn clean_requirement(raw: &str) -> Option<String> {
    let value = raw.trim().trim_matches(|c: char| c == '"' || c == '\'');
    let value = value.trim_end_matches(',');
    let value = value.split(';').next().unwrap_or_default().trim();
    if value.is_empty() || value.starts_with('-') {
        return None;
    }
    let mut value = value.split('@').next().unwrap_or_default().trim();
    value = value.split('[').next().unwrap_or_default().trim();
    for op in ["==", ">=", "<=", "~=", "!=", ">", "<"] {
        if let Some((name, _)) = value.split_once(op) {
            value = name.trim();
            break;
        }
    }
    let value = value.split(' ').next().unwrap_or_default().trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches(|c: char| c == '"' || c == '\'')
}

fn gradle(lines: &[String]) -> BTreeSet<String> {
    static COORD: OnceLock<Regex> = OnceLock::new();
    static MODULE: OnceLock<Regex> = OnceLock::new();
    static INLINE: OnceLock<Regex> = OnceLock::new();
    let coord = re(
        &COORD,
        r#"(?:implementation|api|compileOnly|runtimeOnly|testImplementation|testRuntimeOnly|testCompileOnly)\s*\(?\s*["']([^:"')]+:[^:"')]+)"#,
    );
    let module = re(&MODULE, r#"module\s*=\s*["']([^:"')]+:[^:"')]+)"#);
    let inline = re(&INLINE, r#"=\s*["']([^:"')]+:[^:"')]+):[^"']+["']"#);
    lines
        .iter()
        .filter_map(|l| {
            [coord, module, inline]
                .iter()
                .find_map(|r| r.captures(l).map(|c| c[1].to_string()))
        })
        .collect()
}

fn package_json(lines: &[String]) -> BTreeSet<String> {
    static DEP: OnceLock<Regex> = OnceLock::new();
    let dep = re(&DEP, r#""(@?[^"\s]+)"\s*:\s*"[^"]+""#);
    lines
        .iter()
        .filter_map(|l| dep.captures(l).map(|c| c[1].trim().to_string()))
        .filter(|name| !PACKAGE_JSON_IGNORE.contains(&name.as_str()))
        .collect()
}

fn requirements(lines: &[String]) -> BTreeSet<String> {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(clean_requirement)
        .collect()
}

fn quoted_strings(text: &str) -> Vec<String> {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    re(&QUOTED, r#""([^"]+)"|'([^']+)'"#)
        .captures_iter(text)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)).map(|m| m.as_str().to_string()))
        .collect()
}

fn pyproject(lines: &[String]) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    for line in lines {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') || stripped.starts_with('[') {
            continue;
        }
        if let Some((key, value)) = stripped.split_once('=') {
            let key = strip_quotes(key);
            if key.is_empty() {
                continue;
            }
            let lower = key.to_lowercase();
            if TOML_LIST_KEYS.contains(&lower.as_str()) {
                deps.extend(quoted_strings(value).iter().filter_map(|v| clean_requirement(v)));
            } else if !TOML_IGNORE.contains(&lower.as_str()) {
                deps.insert(key.to_string());
            }
        } else if stripped.starts_with('"') || stripped.starts_with('\'') {
            deps.extend(clean_requirement(stripped));
        }
    }
    deps
}

fn setup_cfg(lines: &[String]) -> BTreeSet<String> {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('[') && !l.contains('='))
        .filter_map(clean_requirement)
        .collect()
}

/// Quoted literals that are not dict keys.
fn string_literals(line: &str) -> Vec<String> {
    static LITERAL: OnceLock<Regex> = OnceLock::new();
    let literal = re(&LITERAL, r#""([^"]+)"|'([^']+)'"#);
    literal
        .captures_iter(line)
        .filter_map(|c| {
            let whole = c.get(0)?;
            if line[whole.end()..].trim_start().starts_with(':') {
                return None;
            }
            let value = c.get(1).or_else(|| c.get(2))?.as_str();
            clean_requirement(value)
        })
        .collect()
}

fn bracket_balance(text: &str) -> i32 {
    text.chars()
        .map(|c| match c {
            '[' | '{' | '(' => 1,
            ']' | '}' | ')' => -1,
            _ => 0,
        })
        .sum()
}

fn setup_py(lines: &[String]) -> BTreeSet<String> {
    static KEY: OnceLock<Regex> = OnceLock::new();
    let key = re(&KEY, &format!(r"\b({})\b\s*=", SETUP_PY_KEYS.join("|")));
    let mut deps = BTreeSet::new();
    let mut depth = 0;
    let mut active = false;
    for line in lines {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        if active {
            deps.extend(string_literals(stripped));
            depth += bracket_balance(stripped);
            if depth <= 0 {
                active = false;
                depth = 0;
            }
            continue;
        }
        let Some(m) = key.find(stripped) else {
            continue;
        };
        let rest = &stripped[m.end()..];
        deps.extend(string_literals(rest));
        depth = bracket_balance(rest);
        active = depth > 0;
    }
    deps
}

fn pipfile(lines: &[String]) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    let mut section = String::new();
    for line in lines {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        if stripped.starts_with('[') && stripped.ends_with(']') {
            section = stripped.trim_matches(|c: char| c == '[' || c == ']').trim().to_string();
            continue;
        }
        if section != "packages" && section != "dev-packages" {
            continue;
        }
        if let Some((key, _)) = stripped.split_once('=') {
            let key = strip_quotes(key);
            if !key.is_empty() && !TOML_IGNORE.contains(&key.to_lowercase().as_str()) {
                deps.insert(key.to_string());
            }
        }
    }
    deps
}

fn pipfile_lock(lines: &[String]) -> BTreeSet<String> {
    static SECTION: OnceLock<Regex> = OnceLock::new();
    static DEP: OnceLock<Regex> = OnceLock::new();
    let section_re = re(&SECTION, r#"^"(default|develop)"\s*:\s*\{"#);
    let dep_re = re(&DEP, r#"^"([^"]+)"\s*:\s*\{"#);
    let mut in_section = false;
    let mut deps = BTreeSet::new();
    for line in lines {
        let stripped = line.trim();
        if section_re.is_match(stripped) {
            in_section = true;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some(c) = dep_re.captures(stripped) {
            if !["_meta", "default", "develop"].contains(&&c[1]) {
                deps.insert(c[1].to_string());
            }
        }
    }
    deps
}

fn poetry_lock(lines: &[String]) -> BTreeSet<String> {
    static NAME: OnceLock<Regex> = OnceLock::new();
    let name_re = re(&NAME, r#"^name\s*=\s*["']([^"']+)["']"#);
    let mut in_package = false;
    let mut deps = BTreeSet::new();
    for line in lines {
        let stripped = line.trim();
        if stripped == "[[package]]" {
            in_package = true;
            continue;
        }
        if !in_package {
            continue;
        }
        if let Some(c) = name_re.captures(stripped) {
            deps.insert(c[1].to_string());
            in_package = false;
        }
    }
    deps
}

fn go_mod(lines: &[String]) -> BTreeSet<String> {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| {
            !l.is_empty()
                && *l != "require ("
                && *l != ")"
                && !["//", "module ", "go ", "replace ", "exclude "]
                    .iter()
                    .any(|p| l.starts_with(p))
        })
        .filter_map(|l| {
            l.strip_prefix("require ")
                .unwrap_or(l)
                .split_whitespace()
                .next()
                .map(str::to_string)
        })
        .collect()
}

fn cargo_toml(lines: &[String]) -> BTreeSet<String> {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('['))
        .filter_map(|l| l.split_once('=').map(|(k, _)| strip_quotes(k)))
        .filter(|k| !k.is_empty() && !TOML_IGNORE.contains(&k.to_lowercase().as_str()))
        .map(str::to_string)
        .collect()
}

fn dotnet(lines: &[String]) -> BTreeSet<String> {
    static INCLUDE: OnceLock<Regex> = OnceLock::new();
    static CONFIG: OnceLock<Regex> = OnceLock::new();
    let include = re(&INCLUDE, r#"Package(?:Reference|Version)\s+[^>]*\b(?:Include|Update)="([^"]+)""#);
    let config = re(&CONFIG, r#"\bid="([^"]+)""#);
    lines
        .iter()
        .filter_map(|l| {
            include
                .captures(l)
                .or_else(|| config.captures(l))
                .map(|c| c[1].to_string())
        })
        .collect()
}

/// Dependency names introduced by `lines` of the manifest at `path`.
pub fn extract_dependencies(path: &str, lines: &[String]) -> BTreeSet<String> {
    let lower = path.to_lowercase();
    let name = lower.rsplit('/').next().unwrap_or_default();
    match name {
        _ if lower.ends_with(".gradle") || lower.ends_with(".gradle.kts") => gradle(lines),
        "libs.versions.toml" => gradle(lines),
        "package.json" => package_json(lines),
        "setup.py" => setup_py(lines),
        "pipfile" => pipfile(lines),
        "pipfile.lock" => pipfile_lock(lines),
        "poetry.lock" => poetry_lock(lines),
        "setup.cfg" => setup_cfg(lines),
        "pyproject.toml" => pyproject(lines),
        "go.mod" | "go.sum" => go_mod(lines),
        "cargo.toml" => cargo_toml(lines),
        "directory.packages.props" | "packages.config" => dotnet(lines),
        _ if name.starts_with("requirements") && name.ends_with(".txt") => requirements(lines),
        _ if [".csproj", ".fsproj", ".vbproj"].iter().any(|e| lower.ends_with(e)) => dotnet(lines),
        _ => BTreeSet::new(),
    }
}

/// Warning lines for every added dependency not in `allowed` (lowercased).
pub fn warnings_for(added: &BTreeMap<String, Vec<String>>, allowed: &BTreeSet<String>) -> Vec<String> {
    let mut out = Vec::new();
    for (path, lines) in added {
        for dep in extract_dependencies(path, lines) {
            if !allowed.contains(&dep.to_lowercase()) {
                out.push(format!("WARN: dependency '{dep}' не в allowlist ({})", paths::ALLOWED_DEPS_FILE));
            }
        }
    }
    out
}

pub fn deps_allowlist(ctx: &GateContext<'_>, settings: &DepsSettings, fast_mode: bool) -> GateDecision {
    if !settings.enabled {
        return GateDecision::skip(GATE, ReasonCode::GateDisabled, &ctx.args());
    }
    if fast_mode {
        return GateDecision::skip(GATE, ReasonCode::EnvBypass, &ctx.args().detail("AIDD_HOOKS_MODE=fast"));
    }
    let Some(allowed) = load_allowlist(&ctx.root.join(paths::ALLOWED_DEPS_FILE)) else {
        tracing::debug!("no allowlist file; nothing to check");
        return GateDecision::pass(GATE);
    };
    if allowed.is_empty() {
        return GateDecision::pass(GATE);
    }
    let diff = match git::diff_against_head(ctx.root, &dep_files(settings)) {
        Ok(diff) => diff,
        Err(e) => {
            tracing::debug!(error = %e, "git diff unavailable; skipping dependency check");
            return GateDecision::pass(GATE);
        }
    };
    GateDecision::pass(GATE).with_warnings(warnings_for(&added_lines(&diff), &allowed))
}
