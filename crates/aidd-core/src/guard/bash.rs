//! Bash tool guard: destructive-command confirmation and large-output
//! wrapping.

use super::{injection_notice, GuardDecision, GuardEnv, InjectionTarget, Permission};
use crate::context_config::{BashOutputGuard, ContextConfig, DangerousBashGuard, PermissionMode};
use crate::messages;
use chrono::Local;
use regex::Regex;
use std::path::Path;

const OPERATORS: &[&str] = &["&&", "||", "|&", ">>", "<<", ";", "|", ">", "<"];

/// POSIX single-quote escaping. Words made only of safe characters are left
/// bare.
pub fn sh_quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    let safe = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Rewrite `command` so its full output lands in a log file and only the
/// last `tail_lines` lines reach the transcript. The exit status survives.
pub fn wrap_command(log_dir: &Path, tail_lines: u32, command: &str, stamp: &str) -> String {
    let log_path = log_dir.join(format!("bash-{stamp}.log"));
    let script = format!(
        "mkdir -p {dir}; LOG_FILE={file}; ({command}) >\"$LOG_FILE\" 2>&1; status=$?; \
         echo \"\"; echo \"[Context GC] Full output saved to: $LOG_FILE\"; \
         echo \"[Context GC] Showing last {tail_lines} lines:\"; \
         tail -n {tail_lines} \"$LOG_FILE\"; exit $status",
        dir = sh_quote(&log_dir.to_string_lossy()),
        file = sh_quote(&log_path.to_string_lossy()),
    );
    format!("bash -lc {}", sh_quote(&script))
}

fn file_name_lower(token: &str) -> String {
    Path::new(token)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn is_assignment(token: &str) -> bool {
    token.contains('=') && !token.starts_with('-')
}

/// Index of the executed binary after `VAR=val`, `env ...` and `command ...`
/// prefixes. `None` for `command -v`/`-V` lookups and unparseable input.
fn binary_index(tokens: &[String]) -> Option<usize> {
    let mut idx = 0;
    while idx < tokens.len() && is_assignment(&tokens[idx]) {
        idx += 1;
    }
    if idx < tokens.len() && file_name_lower(&tokens[idx]) == "env" {
        idx += 1;
        while idx < tokens.len() && tokens[idx].starts_with('-') {
            idx += 1;
        }
        while idx < tokens.len() && is_assignment(&tokens[idx]) {
            idx += 1;
        }
    }
    if idx < tokens.len() && file_name_lower(&tokens[idx]) == "command" {
        idx += 1;
        while idx < tokens.len() && tokens[idx].starts_with('-') {
            if tokens[idx] == "--" {
                idx += 1;
                break;
            }
            if tokens[idx][1..].contains(|c: char| c == 'v' || c == 'V') {
                return None;
            }
            idx += 1;
        }
    }
    (idx < tokens.len()).then_some(idx)
}

/// Lowercased file name of the executed binary, e.g. `rg` for
/// `FOO=1 env command /usr/bin/rg x`. Empty when there is none.
pub fn resolve_command_binary(command: &str) -> String {
    let Some(tokens) = shlex::split(command.trim()) else {
        return String::new();
    };
    match binary_index(&tokens) {
        Some(idx) => file_name_lower(&tokens[idx]),
        None => String::new(),
    }
}

/// Whether a shell operator appears outside quotes.
pub fn has_unquoted_operator(command: &str) -> bool {
    let (mut in_single, mut in_double, mut escaped) = (false, false, false);
    for (idx, ch) in command.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if !in_single => escaped = true,
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '\n' if !in_single && !in_double => return true,
            _ if !in_single && !in_double => {
                if OPERATORS.iter().any(|op| command[idx..].starts_with(op)) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Text the `only_for`/`skip_if` patterns are matched against. Simple
/// commands are matched from the binary onwards; pipelines, chains and
/// unparseable input use the raw command. `None` for `command -v` lookups.
pub fn eligibility_text(command: &str) -> Option<String> {
    if has_unquoted_operator(command) {
        return Some(command.to_string());
    }
    let Some(tokens) = shlex::split(command.trim()) else {
        return Some(command.to_string());
    };
    if tokens.is_empty() {
        return Some(command.to_string());
    }
    let idx = binary_index(&tokens)?;
    let mut words = vec![file_name_lower(&tokens[idx])];
    words.extend(tokens[idx + 1..].iter().cloned());
    Some(format!("{} ", words.join(" ")))
}

fn compile(pattern: &str) -> Option<Regex> {
    if pattern.trim().is_empty() {
        return None;
    }
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "invalid guard regex; ignoring");
            None
        }
    }
}

pub fn dangerous(guard: &DangerousBashGuard, command: &str) -> Option<GuardDecision> {
    if !guard.enabled {
        return None;
    }
    let hit = guard
        .patterns
        .iter()
        .filter_map(|p| compile(p))
        .any(|re| re.is_match(command));
    if !hit {
        return None;
    }
    let permission = match guard.mode {
        PermissionMode::Deny => Permission::Deny,
        PermissionMode::Ask => Permission::Ask,
    };
    Some(GuardDecision::with(
        permission,
        messages::DANGEROUS_BASH_REASON,
        messages::DANGEROUS_BASH_MESSAGE,
    ))
}

fn wants_wrap(guard: &BashOutputGuard, command: &str) -> bool {
    let Some(text) = eligibility_text(command) else {
        return false;
    };
    if let Some(only_for) = compile(&guard.only_for_regex) {
        if !only_for.is_match(&text) {
            return false;
        }
    }
    if let Some(skip_if) = compile(&guard.skip_if_regex) {
        if skip_if.is_match(command) {
            return false;
        }
    }
    true
}

pub fn decide(cfg: &ContextConfig, env: &GuardEnv<'_>, command: &str) -> GuardDecision {
    if let Some(decision) = dangerous(&cfg.dangerous_bash_guard, command) {
        return decision;
    }
    let notice = injection_notice(cfg, env, InjectionTarget::Command(command));

    let guard = &cfg.bash_output_guard;
    let passthrough = |notice| GuardDecision::allow_with_notice(messages::INJECTION_BASH_REASON, notice);
    if !guard.enabled || !wants_wrap(guard, command) {
        return passthrough(notice);
    }
    if env.rate_limited(&guard.log_dir, "bash_output", guard.min_interval_seconds) {
        return passthrough(notice);
    }

    let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let wrapped = wrap_command(&env.log_dir(&guard.log_dir), guard.tail_lines, command, &stamp);
    let mut message = messages::bash_wrapped(&guard.log_dir);
    if let Some(notice) = notice {
        message.push('\n');
        message.push_str(&notice);
    }
    GuardDecision {
        permission: Some(Permission::Allow),
        reason: Some(messages::BASH_WRAP_REASON.to_string()),
        system_message: Some(message),
        updated_input: Some(serde_json::json!({ "command": wrapped })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn env(root: &Path) -> GuardEnv<'_> {
        GuardEnv {
            root,
            project_dir: root,
            now: 1000.0,
        }
    }

    #[test]
    fn quoting() {
        assert_eq!(sh_quote("/tmp/logs"), "/tmp/logs");
        assert_eq!(sh_quote("a b"), "'a b'");
        assert_eq!(sh_quote("it's"), "'it'\\''s'");
        assert_eq!(sh_quote(""), "''");
    }

    #[test]
    fn wrapped_command_shape() {
        let out = wrap_command(Path::new("/p/logs"), 200, "docker logs foo", "20240101-000000");
        assert!(out.starts_with("bash -lc 'mkdir -p /p/logs; LOG_FILE=/p/logs/bash-20240101-000000.log; (docker logs foo)"));
        assert!(out.ends_with("tail -n 200 \"$LOG_FILE\"; exit $status'"));
        let script = shlex::split(&out).unwrap();
        assert_eq!(script[0], "bash");
        assert!(script[2].contains("[Context GC] Showing last 200 lines:"));
    }

    #[test]
    fn wrapped_command_keeps_status_and_tail() {
        let dir = TempDir::new().unwrap();
        let wrapped = wrap_command(dir.path(), 2, "printf 'a\nb\nc\nd\n'; exit 7", "s");
        let out = std::process::Command::new("sh")
            .arg("-c")
            .arg(&wrapped)
            .output()
            .unwrap();
        assert_eq!(out.status.code(), Some(7));

        let stdout = String::from_utf8_lossy(&out.stdout);
        let (head, tail) = stdout.split_once("[Context GC] Showing last 2 lines:").unwrap();
        assert!(head.contains("[Context GC] Full output saved to:"));
        assert!(!head.lines().any(|l| l == "a" || l == "b"));
        assert_eq!(tail.trim(), "c\nd");

        let log = std::fs::read_to_string(dir.path().join("bash-s.log")).unwrap();
        assert_eq!(log, "a\nb\nc\nd\n");
    }

    #[test]
    fn binary_resolution() {
        assert_eq!(resolve_command_binary("FOO=1 env -i BAR=2 command /usr/bin/rg x"), "rg");
        assert_eq!(resolve_command_binary("command -v npm"), "");
        assert_eq!(resolve_command_binary("'unterminated"), "");
        assert!(has_unquoted_operator("npm test | tail"));
        assert!(!has_unquoted_operator("echo 'a | b'"));
        assert_eq!(eligibility_text("command -v npm"), None);
        assert_eq!(eligibility_text("CI=1 npm test").as_deref(), Some("npm test "));
    }

    #[test]
    fn dangerous_command_asks() {
        let dir = TempDir::new().unwrap();
        let d = decide(&ContextConfig::defaults(), &env(dir.path()), "git reset --hard HEAD~1");
        assert_eq!(d.permission, Some(Permission::Ask));
        assert_eq!(d.reason.as_deref(), Some(messages::DANGEROUS_BASH_REASON));

        let cfg = ContextConfig::from_overrides(&json!({"dangerous_bash_guard": {"mode": "deny"}}));
        let d = decide(&cfg, &env(dir.path()), "rm -rf target");
        assert_eq!(d.permission, Some(Permission::Deny));
    }

    #[test]
    fn large_output_command_is_wrapped() {
        let dir = TempDir::new().unwrap();
        let d = decide(&ContextConfig::defaults(), &env(dir.path()), "docker logs foo");
        assert_eq!(d.permission, Some(Permission::Allow));
        let cmd = d.updated_input.unwrap()["command"].as_str().unwrap().to_string();
        assert!(cmd.starts_with("bash -lc '"));
        assert!(cmd.contains("(docker logs foo)"));
        assert!(cmd.ends_with("tail -n 200 \"$LOG_FILE\"; exit $status'"));
        assert!(d.system_message.unwrap().contains("aidd/reports/logs"));
    }

    #[test]
    fn skip_regex_and_plain_commands_pass() {
        let dir = TempDir::new().unwrap();
        let cfg = ContextConfig::defaults();
        assert!(decide(&cfg, &env(dir.path()), "docker logs foo --tail 50").is_none());
        assert!(decide(&cfg, &env(dir.path()), "ls -la").is_none());
        assert!(decide(&cfg, &env(dir.path()), "command -v npm").is_none());
    }

    #[test]
    fn dangerous_command_leaves_injection_notice_unspent() {
        let dir = TempDir::new().unwrap();
        let cfg = ContextConfig::defaults();
        let d = decide(&cfg, &env(dir.path()), "rm -rf node_modules/pkg");
        assert_eq!(d.permission, Some(Permission::Ask));

        let d = decide(&cfg, &env(dir.path()), "ls node_modules/pkg");
        assert_eq!(d.reason.as_deref(), Some(messages::INJECTION_BASH_REASON));
        assert!(d.system_message.is_some());
    }

    #[test]
    fn injection_notice_rides_along() {
        let dir = TempDir::new().unwrap();
        let d = decide(&ContextConfig::defaults(), &env(dir.path()), "ls node_modules/pkg");
        assert_eq!(d.permission, Some(Permission::Allow));
        assert_eq!(d.reason.as_deref(), Some(messages::INJECTION_BASH_REASON));
    }
}
